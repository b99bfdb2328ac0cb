use super::*;

use turtle_world::{
    CommandOutcome, GenerationTicket, HttpStatusTransport, PollPacer, SelectOutcome,
    StatusResponse, StatusTransport, SyncClient, SyncEvent, ThreadPacer,
};

#[derive(Debug, Clone)]
pub(super) enum SyncRequest {
    Refresh,
    Command {
        endpoint: String,
        ticket: GenerationTicket,
    },
    SelectTurtle {
        label: String,
    },
}

impl ViewerClient {
    /// Issues a fresh ticket first so a poll loop still running for an
    /// earlier command stops before this one is processed.
    pub(super) fn send_command(&self, endpoint: &str) -> bool {
        let ticket = self.generation.issue();
        self.tx
            .send(SyncRequest::Command {
                endpoint: endpoint.to_string(),
                ticket,
            })
            .is_ok()
    }

    pub(super) fn request_refresh(&self) -> bool {
        self.tx.send(SyncRequest::Refresh).is_ok()
    }

    pub(super) fn select_turtle(&self, label: &str) -> bool {
        self.tx
            .send(SyncRequest::SelectTurtle {
                label: label.to_string(),
            })
            .is_ok()
    }
}

pub(super) fn setup_startup_state(mut commands: Commands, config: Res<ViewerConfig>) {
    if let Some(path) = config.offline_snapshot.as_ref() {
        commands.insert_resource(offline_state(path));
        return;
    }

    let client = spawn_sync_worker(&config);
    if !client.request_refresh() {
        warn!("sync worker stopped before the first refresh");
    }
    commands.insert_resource(client);
    commands.insert_resource(ViewerState::default());
}

fn offline_state(path: &Path) -> ViewerState {
    let mut state = ViewerState::default();
    match load_offline_snapshot(path) {
        Ok(snapshot) => {
            info!(
                "loaded offline snapshot {} with {} blocks",
                path.display(),
                snapshot.blocks.len()
            );
            apply_sync_event(&mut state, SyncEvent::Render(snapshot));
            state.status_line = format!("Offline snapshot: {}", path.display());
        }
        Err(message) => {
            warn!("offline snapshot unavailable: {message}");
            state.status_line = format!("Offline snapshot unavailable: {message}");
        }
    }
    state
}

pub(super) fn load_offline_snapshot(path: &Path) -> Result<WorldSnapshot, String> {
    let content = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let status: StatusResponse = serde_json::from_str(&content).map_err(|err| err.to_string())?;
    Ok(WorldSnapshot::from_status(&status))
}

pub(super) fn spawn_sync_worker(config: &ViewerConfig) -> ViewerClient {
    let (tx_out, rx_out) = mpsc::channel::<SyncRequest>();
    let (tx_in, rx_in) = mpsc::channel::<SyncEvent>();
    let base_url = config.server_url.clone();
    let timeout = config.request_timeout();
    let policy = config.poll_policy();

    thread::spawn(move || match HttpStatusTransport::new(&base_url, timeout) {
        Ok(transport) => {
            info!("syncing with turtle server at {base_url}");
            run_sync_worker(SyncClient::new(transport, ThreadPacer, policy), rx_out, tx_in);
        }
        Err(err) => {
            warn!("sync worker unavailable: {err}");
            let _ = tx_in.send(SyncEvent::Status(format!("Sync unavailable: {err}")));
        }
    });

    ViewerClient {
        tx: tx_out,
        rx: Mutex::new(rx_in),
        generation: CommandGeneration::default(),
    }
}

/// Serves requests in order until every sender is gone.
pub(super) fn run_sync_worker<T, P>(
    client: SyncClient<T, P>,
    rx_out: Receiver<SyncRequest>,
    tx_in: Sender<SyncEvent>,
) where
    T: StatusTransport,
    P: PollPacer,
{
    let sink = |event: SyncEvent| {
        let _ = tx_in.send(event);
    };

    for request in rx_out {
        match request {
            SyncRequest::Refresh => {
                if let Err(err) = client.refresh(sink) {
                    warn!("status refresh failed: {err}");
                }
            }
            SyncRequest::Command { endpoint, ticket } => {
                log_command_outcome(&endpoint, client.send_command(&ticket, &endpoint, sink));
            }
            SyncRequest::SelectTurtle { label } => match client.select_turtle(&label, sink) {
                Ok(SelectOutcome::Selected) => info!("selected turtle {label}"),
                Ok(SelectOutcome::Rejected { detail }) => {
                    warn!("turtle {label} rejected: {detail}")
                }
                Err(err) => warn!("select turtle {label} failed: {err}"),
            },
        }
    }
}

fn log_command_outcome(endpoint: &str, outcome: CommandOutcome) {
    match outcome {
        CommandOutcome::Rendered {
            changed: true,
            polls,
            ..
        } => info!("{endpoint}: turtle moved after {polls} polls"),
        CommandOutcome::Rendered {
            changed: false,
            polls,
            failed_polls,
        } => info!("{endpoint}: no movement after {polls} polls ({failed_polls} failed)"),
        CommandOutcome::Superseded { polls } => {
            info!("{endpoint}: superseded by a newer command after {polls} polls")
        }
        CommandOutcome::CommandFailed => warn!("{endpoint}: command failed"),
        CommandOutcome::RefreshFailed { polls } => {
            warn!("{endpoint}: final refresh failed after {polls} polls")
        }
    }
}

pub(super) fn apply_sync_event(state: &mut ViewerState, event: SyncEvent) {
    match event {
        SyncEvent::Status(message) => state.status_line = message,
        SyncEvent::Render(snapshot) => {
            state.snapshot = Some(snapshot);
            state.snapshot_revision += 1;
        }
        SyncEvent::Alert(message) => state.alert = Some(message),
    }
}

pub(super) fn poll_sync_events(mut state: ResMut<ViewerState>, client: Option<Res<ViewerClient>>) {
    let Some(client) = client else {
        return;
    };
    let receiver = match client.rx.lock() {
        Ok(receiver) => receiver,
        Err(_) => {
            state.status_line = "sync receiver poisoned".to_string();
            return;
        }
    };

    loop {
        match receiver.try_recv() {
            Ok(event) => apply_sync_event(&mut state, event),
            Err(mpsc::TryRecvError::Empty) => break,
            Err(mpsc::TryRecvError::Disconnected) => {
                if !state.worker_stopped {
                    state.worker_stopped = true;
                    state.status_line = "Sync worker stopped.".to_string();
                }
                break;
            }
        }
    }
}
