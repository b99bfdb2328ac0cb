use bevy::prelude::*;

use crate::viewer_config::ViewerConfig;
use crate::{world_summary, ViewerClient, ViewerState};

#[derive(Resource, Default)]
pub(super) struct HeadlessStatus {
    last_status: Option<String>,
    last_revision: u64,
    last_alert: Option<String>,
}

/// Sends the configured command once the first world snapshot has arrived.
pub(super) fn headless_auto_command_once(
    client: Option<Res<ViewerClient>>,
    config: Res<ViewerConfig>,
    state: Res<ViewerState>,
    mut sent: Local<bool>,
) {
    if *sent || state.snapshot.is_none() {
        return;
    }
    let Some(endpoint) = config.headless_command.as_deref() else {
        return;
    };
    let Some(client) = client else {
        return;
    };
    if client.send_command(endpoint) {
        eprintln!("viewer command: {endpoint}");
    }
    *sent = true;
}

pub(super) fn headless_report(mut status: ResMut<HeadlessStatus>, state: Res<ViewerState>) {
    if status.last_status.as_deref() != Some(state.status_line.as_str()) {
        eprintln!("viewer status: {}", state.status_line);
        status.last_status = Some(state.status_line.clone());
    }

    if state.snapshot_revision != status.last_revision {
        eprintln!(
            "viewer world #{}: {}",
            state.snapshot_revision,
            world_summary(state.snapshot.as_ref()).replace('\n', " | ")
        );
        status.last_revision = state.snapshot_revision;
    }

    if status.last_alert != state.alert {
        if let Some(alert) = state.alert.as_ref() {
            eprintln!("viewer alert: {alert}");
        }
        status.last_alert = state.alert.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::main_connection::SyncRequest;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use turtle_world::{CommandGeneration, SyncEvent, WorldSnapshot};

    #[test]
    fn headless_report_tracks_status_revision_and_alert() {
        let mut app = App::new();
        app.add_systems(Update, headless_report);
        app.world_mut().insert_resource(HeadlessStatus::default());
        app.world_mut().insert_resource(ViewerState::default());

        app.update();

        let status = app.world().resource::<HeadlessStatus>();
        assert_eq!(
            status.last_status.as_deref(),
            Some("Waiting for turtle server...")
        );
        assert_eq!(status.last_revision, 0);
        assert!(status.last_alert.is_none());

        app.world_mut().insert_resource(ViewerState {
            status_line: "Command sent.".to_string(),
            snapshot: Some(WorldSnapshot::default()),
            snapshot_revision: 3,
            alert: Some("Failed to select turtle.".to_string()),
            worker_stopped: false,
        });

        app.update();

        let status = app.world().resource::<HeadlessStatus>();
        assert_eq!(status.last_status.as_deref(), Some("Command sent."));
        assert_eq!(status.last_revision, 3);
        assert_eq!(
            status.last_alert.as_deref(),
            Some("Failed to select turtle.")
        );
    }

    #[test]
    fn auto_command_waits_for_snapshot_and_fires_once() {
        let mut app = App::new();
        app.add_systems(Update, headless_auto_command_once);
        let (tx, rx) = mpsc::channel::<SyncRequest>();
        app.world_mut().insert_resource(ViewerClient {
            tx,
            rx: Mutex::new(mpsc::channel::<SyncEvent>().1),
            generation: CommandGeneration::default(),
        });
        app.world_mut().insert_resource(ViewerConfig {
            headless_command: Some("/turn/left".to_string()),
            ..ViewerConfig::default()
        });
        app.world_mut().insert_resource(ViewerState::default());

        app.update();
        assert!(rx.try_recv().is_err());

        app.world_mut().resource_mut::<ViewerState>().snapshot = Some(WorldSnapshot::default());
        app.update();
        app.update();

        let endpoints: Vec<String> = rx
            .try_iter()
            .filter_map(|request| match request {
                SyncRequest::Command { endpoint, .. } => Some(endpoint),
                _ => None,
            })
            .collect();
        assert_eq!(endpoints, vec!["/turn/left".to_string()]);
    }
}
