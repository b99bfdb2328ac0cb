//! Command-and-poll protocol against the turtle server.
//!
//! A command is applied as: baseline `/status`, `POST` the command, short-poll
//! `/status` until the current turtle's pose changes or the attempt budget runs
//! out, then fetch one final snapshot and render it.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use crate::snapshot::WorldSnapshot;
use crate::status::{
    CommandResponse, SetTurtleResponse, StatusResponse, SELECT_TURTLE_FALLBACK_ERROR,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;
pub const COMMAND_ERROR_MESSAGE: &str = "Error sending command.";
pub const REFRESH_ERROR_MESSAGE: &str = "Error refreshing world.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    BuildClient { message: String },
    Http { message: String },
    DecodeResponse { message: String },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::BuildClient { message } => write!(f, "client build failed: {message}"),
            SyncError::Http { message } => write!(f, "http request failed: {message}"),
            SyncError::DecodeResponse { message } => {
                write!(f, "decode response failed: {message}")
            }
        }
    }
}

impl Error for SyncError {}

pub trait StatusTransport {
    fn fetch_status(&self) -> Result<StatusResponse, SyncError>;
    fn post_command(&self, endpoint: &str) -> Result<CommandResponse, SyncError>;
    fn select_turtle(&self, label: &str) -> Result<SetTurtleResponse, SyncError>;
}

impl<T> StatusTransport for &T
where
    T: StatusTransport + ?Sized,
{
    fn fetch_status(&self) -> Result<StatusResponse, SyncError> {
        (**self).fetch_status()
    }

    fn post_command(&self, endpoint: &str) -> Result<CommandResponse, SyncError> {
        (**self).post_command(endpoint)
    }

    fn select_turtle(&self, label: &str) -> Result<SetTurtleResponse, SyncError> {
        (**self).select_turtle(label)
    }
}

/// Waits between poll attempts.
pub trait PollPacer {
    fn pause(&self, interval: Duration);
}

impl<P> PollPacer for &P
where
    P: PollPacer + ?Sized,
{
    fn pause(&self, interval: Duration) {
        (**self).pause(interval);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl PollPacer for ThreadPacer {
    fn pause(&self, interval: Duration) {
        thread::sleep(interval);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Shared counter; issuing a ticket supersedes every older one.
#[derive(Debug, Clone, Default)]
pub struct CommandGeneration {
    current: Arc<AtomicU64>,
}

impl CommandGeneration {
    pub fn issue(&self) -> GenerationTicket {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationTicket {
            id,
            current: Arc::clone(&self.current),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationTicket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl GenerationTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Replaces the status line.
    Status(String),
    /// Replaces the rendered world.
    Render(WorldSnapshot),
    /// Must be acknowledged by the user.
    Alert(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Rendered {
        polls: u32,
        failed_polls: u32,
        changed: bool,
    },
    Superseded {
        polls: u32,
    },
    CommandFailed,
    RefreshFailed {
        polls: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    Rejected { detail: String },
}

pub struct SyncClient<T, P = ThreadPacer> {
    transport: T,
    pacer: P,
    policy: PollPolicy,
}

impl<T, P> SyncClient<T, P>
where
    T: StatusTransport,
    P: PollPacer,
{
    pub fn new(transport: T, pacer: P, policy: PollPolicy) -> Self {
        Self {
            transport,
            pacer,
            policy,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn send_command<F>(
        &self,
        ticket: &GenerationTicket,
        endpoint: &str,
        mut sink: F,
    ) -> CommandOutcome
    where
        F: FnMut(SyncEvent),
    {
        let baseline = match self.transport.fetch_status() {
            Ok(status) => status.current_pose(),
            Err(_) => {
                sink(SyncEvent::Status(COMMAND_ERROR_MESSAGE.to_string()));
                return CommandOutcome::CommandFailed;
            }
        };
        let response = match self.transport.post_command(endpoint) {
            Ok(response) => response,
            Err(_) => {
                sink(SyncEvent::Status(COMMAND_ERROR_MESSAGE.to_string()));
                return CommandOutcome::CommandFailed;
            }
        };
        sink(SyncEvent::Status(response.display_message()));

        let mut polls = 0;
        let mut failed_polls = 0;
        let mut changed = false;
        while polls < self.policy.max_attempts {
            if !ticket.is_current() {
                return CommandOutcome::Superseded { polls };
            }
            self.pacer.pause(self.policy.interval);
            if !ticket.is_current() {
                return CommandOutcome::Superseded { polls };
            }
            polls += 1;
            match self.transport.fetch_status() {
                Ok(status) if status.current_pose() != baseline => {
                    changed = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => failed_polls += 1,
            }
        }

        if !ticket.is_current() {
            return CommandOutcome::Superseded { polls };
        }
        let snapshot = match self.fetch_snapshot() {
            Ok(snapshot) => snapshot,
            Err(_) => {
                sink(SyncEvent::Status(REFRESH_ERROR_MESSAGE.to_string()));
                return CommandOutcome::RefreshFailed { polls };
            }
        };
        if !ticket.is_current() {
            return CommandOutcome::Superseded { polls };
        }
        sink(SyncEvent::Render(snapshot));
        CommandOutcome::Rendered {
            polls,
            failed_polls,
            changed,
        }
    }

    pub fn refresh<F>(&self, mut sink: F) -> Result<(), SyncError>
    where
        F: FnMut(SyncEvent),
    {
        match self.fetch_snapshot() {
            Ok(snapshot) => {
                sink(SyncEvent::Render(snapshot));
                Ok(())
            }
            Err(err) => {
                sink(SyncEvent::Status(REFRESH_ERROR_MESSAGE.to_string()));
                Err(err)
            }
        }
    }

    pub fn select_turtle<F>(&self, label: &str, mut sink: F) -> Result<SelectOutcome, SyncError>
    where
        F: FnMut(SyncEvent),
    {
        let response = match self.transport.select_turtle(label) {
            Ok(response) => response,
            Err(err) => {
                sink(SyncEvent::Alert(SELECT_TURTLE_FALLBACK_ERROR.to_string()));
                return Err(err);
            }
        };

        if !response.success {
            let detail = response.failure_detail();
            sink(SyncEvent::Alert(detail.clone()));
            return Ok(SelectOutcome::Rejected { detail });
        }

        if let Some(message) = response.message.filter(|text| !text.trim().is_empty()) {
            sink(SyncEvent::Status(message));
        }
        self.refresh(&mut sink)?;
        Ok(SelectOutcome::Selected)
    }

    fn fetch_snapshot(&self) -> Result<WorldSnapshot, SyncError> {
        self.transport
            .fetch_status()
            .map(|status| WorldSnapshot::from_status(&status))
    }
}

/// Blocking HTTP transport for a turtle server rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpStatusTransport {
    base_url: String,
    client: Client,
}

impl HttpStatusTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::BuildClient {
                message: err.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Absolute URLs pass through; anything else is joined to the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl StatusTransport for HttpStatusTransport {
    fn fetch_status(&self) -> Result<StatusResponse, SyncError> {
        let response = self
            .client
            .get(self.endpoint_url("/status"))
            .send()
            .map_err(http_error)?;
        decode_body(response)
    }

    fn post_command(&self, endpoint: &str) -> Result<CommandResponse, SyncError> {
        let response = self
            .client
            .post(self.endpoint_url(endpoint))
            .send()
            .map_err(http_error)?;
        decode_body(response)
    }

    fn select_turtle(&self, label: &str) -> Result<SetTurtleResponse, SyncError> {
        let response = self
            .client
            .post(self.endpoint_url("/set_turtle"))
            .form(&[("number", label)])
            .send()
            .map_err(http_error)?;
        decode_body(response)
    }
}

fn http_error(err: reqwest::Error) -> SyncError {
    SyncError::Http {
        message: err.to_string(),
    }
}

// The server reports failures as JSON with a 4xx status, so the body is
// decoded whatever the status code.
fn decode_body<T>(response: Response) -> Result<T, SyncError>
where
    T: DeserializeOwned,
{
    response
        .json::<T>()
        .map_err(|err| SyncError::DecodeResponse {
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;
    use crate::status::TurtleRecord;

    fn status_at(x: i64, direction: i64) -> StatusResponse {
        StatusResponse {
            current_turtle: Some(TurtleRecord {
                x,
                y: 0,
                z: 0,
                direction: Some(direction),
            }),
            ..StatusResponse::default()
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        statuses: RefCell<VecDeque<Result<StatusResponse, SyncError>>>,
        command: RefCell<Option<Result<CommandResponse, SyncError>>>,
        select: RefCell<Option<Result<SetTurtleResponse, SyncError>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        fn with_statuses(statuses: Vec<Result<StatusResponse, SyncError>>) -> Self {
            Self {
                statuses: RefCell::new(statuses.into()),
                ..Self::default()
            }
        }

        fn status_fetches(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|call| call.as_str() == "GET /status")
                .count()
        }
    }

    impl StatusTransport for ScriptedTransport {
        fn fetch_status(&self) -> Result<StatusResponse, SyncError> {
            self.calls.borrow_mut().push("GET /status".to_string());
            let mut statuses = self.statuses.borrow_mut();
            match statuses.len() {
                0 => Err(SyncError::Http {
                    message: "script exhausted".to_string(),
                }),
                // The last scripted status repeats forever.
                1 => statuses[0].clone(),
                _ => statuses.pop_front().unwrap_or_else(|| unreachable!()),
            }
        }

        fn post_command(&self, endpoint: &str) -> Result<CommandResponse, SyncError> {
            self.calls.borrow_mut().push(format!("POST {endpoint}"));
            self.command
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(CommandResponse::default()))
        }

        fn select_turtle(&self, label: &str) -> Result<SetTurtleResponse, SyncError> {
            self.calls.borrow_mut().push(format!("POST /set_turtle {label}"));
            self.select
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(SetTurtleResponse::default()))
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        pauses: RefCell<Vec<Duration>>,
        supersede_on_pause: Option<(usize, CommandGeneration)>,
        seen: Cell<usize>,
    }

    impl PollPacer for RecordingPacer {
        fn pause(&self, interval: Duration) {
            self.pauses.borrow_mut().push(interval);
            self.seen.set(self.seen.get() + 1);
            if let Some((at, generation)) = self.supersede_on_pause.as_ref() {
                if self.seen.get() == *at {
                    generation.issue();
                }
            }
        }
    }

    #[test]
    fn command_stops_polling_once_pose_changes() {
        let transport = ScriptedTransport::with_statuses(vec![
            Ok(status_at(0, 1)),
            Ok(status_at(0, 1)),
            Ok(status_at(1, 1)),
        ]);
        *transport.command.borrow_mut() = Some(Ok(CommandResponse {
            message: Some("Moved forward".to_string()),
        }));
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());
        let generation = CommandGeneration::default();
        let ticket = generation.issue();

        let mut events = Vec::new();
        let outcome = client.send_command(&ticket, "/move/forward", |event| events.push(event));

        assert_eq!(
            outcome,
            CommandOutcome::Rendered {
                polls: 2,
                failed_polls: 0,
                changed: true,
            }
        );
        assert_eq!(events[0], SyncEvent::Status("Moved forward".to_string()));
        let SyncEvent::Render(snapshot) = &events[1] else {
            panic!("expected render, got {:?}", events[1]);
        };
        assert_eq!(snapshot.agents[0].position.x, 1);
        assert_eq!(events.len(), 2);
        assert_eq!(
            client.transport.calls.borrow()[..2],
            ["GET /status".to_string(), "POST /move/forward".to_string()]
        );
    }

    #[test]
    fn failed_polls_consume_budget_without_aborting() {
        let transport = ScriptedTransport::with_statuses(vec![
            Ok(status_at(0, 1)),
            Err(SyncError::Http {
                message: "reset".to_string(),
            }),
            Ok(status_at(0, 2)),
        ]);
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());
        let ticket = CommandGeneration::default().issue();

        let outcome = client.send_command(&ticket, "/turn/right", |_| {});
        assert_eq!(
            outcome,
            CommandOutcome::Rendered {
                polls: 2,
                failed_polls: 1,
                changed: true,
            }
        );
    }

    #[test]
    fn command_post_failure_reports_fixed_message() {
        let transport = ScriptedTransport::with_statuses(vec![Ok(status_at(0, 1))]);
        *transport.command.borrow_mut() = Some(Err(SyncError::DecodeResponse {
            message: "expected value".to_string(),
        }));
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());
        let ticket = CommandGeneration::default().issue();

        let mut events = Vec::new();
        let outcome = client.send_command(&ticket, "/stop", |event| events.push(event));

        assert_eq!(outcome, CommandOutcome::CommandFailed);
        assert_eq!(events, vec![SyncEvent::Status(COMMAND_ERROR_MESSAGE.to_string())]);
        assert!(client.pacer.pauses.borrow().is_empty());
    }

    #[test]
    fn superseded_command_stops_without_rendering() {
        let generation = CommandGeneration::default();
        let transport = ScriptedTransport::with_statuses(vec![Ok(status_at(0, 1))]);
        let pacer = RecordingPacer {
            supersede_on_pause: Some((3, generation.clone())),
            ..RecordingPacer::default()
        };
        let client = SyncClient::new(transport, pacer, PollPolicy::default());
        let ticket = generation.issue();

        let mut events = Vec::new();
        let outcome = client.send_command(&ticket, "/move/up", |event| events.push(event));

        assert_eq!(outcome, CommandOutcome::Superseded { polls: 2 });
        assert!(!events
            .iter()
            .any(|event| matches!(event, SyncEvent::Render(_))));
        // baseline + two polls, nothing after the newer ticket appeared
        assert_eq!(client.transport.status_fetches(), 3);
        assert!(!ticket.is_current());
    }

    #[test]
    fn final_fetch_failure_reports_refresh_error() {
        let transport = ScriptedTransport::with_statuses(vec![
            Ok(status_at(0, 1)),
            Ok(status_at(3, 1)),
            Err(SyncError::Http {
                message: "gone".to_string(),
            }),
        ]);
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());
        let ticket = CommandGeneration::default().issue();

        let mut events = Vec::new();
        let outcome = client.send_command(&ticket, "/move/down", |event| events.push(event));

        assert_eq!(outcome, CommandOutcome::RefreshFailed { polls: 1 });
        assert_eq!(
            events.last(),
            Some(&SyncEvent::Status(REFRESH_ERROR_MESSAGE.to_string()))
        );
    }

    #[test]
    fn select_turtle_refreshes_on_success() {
        let transport = ScriptedTransport::with_statuses(vec![Ok(status_at(5, 3))]);
        *transport.select.borrow_mut() = Some(Ok(SetTurtleResponse {
            success: true,
            error: None,
            message: Some("Turtle 4821 set as current turtle.".to_string()),
        }));
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());

        let mut events = Vec::new();
        let outcome = client
            .select_turtle("4821", |event| events.push(event))
            .expect("select turtle");

        assert_eq!(outcome, SelectOutcome::Selected);
        assert_eq!(
            events[0],
            SyncEvent::Status("Turtle 4821 set as current turtle.".to_string())
        );
        assert!(matches!(events[1], SyncEvent::Render(_)));
    }

    #[test]
    fn select_turtle_rejection_raises_alert_without_refresh() {
        let transport = ScriptedTransport::with_statuses(vec![Ok(status_at(0, 1))]);
        *transport.select.borrow_mut() = Some(Ok(SetTurtleResponse {
            success: false,
            error: None,
            message: Some("Turtle not connected.".to_string()),
        }));
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());

        let mut events = Vec::new();
        let outcome = client
            .select_turtle("17", |event| events.push(event))
            .expect("select turtle");

        assert_eq!(
            outcome,
            SelectOutcome::Rejected {
                detail: "Turtle not connected.".to_string()
            }
        );
        assert_eq!(events, vec![SyncEvent::Alert("Turtle not connected.".to_string())]);
        assert_eq!(client.transport.status_fetches(), 0);
    }

    #[test]
    fn select_turtle_transport_failure_uses_fallback_alert() {
        let transport = ScriptedTransport::default();
        *transport.select.borrow_mut() = Some(Err(SyncError::Http {
            message: "refused".to_string(),
        }));
        let client = SyncClient::new(transport, RecordingPacer::default(), PollPolicy::default());

        let mut events = Vec::new();
        let result = client.select_turtle("17", |event| events.push(event));

        assert!(result.is_err());
        assert_eq!(
            events,
            vec![SyncEvent::Alert(SELECT_TURTLE_FALLBACK_ERROR.to_string())]
        );
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let generation = CommandGeneration::default();
        let first = generation.issue();
        assert!(first.is_current());
        let second = generation.issue();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn endpoint_url_joins_relative_paths_and_keeps_absolute_urls() {
        let transport =
            HttpStatusTransport::new("http://127.0.0.1:5000/", Duration::from_secs(1))
                .expect("build transport");
        assert_eq!(
            transport.endpoint_url("/move/forward"),
            "http://127.0.0.1:5000/move/forward"
        );
        assert_eq!(transport.endpoint_url("stop"), "http://127.0.0.1:5000/stop");
        assert_eq!(
            transport.endpoint_url("https://other.example/turn/left"),
            "https://other.example/turn/left"
        );
    }
}
