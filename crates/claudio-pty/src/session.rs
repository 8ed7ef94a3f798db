use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::{LaunchSpec, TerminalConfig};
use crate::pty::{PtyError, PtyHandle, PtyOutput};

/// Exit code reported to the UI for sessions that were killed or failed.
pub const ABNORMAL_EXIT_CODE: i32 = -1;

/// Unique identifier for a terminal session.
///
/// Random UUIDs, so identifiers are never reused within a run and need no
/// coordination between concurrent creates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

/// Lifecycle of a session. Only `Running` accepts input and resizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Exited,
    Killed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// The child exited on its own with this code.
    Exited { code: u32 },
    /// The child went away but its exit status could not be collected.
    Unknown,
    /// The session was closed with `kill_session`.
    Killed,
    /// Reading the terminal failed; the child was torn down.
    Failed { message: String },
}

impl ExitReason {
    /// Numeric code for UIs that only understand exit codes.
    pub fn code(&self) -> i32 {
        match self {
            ExitReason::Exited { code } => i32::try_from(*code).unwrap_or(ABNORMAL_EXIT_CODE),
            ExitReason::Unknown => 0,
            ExitReason::Killed | ExitReason::Failed { .. } => ABNORMAL_EXIT_CODE,
        }
    }
}

/// Row returned by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub created_at: u64,
    pub is_active: bool,
}

/// Full description of one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub created_at: u64,
    pub shell: String,
    pub cwd: String,
    pub is_active: bool,
    pub cols: u16,
    pub rows: u16,
}

/// A live terminal: a PTY process plus the metadata the UI lists.
///
/// Shared between the registry, the session's output pump and in-flight
/// commands. Once the session has left `Running` its PTY rejects input.
pub struct TerminalSession {
    id: SessionId,
    seq: u64,
    title: String,
    created_at: u64,
    shell: String,
    cwd: PathBuf,
    pty: PtyHandle,
    dimensions: Mutex<Dimensions>,
    state: Mutex<SessionState>,
    stop_pump: Mutex<Option<oneshot::Sender<()>>>,
}

impl TerminalSession {
    /// Spawn the session's child process.
    ///
    /// Returns the session, the PTY output its pump will drain, and the
    /// receiver the pump watches for a stop request.
    pub(crate) fn spawn(
        id: SessionId,
        seq: u64,
        launch: &LaunchSpec,
        size: Dimensions,
        config: &TerminalConfig,
    ) -> Result<(Self, PtyOutput, oneshot::Receiver<()>), PtyError> {
        let label = id.as_str().chars().take(8).collect::<String>();
        let (pty, output) = PtyHandle::spawn(&label, launch, size, config)?;
        let (stop_tx, stop_rx) = oneshot::channel();

        let session = Self {
            id,
            seq,
            title: launch.title.clone(),
            created_at: unix_now(),
            shell: launch.shell.clone(),
            cwd: launch.cwd.clone(),
            pty,
            dimensions: Mutex::new(size),
            state: Mutex::new(SessionState::Created),
            stop_pump: Mutex::new(Some(stop_tx)),
        };
        Ok((session, output, stop_rx))
    }

    /// Returns the session's unique identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Creation sequence number within the registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn dimensions(&self) -> Dimensions {
        *self.dimensions.lock()
    }

    pub fn pty(&self) -> &PtyHandle {
        &self.pty
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Created {
            *state = SessionState::Running;
        }
    }

    /// Move to the terminal state matching `reason`. The first terminal
    /// state sticks.
    pub(crate) fn finish(&self, reason: &ExitReason) {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Created | SessionState::Running) {
            *state = match reason {
                ExitReason::Killed => SessionState::Killed,
                _ => SessionState::Exited,
            };
        }
    }

    /// Write user input to the PTY.
    pub async fn write_input(&self, data: Vec<u8>) -> Result<(), PtyError> {
        self.ensure_running()?;
        self.pty.write(data).await
    }

    /// Resize the PTY and remember the new size.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.ensure_running()?;
        let size = Dimensions { cols, rows };
        // Held across the ioctl so concurrent resizes land in a consistent order.
        let mut dimensions = self.dimensions.lock();
        self.pty.resize(size)?;
        *dimensions = size;
        Ok(())
    }

    /// Ask the output pump to stop. Later calls do nothing.
    pub(crate) fn stop_pump(&self) {
        if let Some(stop) = self.stop_pump.lock().take() {
            let _ = stop.send(());
        }
    }

    /// Mark the session killed and terminate its child. Blocks for at most
    /// `grace` plus the hang-up escalation.
    pub(crate) fn kill(&self, grace: Duration) -> Result<(), PtyError> {
        self.finish(&ExitReason::Killed);
        self.pty.kill(grace)
    }

    pub fn record(&self, is_active: bool) -> Session {
        let size = self.dimensions();
        Session {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            shell: self.shell.clone(),
            cwd: self.cwd.to_string_lossy().into_owned(),
            is_active,
            cols: size.cols,
            rows: size.rows,
        }
    }

    pub fn summary(&self, is_active: bool) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            is_active,
        }
    }

    fn ensure_running(&self) -> Result<(), PtyError> {
        match self.state() {
            SessionState::Running => Ok(()),
            _ => Err(PtyError::Closed),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_session(seq: u64) -> (TerminalSession, PtyOutput, oneshot::Receiver<()>) {
        let config = TerminalConfig {
            default_shell: Some("/bin/sh".to_string()),
            login_shell: false,
            ..TerminalConfig::default()
        };
        let launch = config.launch(None);
        TerminalSession::spawn(
            SessionId::generate(),
            seq,
            &launch,
            Dimensions { cols: 80, rows: 24 },
            &config,
        )
        .expect("failed to spawn session")
    }

    #[test]
    fn test_session_ids_are_distinct() {
        let ids: std::collections::HashSet<SessionId> =
            (0..100).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_session_id_serializes_as_string() {
        let id = SessionId::from("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
        let back: SessionId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_exit_reason_codes() {
        assert_eq!(ExitReason::Exited { code: 3 }.code(), 3);
        assert_eq!(ExitReason::Unknown.code(), 0);
        assert_eq!(ExitReason::Killed.code(), ABNORMAL_EXIT_CODE);
        assert_eq!(
            ExitReason::Failed { message: "boom".into() }.code(),
            ABNORMAL_EXIT_CODE
        );
    }

    #[test]
    fn test_exit_reason_is_tagged() {
        let json = serde_json::to_value(ExitReason::Exited { code: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "exited", "code": 2}));
        let json = serde_json::to_value(ExitReason::Killed).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "killed"}));
    }

    #[test]
    fn test_create_session() {
        let (session, _output, _stop) = sh_session(1);
        assert_eq!(session.seq(), 1);
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.title(), "sh");
        assert!(session.pty().is_alive());

        let record = session.record(true);
        assert_eq!(record.shell, "/bin/sh");
        assert_eq!((record.cols, record.rows), (80, 24));
        assert!(record.is_active);
        session.kill(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_resize_requires_running() {
        let (session, _output, _stop) = sh_session(1);
        assert!(matches!(session.resize(100, 40), Err(PtyError::Closed)));

        session.mark_running();
        session.resize(100, 40).unwrap();
        assert_eq!(session.dimensions(), Dimensions { cols: 100, rows: 40 });
        session.kill(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_first_terminal_state_sticks() {
        let (session, _output, _stop) = sh_session(1);
        session.mark_running();
        session.kill(Duration::from_secs(2)).unwrap();
        assert_eq!(session.state(), SessionState::Killed);

        session.finish(&ExitReason::Exited { code: 0 });
        assert_eq!(session.state(), SessionState::Killed);
        assert!(matches!(session.resize(90, 30), Err(PtyError::Closed)));
    }

    #[test]
    fn test_stop_pump_signals_once() {
        let (session, _output, mut stop) = sh_session(1);
        session.stop_pump();
        session.stop_pump();
        assert!(stop.try_recv().is_ok());
        session.kill(Duration::from_secs(2)).unwrap();
    }
}
