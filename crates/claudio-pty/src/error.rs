//! Errors returned to command callers.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::pty::PtyError;
use crate::session::SessionId;

/// Failure of a registry operation, as reported to the UI.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The terminal could not be started. Nothing was registered.
    #[error("could not start terminal: {0}")]
    Spawn(String),
    /// The id is unknown or the session already ended.
    #[error("session {0} not found")]
    NotFound(SessionId),
    /// A read, write or resize failed. The session stays registered.
    #[error("terminal I/O error: {0}")]
    Io(String),
}

impl TerminalError {
    /// Translate a PTY error for session `id`. A closed PTY means the session
    /// is on its way out, which callers see as `NotFound`.
    pub fn from_pty(id: &SessionId, err: PtyError) -> Self {
        match err {
            PtyError::Closed | PtyError::Eof => TerminalError::NotFound(id.clone()),
            PtyError::SpawnFailed(msg) => TerminalError::Spawn(msg),
            other => TerminalError::Io(other.to_string()),
        }
    }

    /// Stable discriminant for the RPC boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalError::Spawn(_) => "spawn",
            TerminalError::NotFound(_) => "not_found",
            TerminalError::Io(_) => "io",
        }
    }
}

impl Serialize for TerminalError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let session_id = match self {
            TerminalError::NotFound(id) => Some(id),
            _ => None,
        };
        let mut state = serializer.serialize_struct("TerminalError", 3)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        if let Some(id) = session_id {
            state.serialize_field("session_id", id)?;
        } else {
            state.skip_field("session_id")?;
        }
        state.end()
    }
}
