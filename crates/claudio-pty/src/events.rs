//! Event types pushed from the backend to the UI.
//!
//! Payloads serialize to the JSON shapes the frontend listens for on the
//! `terminal:output` and `terminal:exit` channels.

use serde::Serialize;

use crate::session::{ExitReason, SessionId};

/// Event name for session output.
pub const OUTPUT_EVENT: &str = "terminal:output";
/// Event name for session termination.
pub const EXIT_EVENT: &str = "terminal:exit";

/// One ordered chunk of raw PTY output.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TerminalOutput {
    pub session_id: SessionId,
    /// Raw bytes, serialized as a JSON number array.
    pub data: Vec<u8>,
}

/// A session ended, voluntarily or via kill.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TerminalExit {
    pub session_id: SessionId,
    pub code: i32,
    pub reason: ExitReason,
}

/// Everything the broadcaster delivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalEvent {
    Output(TerminalOutput),
    Exit(TerminalExit),
}

impl TerminalEvent {
    pub fn output(session_id: &SessionId, data: Vec<u8>) -> Self {
        TerminalEvent::Output(TerminalOutput {
            session_id: session_id.clone(),
            data,
        })
    }

    pub fn exit(session_id: &SessionId, reason: ExitReason) -> Self {
        TerminalEvent::Exit(TerminalExit {
            session_id: session_id.clone(),
            code: reason.code(),
            reason,
        })
    }

    /// Channel name the UI listens on.
    pub fn name(&self) -> &'static str {
        match self {
            TerminalEvent::Output(_) => OUTPUT_EVENT,
            TerminalEvent::Exit(_) => EXIT_EVENT,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            TerminalEvent::Output(output) => &output.session_id,
            TerminalEvent::Exit(exit) => &exit.session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_payload_shape() {
        let id = SessionId::from("s-1");
        let event = TerminalEvent::output(&id, b"hi".to_vec());
        assert_eq!(event.name(), "terminal:output");
        assert_eq!(event.session_id(), &id);

        let TerminalEvent::Output(payload) = event else {
            panic!("expected output event");
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"session_id": "s-1", "data": [104, 105]})
        );
    }

    #[test]
    fn test_exit_payload_carries_code_and_reason() {
        let id = SessionId::from("s-2");
        let event = TerminalEvent::exit(&id, ExitReason::Killed);
        assert_eq!(event.name(), "terminal:exit");

        let TerminalEvent::Exit(payload) = event else {
            panic!("expected exit event");
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"session_id": "s-2", "code": -1, "reason": {"kind": "killed"}})
        );
    }

    #[test]
    fn test_unknown_exit_is_not_confused_with_zero() {
        let id = SessionId::from("s-3");
        let TerminalEvent::Exit(unknown) = TerminalEvent::exit(&id, ExitReason::Unknown) else {
            panic!("expected exit event");
        };
        let TerminalEvent::Exit(clean) = TerminalEvent::exit(&id, ExitReason::Exited { code: 0 })
        else {
            panic!("expected exit event");
        };
        assert_eq!(unknown.code, clean.code);
        assert_ne!(unknown.reason, clean.reason);
    }
}
