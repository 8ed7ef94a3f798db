//! Per-session output pump that drains the PTY and publishes its output.
//!
//! Each session gets its own tokio task. The blocking PTY reads happen on the
//! session's reader thread; the pump only awaits the chunks it produces, so
//! a quiet session costs nothing and a busy one never holds registry locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant, MissedTickBehavior};

use crate::events::TerminalEvent;
use crate::pty::{PtyError, PtyOutput};
use crate::registry::SessionRegistry;
use crate::session::{ExitReason, SessionId, TerminalSession};

/// How long to wait for the exit status once output has ended.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);
const REAP_POLL: Duration = Duration::from_millis(10);
/// How often a running child is checked for exit. Output alone cannot tell:
/// a background job that inherited the terminal keeps it open.
const CHILD_POLL: Duration = Duration::from_millis(100);
/// Longest wait for output still queued once the child has been reaped.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Start the output pump for a session.
///
/// The pump runs until the PTY reports end of output, the child is reaped,
/// a read fails, or a stop is requested through `stop_rx`. It then deregisters the session and
/// publishes exactly one exit event, after the last output chunk.
pub(crate) fn start_output_pump(
    session: Arc<TerminalSession>,
    output: PtyOutput,
    stop_rx: oneshot::Receiver<()>,
    registry: SessionRegistry,
) -> JoinHandle<ExitReason> {
    tokio::spawn(pump_loop(session, output, stop_rx, registry))
}

async fn pump_loop(
    session: Arc<TerminalSession>,
    mut output: PtyOutput,
    mut stop_rx: oneshot::Receiver<()>,
    registry: SessionRegistry,
) -> ExitReason {
    let id = session.id().clone();
    let mut child_poll = tokio::time::interval(CHILD_POLL);
    child_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;
            // A dropped sender also means the session is being torn down.
            _ = &mut stop_rx => break ExitReason::Killed,
            chunk = output.read_chunk() => match chunk {
                Ok(data) => {
                    registry
                        .broadcaster()
                        .publish(TerminalEvent::output(&id, data))
                        .await;
                }
                Err(PtyError::Eof) => break exit_reason(&session).await,
                Err(err) => {
                    log::warn!("session {id}: PTY read failed: {err}");
                    break ExitReason::Failed { message: err.to_string() };
                }
            },
            _ = child_poll.tick() => {
                // A kill in progress holds the child; its own path ends the pump.
                if session.pty().was_killed() {
                    continue;
                }
                if let Some(code) = session.pty().try_wait() {
                    drain(&id, &mut output, &registry).await;
                    break if session.pty().was_killed() {
                        ExitReason::Killed
                    } else {
                        ExitReason::Exited { code }
                    };
                }
            }
        }
    };

    if matches!(reason, ExitReason::Failed { .. }) {
        // The child may still be running behind a broken terminal.
        let grace = registry.config().kill_grace;
        let doomed = Arc::clone(&session);
        match tokio::task::spawn_blocking(move || doomed.pty().kill(grace)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("session {id}: kill after read failure: {err}"),
            Err(err) => log::error!("session {id}: kill task failed: {err}"),
        }
    }

    registry.deregister(&id, &reason);
    log::info!("session {id} ended: {reason:?}");

    let broadcaster = registry.broadcaster();
    broadcaster.publish(TerminalEvent::exit(&id, reason.clone())).await;
    broadcaster.close_session(&id);
    reason
}

/// Publish output the reader already produced, up to `DRAIN_TIMEOUT`.
async fn drain(id: &SessionId, output: &mut PtyOutput, registry: &SessionRegistry) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while let Ok(Ok(data)) = timeout_at(deadline, output.read_chunk()).await {
        registry
            .broadcaster()
            .publish(TerminalEvent::output(id, data))
            .await;
    }
}

/// Work out why output ended: an explicit kill, or the child's own exit.
async fn exit_reason(session: &TerminalSession) -> ExitReason {
    let pty = session.pty();
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        if pty.was_killed() {
            return ExitReason::Killed;
        }
        if let Some(code) = pty.try_wait() {
            return ExitReason::Exited { code };
        }
        if Instant::now() >= deadline {
            return ExitReason::Unknown;
        }
        tokio::time::sleep(REAP_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerminalConfig;
    use crate::session::{Dimensions, SessionState, ABNORMAL_EXIT_CODE};
    use tokio::time::timeout;

    fn sh_config() -> TerminalConfig {
        TerminalConfig {
            default_shell: Some("/bin/sh".to_string()),
            login_shell: false,
            working_dir: Some(std::env::temp_dir()),
            ..TerminalConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_failure_ends_session_once() {
        let config = sh_config();
        let registry = SessionRegistry::new(config.clone());
        let launch = config.launch(None);
        let (session, pty_output, stop_rx) = TerminalSession::spawn(
            SessionId::generate(),
            1,
            &launch,
            Dimensions { cols: 80, rows: 24 },
            &config,
        )
        .unwrap();
        let session = Arc::new(session);
        session.mark_running();
        assert!(registry.register(Arc::clone(&session)));
        let mut sub = registry.subscribe(session.id()).unwrap();

        let broken = PtyOutput::failing(std::io::Error::new(
            std::io::ErrorKind::Other,
            "terminal went away",
        ));
        let pump = start_output_pump(Arc::clone(&session), broken, stop_rx, registry.clone());
        let reason = timeout(Duration::from_secs(5), pump)
            .await
            .expect("pump did not finish")
            .unwrap();
        assert!(matches!(reason, ExitReason::Failed { .. }), "got {reason:?}");

        match sub.recv().await {
            Some(TerminalEvent::Exit(exit)) => {
                assert_eq!(exit.session_id, *session.id());
                assert_eq!(exit.code, ABNORMAL_EXIT_CODE);
                assert!(matches!(
                    exit.reason,
                    ExitReason::Failed { ref message } if message.contains("terminal went away")
                ));
            }
            other => panic!("expected exit event, got {other:?}"),
        }
        // Nothing follows the exit event.
        assert_eq!(sub.recv().await, None);

        assert!(registry.is_empty());
        assert_eq!(registry.get_active(), None);
        assert_eq!(session.state(), SessionState::Exited);
        assert!(!session.pty().is_alive());
        drop(pty_output);
    }
}
