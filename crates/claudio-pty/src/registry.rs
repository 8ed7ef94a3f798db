use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::broadcast::{Broadcaster, EventSink, Subscription};
use crate::config::{TerminalConfig, DEFAULT_COLS, DEFAULT_ROWS};
use crate::error::TerminalError;
use crate::pump::start_output_pump;
use crate::session::{Dimensions, ExitReason, Session, SessionId, SessionSummary, TerminalSession};

/// The authoritative set of live terminal sessions.
///
/// Cheap to clone; clones share the same sessions. A session is listed
/// from the moment its child is spawned until it is killed or its output
/// pump observes the child exiting.
///
/// Methods that start or stop output pumps (`create_session`,
/// `kill_session`, `shutdown`) must be called from within a tokio runtime.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<RegistryState>,
    config: RwLock<TerminalConfig>,
    broadcaster: Broadcaster,
    next_seq: AtomicU64,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Arc<TerminalSession>>,
    active: Option<SessionId>,
}

impl RegistryState {
    fn is_active(&self, id: &SessionId) -> bool {
        self.active.as_ref() == Some(id)
    }
}

impl SessionRegistry {
    pub fn new(config: TerminalConfig) -> Self {
        let broadcaster = Broadcaster::new(config.subscriber_capacity);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState::default()),
                config: RwLock::new(config),
                broadcaster,
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Snapshot of the config new sessions are created with.
    pub fn config(&self) -> TerminalConfig {
        self.inner.config.read().clone()
    }

    /// Replace the config for sessions created from now on.
    pub fn set_config(&self, config: TerminalConfig) {
        *self.inner.config.write() = config;
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.inner.broadcaster.add_sink(sink);
    }

    /// Create a new terminal session and start its output pump.
    ///
    /// Runs `command` through `/bin/sh -c` when given, otherwise the
    /// configured shell. The first session created while none is active
    /// becomes active. Zero dimensions are replaced by 80x24.
    pub fn create_session(
        &self,
        command: Option<&str>,
        cols: u16,
        rows: u16,
    ) -> Result<Session, TerminalError> {
        let config = self.config();
        let size = Dimensions {
            cols: if cols == 0 { DEFAULT_COLS } else { cols },
            rows: if rows == 0 { DEFAULT_ROWS } else { rows },
        };
        let launch = config.launch(command);
        let id = SessionId::generate();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);

        let (session, output, stop_rx) =
            TerminalSession::spawn(id.clone(), seq, &launch, size, &config).map_err(|e| {
                log::warn!("failed to start {}: {e}", launch.program);
                TerminalError::from_pty(&id, e)
            })?;
        let session = Arc::new(session);
        session.mark_running();

        let is_active = self.register(Arc::clone(&session));

        // Registered before the pump starts, so a child that exits at once
        // is still deregistered by its pump.
        start_output_pump(Arc::clone(&session), output, stop_rx, self.clone());

        log::info!(
            "session {id} started: {} {:?} in {} ({}x{})",
            launch.program,
            launch.args,
            launch.cwd.display(),
            size.cols,
            size.rows
        );
        Ok(session.record(is_active))
    }

    /// Kill a session and remove it.
    ///
    /// Waits for the child to go away (bounded by the config's grace period).
    /// The active pointer is cleared if it pointed at this session; no other
    /// session is promoted. The exit event follows from the session's pump.
    pub async fn kill_session(&self, id: &SessionId) -> Result<(), TerminalError> {
        let session = self.lookup(id)?;

        let grace = self.config().kill_grace;
        let doomed = Arc::clone(&session);
        match tokio::task::spawn_blocking(move || doomed.kill(grace)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("session {id}: kill reported {err}"),
            Err(err) => log::error!("session {id}: kill task failed: {err}"),
        }

        self.deregister(id, &ExitReason::Killed);
        session.stop_pump();
        log::info!("session {id} killed");
        Ok(())
    }

    /// Make `id` the active session.
    pub fn set_active(&self, id: &SessionId) -> Result<(), TerminalError> {
        let mut state = self.inner.state.lock();
        if !state.sessions.contains_key(id) {
            return Err(TerminalError::NotFound(id.clone()));
        }
        state.active = Some(id.clone());
        Ok(())
    }

    pub fn get_active(&self) -> Option<SessionId> {
        self.inner.state.lock().active.clone()
    }

    /// All live sessions in creation order.
    pub fn list(&self) -> Vec<SessionSummary> {
        let state = self.inner.state.lock();
        let mut sessions: Vec<&Arc<TerminalSession>> = state.sessions.values().collect();
        sessions.sort_by_key(|s| s.seq());
        sessions
            .into_iter()
            .map(|s| s.summary(state.is_active(s.id())))
            .collect()
    }

    /// Full record of one session.
    pub fn get(&self, id: &SessionId) -> Result<Session, TerminalError> {
        let state = self.inner.state.lock();
        state
            .sessions
            .get(id)
            .map(|s| s.record(state.is_active(id)))
            .ok_or_else(|| TerminalError::NotFound(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write user input bytes to a session's PTY.
    pub async fn write_input(&self, id: &SessionId, data: Vec<u8>) -> Result<(), TerminalError> {
        let session = self.lookup(id)?;
        session
            .write_input(data)
            .await
            .map_err(|e| TerminalError::from_pty(id, e))
    }

    /// Resize a session's PTY.
    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> Result<(), TerminalError> {
        let session = self.lookup(id)?;
        session.resize(cols, rows).map_err(|e| {
            log::debug!("session {id}: resize to {cols}x{rows} failed: {e}");
            TerminalError::from_pty(id, e)
        })
    }

    /// Subscribe to one live session's output and exit events.
    pub fn subscribe(&self, id: &SessionId) -> Result<Subscription, TerminalError> {
        // Checked under the registry lock so the session cannot finish
        // between the check and the subscription.
        let state = self.inner.state.lock();
        if !state.sessions.contains_key(id) {
            return Err(TerminalError::NotFound(id.clone()));
        }
        Ok(self.inner.broadcaster.subscribe(id))
    }

    /// Subscribe to every session's events.
    pub fn subscribe_all(&self) -> Subscription {
        self.inner.broadcaster.subscribe_all()
    }

    /// Kill every live session. Used at application exit.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<TerminalSession>> = {
            let mut state = self.inner.state.lock();
            state.active = None;
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        if sessions.is_empty() {
            return;
        }
        log::info!("shutting down {} terminal session(s)", sessions.len());

        let grace = self.config().kill_grace;
        let kills: Vec<_> = sessions
            .iter()
            .map(|session| {
                let doomed = Arc::clone(session);
                tokio::task::spawn_blocking(move || doomed.kill(grace))
            })
            .collect();
        for kill in kills {
            if let Ok(Err(err)) = kill.await {
                log::warn!("shutdown kill failed: {err}");
            }
        }
        for session in &sessions {
            session.stop_pump();
        }
    }

    /// Add a spawned session, making it active when nothing else is.
    /// Returns whether it is the active session.
    pub(crate) fn register(&self, session: Arc<TerminalSession>) -> bool {
        let id = session.id().clone();
        let mut state = self.inner.state.lock();
        state.sessions.insert(id.clone(), session);
        if state.active.is_none() {
            state.active = Some(id.clone());
        }
        state.is_active(&id)
    }

    /// Remove a finished session. No-op when it is already gone.
    pub(crate) fn deregister(&self, id: &SessionId, reason: &ExitReason) {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.sessions.remove(id);
            if removed.is_some() && state.is_active(id) {
                state.active = None;
            }
            removed
        };
        if let Some(session) = removed {
            session.finish(reason);
        }
    }

    fn lookup(&self, id: &SessionId) -> Result<Arc<TerminalSession>, TerminalError> {
        self.inner
            .state
            .lock()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| TerminalError::NotFound(id.clone()))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(TerminalConfig::from_env())
    }
}
