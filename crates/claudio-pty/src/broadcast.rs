//! Fan-out of terminal events to the UI and other consumers.
//!
//! Two kinds of consumer are supported:
//!
//! - [`EventSink`]s receive every event synchronously and must not block
//!   (the Tauri window emitter is one).
//! - [`Subscription`]s are bounded channels, either for one session or for
//!   all of them. Publishing waits for room in each subscription instead of
//!   dropping events, so a slow subscriber slows the sessions it watches
//!   down to its own pace.
//!
//! Each session's events are published by a single output pump, so per
//! session every consumer sees events in production order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::events::TerminalEvent;
use crate::session::SessionId;

/// Synchronous, non-blocking event consumer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TerminalEvent);
}

/// Receiving end of a subscription.
///
/// `recv` returns `None` once the subscribed session has ended and all of
/// its events have been received (per-session), or once the broadcaster is
/// gone (all sessions).
pub struct Subscription {
    rx: mpsc::Receiver<TerminalEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TerminalEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive, `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<TerminalEvent> {
        self.rx.try_recv().ok()
    }
}

pub struct Broadcaster {
    capacity: usize,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    by_session: Mutex<HashMap<SessionId, Vec<mpsc::Sender<TerminalEvent>>>>,
    all_sessions: Mutex<Vec<mpsc::Sender<TerminalEvent>>>,
}

impl Broadcaster {
    /// `capacity` is the number of events each subscription buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sinks: RwLock::new(Vec::new()),
            by_session: Mutex::new(HashMap::new()),
            all_sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Subscribe to one session's events.
    pub fn subscribe(&self, session_id: &SessionId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.by_session
            .lock()
            .entry(session_id.clone())
            .or_default()
            .push(tx);
        Subscription { rx }
    }

    /// Subscribe to every session's events.
    pub fn subscribe_all(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.all_sessions.lock().push(tx);
        Subscription { rx }
    }

    /// Deliver `event` to every sink and matching subscription.
    pub async fn publish(&self, event: TerminalEvent) {
        let sinks = self.sinks.read().clone();
        for sink in &sinks {
            sink.emit(&event);
        }

        let mut targets = self.all_sessions.lock().clone();
        if let Some(subs) = self.by_session.lock().get(event.session_id()) {
            targets.extend(subs.iter().cloned());
        }

        let mut dropped = false;
        for tx in &targets {
            if tx.send(event.clone()).await.is_err() {
                dropped = true;
            }
        }
        if dropped {
            self.prune();
        }
    }

    /// Drop the per-session subscriptions of a finished session so their
    /// receivers end after draining.
    pub fn close_session(&self, session_id: &SessionId) {
        self.by_session.lock().remove(session_id);
    }

    /// Number of open subscriptions, per-session and global.
    pub fn subscriber_count(&self) -> usize {
        let per_session: usize = self.by_session.lock().values().map(Vec::len).sum();
        per_session + self.all_sessions.lock().len()
    }

    fn prune(&self) {
        self.all_sessions.lock().retain(|tx| !tx.is_closed());
        let mut by_session = self.by_session.lock();
        for subs in by_session.values_mut() {
            subs.retain(|tx| !tx.is_closed());
        }
        by_session.retain(|_, subs| !subs.is_empty());
    }
}
