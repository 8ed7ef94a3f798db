//! Delivers terminal events to every webview window.

use claudio_pty::{EventSink, TerminalEvent};
use tauri::{AppHandle, Emitter, Runtime};

/// Event sink that emits `terminal:output` and `terminal:exit` through the
/// Tauri event system. `emit` only queues the event for the webviews, so it
/// never blocks the session's output pump.
pub struct TauriEventSink<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriEventSink<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> EventSink for TauriEventSink<R> {
    fn emit(&self, event: &TerminalEvent) {
        let result = match event {
            TerminalEvent::Output(payload) => self.app.emit(event.name(), payload),
            TerminalEvent::Exit(payload) => self.app.emit(event.name(), payload),
        };
        if let Err(e) = result {
            log::warn!(
                "failed to emit {} for session {}: {e}",
                event.name(),
                event.session_id()
            );
        }
    }
}
