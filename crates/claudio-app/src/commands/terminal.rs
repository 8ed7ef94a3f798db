//! Tauri commands for terminal session management.
//!
//! These are invoked from the frontend via `invoke()`. Output and exit
//! notifications do not flow through here; they arrive as `terminal:output`
//! and `terminal:exit` events.

use claudio_pty::{Session, SessionId, SessionSummary, TerminalError};

use crate::state::AppState;

/// Create a new terminal session and return its record.
///
/// Without `command` the configured login shell is started; otherwise the
/// command runs through `/bin/sh -c`. Zero dimensions fall back to 80x24.
/// The first session created becomes the active one.
#[tauri::command]
pub async fn terminal_create_session(
    state: tauri::State<'_, AppState>,
    cols: u16,
    rows: u16,
    command: Option<String>,
) -> Result<Session, TerminalError> {
    state.registry.create_session(command.as_deref(), cols, rows)
}

/// Deliver keystrokes to a session's PTY.
#[tauri::command]
pub async fn terminal_write_input(
    state: tauri::State<'_, AppState>,
    session_id: SessionId,
    data: Vec<u8>,
) -> Result<(), TerminalError> {
    state.registry.write_input(&session_id, data).await
}

/// Resize a session's terminal. The child receives SIGWINCH.
#[tauri::command]
pub fn terminal_resize(
    state: tauri::State<'_, AppState>,
    session_id: SessionId,
    cols: u16,
    rows: u16,
) -> Result<(), TerminalError> {
    state.registry.resize(&session_id, cols, rows)
}

/// Terminate a session. Its `terminal:exit` event follows.
#[tauri::command]
pub async fn terminal_kill_session(
    state: tauri::State<'_, AppState>,
    session_id: SessionId,
) -> Result<(), TerminalError> {
    state.registry.kill_session(&session_id).await
}

/// Live sessions in creation order.
#[tauri::command]
pub fn terminal_list_sessions(state: tauri::State<'_, AppState>) -> Vec<SessionSummary> {
    state.registry.list()
}

/// Mark a live session as the one the UI shows.
#[tauri::command]
pub fn terminal_set_active(
    state: tauri::State<'_, AppState>,
    session_id: SessionId,
) -> Result<(), TerminalError> {
    state.registry.set_active(&session_id)
}

/// The active session, if any.
#[tauri::command]
pub fn terminal_get_active(state: tauri::State<'_, AppState>) -> Option<SessionId> {
    state.registry.get_active()
}

/// Full record of one live session.
#[tauri::command]
pub fn terminal_get_session(
    state: tauri::State<'_, AppState>,
    session_id: SessionId,
) -> Result<Session, TerminalError> {
    state.registry.get(&session_id)
}

/// Number of live sessions.
#[tauri::command]
pub fn terminal_session_count(state: tauri::State<'_, AppState>) -> usize {
    state.registry.len()
}
