//! Tauri commands for stored terminal preferences.

use claudio_db::TerminalPreferences;

use crate::state::{terminal_config, AppState};

/// Read the stored terminal preferences.
#[tauri::command]
pub fn terminal_get_preferences(
    state: tauri::State<'_, AppState>,
) -> Result<TerminalPreferences, String> {
    let db = state.db.lock().map_err(|e| format!("lock error: {e}"))?;
    claudio_db::preferences::load(&db).map_err(|e| format!("db error: {e}"))
}

/// Store terminal preferences and apply them to sessions created from now on.
#[tauri::command]
pub fn terminal_set_preferences(
    state: tauri::State<'_, AppState>,
    preferences: TerminalPreferences,
) -> Result<(), String> {
    {
        let db = state.db.lock().map_err(|e| format!("lock error: {e}"))?;
        claudio_db::preferences::save(&db, &preferences)
            .map_err(|e| format!("db error: {e}"))?;
    }
    state.registry.set_config(terminal_config(&preferences));
    log::info!("terminal preferences updated");
    Ok(())
}
