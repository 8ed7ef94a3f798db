// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod commands;
mod emitter;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use claudio_pty::SessionRegistry;
use emitter::TauriEventSink;
use state::AppState;
use tauri::{Manager, RunEvent};

fn main() {
    // Set up the global ~/.claudio directory.
    let claudio_home = home_dir()
        .expect("could not determine home directory")
        .join(".claudio");
    std::fs::create_dir_all(&claudio_home).expect("failed to create ~/.claudio");

    // Open (or create) the SQLite database at ~/.claudio/claudio.db.
    let db_path = claudio_home.join("claudio.db");
    let db = claudio_db::open(&db_path).expect("failed to open database");

    // The error is logged once the log plugin is installed.
    let (preferences, preferences_error) = state::load_preferences(&db);
    if let Some(e) = &preferences_error {
        eprintln!("warning: could not load terminal preferences: {e}");
    }
    let registry = SessionRegistry::new(state::terminal_config(&preferences));
    let app_state = AppState::new(db, registry);

    let pty_level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let app = tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(log::LevelFilter::Info)
                .level_for("claudio_pty", pty_level)
                .build(),
        )
        .manage(app_state)
        .setup(move |app| {
            let state: tauri::State<AppState> = app.state();
            let sink = TauriEventSink::new(app.handle().clone());
            state.registry.add_sink(Arc::new(sink));
            log::info!("claudio started, database at {}", db_path.display());
            if let Some(e) = &preferences_error {
                log::warn!("could not load terminal preferences, using defaults: {e}");
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::terminal::terminal_create_session,
            commands::terminal::terminal_write_input,
            commands::terminal::terminal_resize,
            commands::terminal::terminal_kill_session,
            commands::terminal::terminal_list_sessions,
            commands::terminal::terminal_set_active,
            commands::terminal::terminal_get_active,
            commands::terminal::terminal_get_session,
            commands::terminal::terminal_session_count,
            commands::preferences::terminal_get_preferences,
            commands::preferences::terminal_set_preferences,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            let state: tauri::State<AppState> = handle.state();
            let registry = state.registry.clone();
            tauri::async_runtime::block_on(registry.shutdown());
        }
    });
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
