//! Application state shared between Tauri commands and the event emitter.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use claudio_db::TerminalPreferences;
use claudio_pty::{SessionRegistry, TerminalConfig};
use rusqlite::Connection;

/// Global app state managed by Tauri.
pub struct AppState {
    /// All live terminal sessions.
    pub registry: SessionRegistry,
    /// Settings database at `~/.claudio/claudio.db`.
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(db: Connection, registry: SessionRegistry) -> Self {
        Self {
            registry,
            db: Arc::new(Mutex::new(db)),
        }
    }
}

/// Stored preferences, or the defaults and the reason they could not be
/// read.
pub fn load_preferences(db: &Connection) -> (TerminalPreferences, Option<String>) {
    match claudio_db::preferences::load(db) {
        Ok(prefs) => (prefs, None),
        Err(e) => (TerminalPreferences::default(), Some(e.to_string())),
    }
}

/// Terminal config from the environment with stored preferences on top.
pub fn terminal_config(prefs: &TerminalPreferences) -> TerminalConfig {
    let mut config = TerminalConfig::from_env();
    apply_preferences(&mut config, prefs);
    config
}

fn apply_preferences(config: &mut TerminalConfig, prefs: &TerminalPreferences) {
    if let Some(shell) = &prefs.default_shell {
        config.default_shell = Some(shell.clone());
    }
    if let Some(dir) = &prefs.working_dir {
        config.working_dir = Some(PathBuf::from(dir));
    }
    if let Some(login) = prefs.login_shell {
        config.login_shell = login;
    }
    if let Some(ms) = prefs.kill_grace_ms {
        config.kill_grace = Duration::from_millis(ms);
    }
    config.env.extend(prefs.extra_env.iter().cloned());
}
