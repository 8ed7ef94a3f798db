//! Terminal preferences stored in the `settings` table.
//!
//! Every field is optional; an unset field leaves the runtime default (from
//! the environment) in place.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::settings;

const KEY_DEFAULT_SHELL: &str = "terminal.default_shell";
const KEY_WORKING_DIR: &str = "terminal.working_dir";
const KEY_LOGIN_SHELL: &str = "terminal.login_shell";
const KEY_KILL_GRACE_MS: &str = "terminal.kill_grace_ms";
const KEY_EXTRA_ENV: &str = "terminal.extra_env";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalPreferences {
    pub default_shell: Option<String>,
    pub working_dir: Option<String>,
    pub login_shell: Option<bool>,
    pub kill_grace_ms: Option<u64>,
    /// Added to every session's environment after the built-in variables.
    pub extra_env: Vec<(String, String)>,
}

pub fn load(conn: &Connection) -> rusqlite::Result<TerminalPreferences> {
    let extra_env = match settings::get(conn, KEY_EXTRA_ENV)? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("ignoring malformed {KEY_EXTRA_ENV}: {e}");
            Vec::new()
        }),
        None => Vec::new(),
    };

    Ok(TerminalPreferences {
        default_shell: non_empty(settings::get(conn, KEY_DEFAULT_SHELL)?),
        working_dir: non_empty(settings::get(conn, KEY_WORKING_DIR)?),
        login_shell: parse(KEY_LOGIN_SHELL, settings::get(conn, KEY_LOGIN_SHELL)?),
        kill_grace_ms: parse(KEY_KILL_GRACE_MS, settings::get(conn, KEY_KILL_GRACE_MS)?),
        extra_env,
    })
}

/// Replace the stored preferences. Unset fields are removed.
pub fn save(conn: &Connection, prefs: &TerminalPreferences) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;

    let shell = non_empty(prefs.default_shell.clone());
    let working_dir = non_empty(prefs.working_dir.clone());
    settings::put(&tx, KEY_DEFAULT_SHELL, shell.as_deref())?;
    settings::put(&tx, KEY_WORKING_DIR, working_dir.as_deref())?;
    settings::put(
        &tx,
        KEY_LOGIN_SHELL,
        prefs.login_shell.map(|v| v.to_string()).as_deref(),
    )?;
    settings::put(
        &tx,
        KEY_KILL_GRACE_MS,
        prefs.kill_grace_ms.map(|v| v.to_string()).as_deref(),
    )?;

    let extra_env = if prefs.extra_env.is_empty() {
        None
    } else {
        serde_json::to_string(&prefs.extra_env).ok()
    };
    settings::put(&tx, KEY_EXTRA_ENV, extra_env.as_deref())?;

    tx.commit()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring malformed {key}: {raw:?}");
            None
        }
    }
}
