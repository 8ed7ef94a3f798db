//! Tunables for terminal sessions and the launch plan derived from them.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shell used when neither the config nor `$SHELL` names one.
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Size used when the UI asks for a zero-sized terminal (it has not been
/// laid out yet).
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Configuration shared by every session the registry creates.
///
/// Changing the registry's config only affects sessions created afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    /// Shell for sessions created without an explicit command. `None` falls
    /// back to [`FALLBACK_SHELL`].
    pub default_shell: Option<String>,
    /// Start default shells with `-l` so the login environment is loaded.
    pub login_shell: bool,
    /// Directory new sessions start in.
    pub working_dir: Option<PathBuf>,
    /// Extra environment for every child process.
    pub env: Vec<(String, String)>,
    /// How long `kill` waits for the child to be reaped after signalling it.
    pub kill_grace: Duration,
    /// Bounded wait when a session's input queue is full.
    pub write_timeout: Duration,
    /// Pending writes per session before `write_timeout` starts to apply.
    pub input_queue: usize,
    /// Chunks buffered between the PTY reader thread and the output pump.
    pub output_queue: usize,
    /// Size of a single PTY read.
    pub read_buffer: usize,
    /// Events buffered per subscription before publishing waits.
    pub subscriber_capacity: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_shell: None,
            login_shell: true,
            working_dir: None,
            env: vec![
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("COLORTERM".to_string(), "truecolor".to_string()),
            ],
            kill_grace: Duration::from_secs(2),
            write_timeout: Duration::from_millis(500),
            input_queue: 64,
            output_queue: 32,
            read_buffer: 4096,
            subscriber_capacity: 256,
        }
    }
}

impl TerminalConfig {
    /// Defaults with the shell and working directory taken from `$SHELL` and
    /// `$HOME`.
    pub fn from_env() -> Self {
        Self {
            default_shell: std::env::var("SHELL").ok().filter(|s| !s.is_empty()),
            working_dir: std::env::var_os("HOME").map(PathBuf::from),
            ..Self::default()
        }
    }

    /// The shell default sessions are started with.
    pub fn shell(&self) -> &str {
        self.default_shell.as_deref().unwrap_or(FALLBACK_SHELL)
    }

    /// The directory new sessions start in.
    pub fn cwd(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Resolve how a session should be launched.
    ///
    /// Without a command the configured shell is started directly; with one,
    /// the command is run through `/bin/sh -c` so pipelines and arguments
    /// behave as they would when typed.
    pub fn launch(&self, command: Option<&str>) -> LaunchSpec {
        let cwd = self.cwd();
        match command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(command) => LaunchSpec {
                program: FALLBACK_SHELL.to_string(),
                args: vec!["-c".to_string(), command.to_string()],
                title: derive_title(command, &cwd),
                shell: command.to_string(),
                env: self.env.clone(),
                cwd,
            },
            None => {
                let shell = self.shell().to_string();
                let args = if self.login_shell {
                    vec!["-l".to_string()]
                } else {
                    Vec::new()
                };
                LaunchSpec {
                    program: shell.clone(),
                    args,
                    title: derive_title(&shell, &cwd),
                    shell,
                    env: self.env.clone(),
                    cwd,
                }
            }
        }
    }
}

/// Everything needed to spawn one session's child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// What the session reports as its shell: the shell path, or the command
    /// it was asked to run.
    pub shell: String,
    pub title: String,
}

/// Title from the first word of a shell path or command, falling back to the
/// working directory's name.
fn derive_title(command: &str, cwd: &Path) -> String {
    command
        .split_whitespace()
        .next()
        .and_then(|first| Path::new(first).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .or_else(|| cwd.file_name().and_then(|name| name.to_str()))
        .map(str::to_string)
        .unwrap_or_else(|| "terminal".to_string())
}
