use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::config::{LaunchSpec, TerminalConfig};
use crate::session::Dimensions;

/// Poll interval while waiting for a signalled child to be reaped.
const REAP_POLL: Duration = Duration::from_millis(20);

/// Linux reports EIO on the controller side once no process holds the
/// follower side open.
const EIO: i32 = 5;

/// Errors from PTY operations.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
    #[error("PTY input is backed up; write timed out after {0:?}")]
    InputBlocked(Duration),
    #[error("PTY closed")]
    Closed,
    #[error("end of PTY output")]
    Eof,
}

/// What the reader thread hands to the output side.
#[derive(Debug)]
enum ReadEvent {
    Chunk(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

/// Owns a portable-pty child process and the controller side of its terminal.
///
/// Input goes through a bounded queue drained by a writer thread, so a child
/// that stops reading its terminal never stalls the caller for longer than
/// the configured write timeout. Output is read on a dedicated thread and
/// delivered through the [`PtyOutput`] returned by [`PtyHandle::spawn`].
pub struct PtyHandle {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    input: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    exit_code: Mutex<Option<u32>>,
    killed: AtomicBool,
    write_timeout: Duration,
}

/// Receiving end of a PTY's output, fed by its reader thread.
pub struct PtyOutput {
    rx: mpsc::Receiver<ReadEvent>,
}

impl PtyOutput {
    /// Wait for the next chunk of output.
    ///
    /// Returns [`PtyError::Eof`] once the child has exited and its terminal is
    /// closed.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>, PtyError> {
        match self.rx.recv().await {
            Some(ReadEvent::Chunk(data)) => Ok(data),
            Some(ReadEvent::Failed(err)) => Err(PtyError::Io(err)),
            Some(ReadEvent::Eof) | None => Err(PtyError::Eof),
        }
    }
}

#[cfg(test)]
impl PtyOutput {
    /// Output whose first read fails with `err`.
    pub(crate) fn failing(err: std::io::Error) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(ReadEvent::Failed(err));
        Self { rx }
    }
}

impl PtyHandle {
    /// Open a PTY of the given size and spawn the launch plan's program in it.
    ///
    /// `label` names the I/O threads (`pty-read-<label>`, `pty-write-<label>`).
    pub fn spawn(
        label: &str,
        launch: &LaunchSpec,
        size: Dimensions,
        config: &TerminalConfig,
    ) -> Result<(Self, PtyOutput), PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&launch.program);
        cmd.args(&launch.args);
        cmd.cwd(&launch.cwd);
        for (key, value) in &launch.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| {
                PtyError::SpawnFailed(format!("failed to spawn {}: {e}", launch.program))
            })?;
        // Only the child may hold the follower side, otherwise reads never
        // observe the end of output.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        let (out_tx, out_rx) = mpsc::channel(config.output_queue.max(1));
        let (in_tx, in_rx) = mpsc::channel(config.input_queue.max(1));

        let handle = Self {
            master: Mutex::new(Some(pair.master)),
            input: Mutex::new(Some(in_tx)),
            child: Mutex::new(child),
            exit_code: Mutex::new(None),
            killed: AtomicBool::new(false),
            write_timeout: config.write_timeout,
        };

        let read_buffer = config.read_buffer.max(1);
        if let Err(e) = thread::Builder::new()
            .name(format!("pty-read-{label}"))
            .spawn(move || read_loop(reader, out_tx, read_buffer))
        {
            let _ = handle.kill(Duration::ZERO);
            return Err(PtyError::SpawnFailed(format!("failed to start reader: {e}")));
        }

        if let Err(e) = thread::Builder::new()
            .name(format!("pty-write-{label}"))
            .spawn(move || write_loop(writer, in_rx))
        {
            let _ = handle.kill(Duration::ZERO);
            return Err(PtyError::SpawnFailed(format!("failed to start writer: {e}")));
        }

        Ok((handle, PtyOutput { rx: out_rx }))
    }

    /// Queue bytes for the child's terminal input, preserving order.
    ///
    /// Waits at most the configured write timeout for room in the queue.
    pub async fn write(&self, data: Vec<u8>) -> Result<(), PtyError> {
        if data.is_empty() {
            return Ok(());
        }
        let tx = self.input.lock().clone().ok_or(PtyError::Closed)?;
        match tx.send_timeout(data, self.write_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(PtyError::InputBlocked(self.write_timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(PtyError::Closed),
        }
    }

    /// Resize the PTY to new dimensions. The child receives SIGWINCH.
    pub fn resize(&self, size: Dimensions) -> Result<(), PtyError> {
        if size.cols == 0 || size.rows == 0 {
            return Err(PtyError::ResizeFailed(format!(
                "invalid size {}x{}",
                size.cols, size.rows
            )));
        }
        let master = self.master.lock();
        let master = master.as_ref().ok_or(PtyError::Closed)?;
        master
            .resize(pty_size(size))
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// Check if the child process is still alive.
    pub fn is_alive(&self) -> bool {
        self.try_wait().is_none()
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&self) -> Option<u32> {
        let mut exit_code = self.exit_code.lock();
        if exit_code.is_none() {
            if let Ok(Some(status)) = self.child.lock().try_wait() {
                *exit_code = Some(status.exit_code());
            }
        }
        *exit_code
    }

    /// Whether [`kill`](Self::kill) has been called on this handle.
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Terminate the child and release the terminal.
    ///
    /// The child is sent SIGHUP and, if it is still running shortly after,
    /// SIGKILL. This call then waits at most `grace` for the child to be
    /// reaped. Killing an already-dead handle is a no-op.
    pub fn kill(&self, grace: Duration) -> Result<(), PtyError> {
        if self.killed.swap(true, Ordering::AcqRel) && self.master.lock().is_none() {
            return Ok(());
        }
        // Closing the input queue stops the writer thread.
        self.input.lock().take();

        let result = if self.try_wait().is_some() {
            Ok(())
        } else {
            self.terminate(grace)
        };

        self.master.lock().take();
        result
    }

    fn terminate(&self, grace: Duration) -> Result<(), PtyError> {
        let pid = self.child.lock().process_id();
        if let Err(err) = self.child.lock().kill() {
            // The child may have exited between try_wait and the signal.
            if self.try_wait().is_none() {
                log::warn!("failed to signal pty child {pid:?}: {err}");
                return Err(PtyError::Io(err));
            }
        }

        let deadline = Instant::now() + grace;
        while self.try_wait().is_none() {
            if Instant::now() >= deadline {
                log::warn!("pty child {pid:?} not reaped within {grace:?}");
                break;
            }
            thread::sleep(REAP_POLL);
        }
        Ok(())
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if !self.was_killed() && self.is_alive() {
            let _ = self.child.lock().kill();
        }
    }
}

fn pty_size(size: Dimensions) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Blocking read loop run on the reader thread.
///
/// A full output queue blocks the loop, which leaves further output in the
/// kernel's PTY buffer and eventually pauses the child.
fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<ReadEvent>, buf_size: usize) {
    let mut buf = vec![0u8; buf_size];
    loop {
        let event = match reader.read(&mut buf) {
            Ok(0) => ReadEvent::Eof,
            Ok(n) => ReadEvent::Chunk(buf[..n].to_vec()),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) if err.raw_os_error() == Some(EIO) => ReadEvent::Eof,
            Err(err) => ReadEvent::Failed(err),
        };
        let last = !matches!(event, ReadEvent::Chunk(_));
        if tx.blocking_send(event).is_err() || last {
            return;
        }
    }
}

/// Blocking write loop run on the writer thread. Exits when the input queue
/// is closed or the terminal stops accepting writes.
fn write_loop(mut writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = rx.blocking_recv() {
        if let Err(err) = writer.write_all(&data).and_then(|()| writer.flush()) {
            log::warn!("PTY write failed: {err}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn sh_config() -> TerminalConfig {
        TerminalConfig {
            default_shell: Some("/bin/sh".to_string()),
            login_shell: false,
            working_dir: Some(std::env::temp_dir()),
            kill_grace: Duration::from_secs(2),
            ..TerminalConfig::default()
        }
    }

    fn spawn_sh(command: Option<&str>) -> (PtyHandle, PtyOutput) {
        let config = sh_config();
        let launch = config.launch(command);
        PtyHandle::spawn("test", &launch, Dimensions { cols: 80, rows: 24 }, &config)
            .expect("failed to spawn PTY")
    }

    /// Read until `needle` shows up or the output ends.
    async fn read_until(output: &mut PtyOutput, needle: &str) -> String {
        let mut collected = Vec::new();
        let _ = timeout(Duration::from_secs(5), async {
            while let Ok(chunk) = output.read_chunk().await {
                collected.extend_from_slice(&chunk);
                if String::from_utf8_lossy(&collected).contains(needle) {
                    break;
                }
            }
        })
        .await;
        String::from_utf8_lossy(&collected).into_owned()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spawn_pty() {
        let (handle, _output) = spawn_sh(None);
        assert!(handle.is_alive());
        assert!(!handle.was_killed());
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let config = sh_config();
        let mut launch = config.launch(None);
        launch.program = "/definitely/not/a/shell".to_string();
        let result = PtyHandle::spawn("missing", &launch, Dimensions { cols: 80, rows: 24 }, &config);
        assert!(matches!(result, Err(PtyError::SpawnFailed(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_read_echo() {
        let (handle, mut output) = spawn_sh(None);

        handle.write(b"echo CLAUDIO_TEST_OK\n".to_vec()).await.unwrap();

        let text = read_until(&mut output, "CLAUDIO_TEST_OK\r\n").await;
        assert!(
            text.contains("CLAUDIO_TEST_OK"),
            "Expected output to contain CLAUDIO_TEST_OK, got: {text}"
        );
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resize() {
        let (handle, mut output) = spawn_sh(None);
        handle.resize(Dimensions { cols: 120, rows: 40 }).unwrap();

        handle.write(b"stty size\n".to_vec()).await.unwrap();
        let text = read_until(&mut output, "40 120").await;
        assert!(text.contains("40 120"), "stty did not report 40x120: {text}");
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_resize_rejects_zero() {
        let (handle, _output) = spawn_sh(None);
        let result = handle.resize(Dimensions { cols: 0, rows: 24 });
        assert!(matches!(result, Err(PtyError::ResizeFailed(_))));
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_child_exit_reports_eof_and_code() {
        let (handle, mut output) = spawn_sh(Some("exit 7"));

        let end = timeout(Duration::from_secs(5), async {
            loop {
                match output.read_chunk().await {
                    Ok(_) => continue,
                    Err(err) => return err,
                }
            }
        })
        .await
        .expect("PTY output never ended");
        assert!(matches!(end, PtyError::Eof), "unexpected end: {end:?}");

        let deadline = Instant::now() + Duration::from_secs(3);
        while handle.try_wait().is_none() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(handle.try_wait(), Some(7));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_kill_is_bounded_and_idempotent() {
        // A child that ignores SIGHUP still has to go away.
        let (handle, _output) = spawn_sh(Some("trap '' HUP; sleep 30"));

        let started = Instant::now();
        handle.kill(Duration::from_secs(2)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_alive());
        assert!(handle.was_killed());

        // Second kill is a no-op.
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_after_kill_is_closed() {
        let (handle, _output) = spawn_sh(None);
        handle.kill(Duration::from_secs(2)).unwrap();

        let result = handle.write(b"echo nope\n".to_vec()).await;
        assert!(matches!(result, Err(PtyError::Closed)));
        let result = handle.resize(Dimensions { cols: 100, rows: 30 });
        assert!(matches!(result, Err(PtyError::Closed)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_to_stalled_child_times_out() {
        let config = TerminalConfig {
            input_queue: 1,
            write_timeout: Duration::from_millis(100),
            ..sh_config()
        };
        // `sleep` never reads its terminal, so input piles up.
        let launch = config.launch(Some("sleep 30"));
        let (handle, _output) =
            PtyHandle::spawn("stalled", &launch, Dimensions { cols: 80, rows: 24 }, &config)
                .expect("failed to spawn PTY");

        // Complete lines, so the line discipline fills up instead of
        // discarding an overlong partial line.
        let chunk = b"0123456789abcde\n".repeat(4096);
        let started = Instant::now();
        let mut blocked = None;
        for _ in 0..256 {
            match handle.write(chunk.clone()).await {
                Ok(()) => continue,
                Err(err) => {
                    blocked = Some(err);
                    break;
                }
            }
        }
        assert!(
            matches!(blocked, Some(PtyError::InputBlocked(t)) if t == Duration::from_millis(100)),
            "unexpected write result: {blocked:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        handle.kill(Duration::from_secs(2)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_write_is_noop() {
        let (handle, _output) = spawn_sh(None);
        handle.write(Vec::new()).await.unwrap();
        handle.kill(Duration::from_secs(2)).unwrap();
    }
}
