//! One command, one pseudo-terminal
//!
//! Lifecycle of [`TerminalSession::execute`]:
//! 1. save the caller's terminal mode and go raw (only when the input
//!    descriptor is a tty and input forwarding is on);
//! 2. open a pty sized like the caller's terminal and spawn `sh -c <cmd>`;
//! 3. pump pty output to stdout and the capture buffer, and input to the pty;
//! 4. wait for the child, drain the output pump, cancel the input pump;
//! 5. close the pty and restore the terminal mode.

use super::cancel_reader::{cancel_reader, CancelReader, ReadEvent};
use super::raw_mode::{self, RawModeGuard};
use super::{ExecutionResult, SessionConfig, SessionError};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const PUMP_BUFFER_SIZE: usize = 8192;
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

type CaptureBuffer = Arc<Mutex<Vec<u8>>>;

/// A single command execution attached to a pseudo-terminal
pub struct TerminalSession {
    config: SessionConfig,
}

impl TerminalSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run `command` under `sh -c` and wait for it.
    ///
    /// A non-zero exit is a normal [`ExecutionResult`]. Errors are reserved for
    /// failures of the session machinery itself.
    pub async fn execute(self, command: &str) -> Result<ExecutionResult, SessionError> {
        let start = Instant::now();
        let input_fd = self.config.input_fd;

        let mode_guard = if self.config.forward_input && raw_mode::is_terminal(input_fd) {
            Some(RawModeGuard::enter(input_fd)?)
        } else {
            None
        };

        let run = self.run_child(command).await;

        // Child exited and pumps are torn down by now.
        let restored = match mode_guard {
            Some(guard) => guard.restore(),
            None => Ok(()),
        };

        let (captured, exit_code) = match (run, restored) {
            (Ok(run), Ok(())) => run,
            (Err(err), Ok(())) => return Err(err),
            (Ok(_), Err(restore_err)) => return Err(restore_err),
            (Err(err), Err(restore_err)) => {
                tracing::error!(error = %err, "session failed before terminal restore failure");
                return Err(restore_err);
            }
        };

        let stdout = normalize_newlines(&captured);
        let duration = start.elapsed();
        tracing::info!(
            command = %command,
            exit_code,
            captured_bytes = captured.len(),
            duration_ms = %duration.as_millis(),
            "Command finished"
        );

        Ok(ExecutionResult {
            command: command.to_string(),
            stdout,
            // The pty merges stderr into the same stream.
            stderr: String::new(),
            exit_code,
            duration_ms: duration.as_millis() as u64,
        })
    }

    async fn run_child(&self, command: &str) -> Result<(Vec<u8>, i32), SessionError> {
        let working_dir = match &self.config.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(SessionError::WorkingDir)?,
        };
        // The pty layer would silently fall back to $HOME.
        if !working_dir.is_dir() {
            return Err(SessionError::WorkingDir(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", working_dir.display()),
            )));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(window_size())
            .map_err(|e| SessionError::Allocate(e.into()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::Allocate(e.into()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::Allocate(e.into()))?;

        let input = if self.config.forward_input {
            Some(cancel_reader(self.config.input_fd).map_err(SessionError::InputPump)?)
        } else {
            None
        };

        let mut builder = CommandBuilder::new(&self.config.shell);
        builder.arg("-c");
        builder.arg(command);
        builder.cwd(working_dir);

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| SessionError::Spawn {
                command: command.to_string(),
                source: e.into(),
            })?;
        // Only the child may hold the slave side, or the output pump never sees EOF.
        drop(pair.slave);
        tracing::debug!(command = %command, pid = ?child.process_id(), "child spawned on pty");

        let captured: CaptureBuffer = Arc::new(Mutex::new(Vec::new()));
        let output_pump = tokio::task::spawn_blocking({
            let captured = Arc::clone(&captured);
            let echo = self.config.echo_output;
            move || pump_output(reader, &captured, echo)
        });

        // The writer stays alive until teardown: dropping it early sends EOF to the child.
        let (input_pump, cancel, parked_writer) = match input {
            Some((stdin_reader, cancel)) => (
                Some(tokio::task::spawn_blocking(move || pump_input(stdin_reader, writer))),
                Some(cancel),
                None,
            ),
            None => (None, None, Some(writer)),
        };

        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| SessionError::Wait(io::Error::other(e)))
            .and_then(|waited| waited.map_err(SessionError::Wait));

        // Whatever the wait produced, the input pump must not outlive the child.
        if let Some(cancel) = &cancel {
            cancel.cancel();
        }

        match tokio::time::timeout(self.config.drain_timeout, output_pump).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "output pump panicked"),
            Err(_) => tracing::warn!(
                timeout = ?self.config.drain_timeout,
                "pty output still open after child exit, keeping what was captured"
            ),
        }

        let writer = match input_pump {
            Some(task) => task.await.ok(),
            None => parked_writer,
        };
        drop(cancel);
        drop(writer);
        drop(pair.master);

        let status = status?;
        let exit_code = status.exit_code() as i32;
        let bytes = std::mem::take(&mut *captured.lock().unwrap_or_else(|p| p.into_inner()));
        Ok((bytes, exit_code))
    }
}

/// Copy pty output to stdout (optionally) and the capture buffer until end-of-stream.
fn pump_output(mut reader: Box<dyn Read + Send>, captured: &CaptureBuffer, echo: bool) {
    let mut buf = [0u8; PUMP_BUFFER_SIZE];
    let mut stdout = io::stdout();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if echo {
                    let _ = stdout.write_all(&buf[..n]);
                    let _ = stdout.flush();
                }
                captured
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .extend_from_slice(&buf[..n]);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports a closed slave side as EIO rather than EOF.
            Err(ref e) if e.raw_os_error() == Some(libc::EIO) => break,
            Err(e) => {
                tracing::warn!(error = %e, "pty read failed");
                break;
            }
        }
    }
    tracing::debug!("output pump finished");
}

/// Copy stdin into the pty until cancelled; hands the writer back for teardown.
fn pump_input(mut stdin: CancelReader, mut writer: Box<dyn Write + Send>) -> Box<dyn Write + Send> {
    let mut buf = [0u8; 1024];
    loop {
        match stdin.read(&mut buf) {
            Ok(ReadEvent::Data(n)) => {
                if writer.write_all(&buf[..n]).and_then(|_| writer.flush()).is_err() {
                    break;
                }
            }
            Ok(ReadEvent::Eof) | Ok(ReadEvent::Cancelled) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    tracing::debug!("input pump finished");
    writer
}

fn window_size() -> PtySize {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    let (rows, cols) = if result == 0 && ws.ws_row > 0 && ws.ws_col > 0 {
        (ws.ws_row, ws.ws_col)
    } else {
        (DEFAULT_ROWS, DEFAULT_COLS)
    };
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Undo the pty's output newline translation (ONLCR) for the captured text.
/// Bytes that are not UTF-8 are replaced with U+FFFD.
fn normalize_newlines(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}
