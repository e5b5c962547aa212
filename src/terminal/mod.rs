//! Interactive command execution
//!
//! Commands run under `sh -c` attached to a pseudo-terminal so that
//! interactive programs (prompts, `read`, pagers) behave as they would in a
//! real shell, while their output is echoed live and captured for the model.

pub mod cancel_reader;
pub mod raw_mode;
pub mod session;

pub use session::TerminalSession;

use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default time to keep draining pty output after the child exited
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the session machinery. A command exiting non-zero is not one of them.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to save or restore terminal mode: {0}")]
    TerminalMode(#[source] std::io::Error),

    #[error("failed to allocate pseudo-terminal: {0}")]
    Allocate(#[source] BoxError),

    #[error("failed to resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to set up input forwarding: {0}")]
    InputPump(#[source] std::io::Error),

    #[error("failed waiting for command to exit: {0}")]
    Wait(#[source] std::io::Error),
}

/// Outcome of running one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The command that was executed
    pub command: String,
    /// Captured terminal output (stdout and stderr merged by the pty).
    ///
    /// `\r\n` is folded back to `\n` and the bytes are decoded lossily:
    /// UTF-8 output is kept exactly, invalid sequences become U+FFFD.
    pub stdout: String,
    /// Separately captured error output; empty for pty sessions
    pub stderr: String,
    /// Exit status of the shell
    pub exit_code: i32,
    /// Execution duration
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Tool-result text fed back to the model, each stream cut to `max_bytes`.
    pub fn summary(&self, max_bytes: usize) -> String {
        let verdict = if self.success() { "succeeded" } else { "failed" };
        format!(
            "Command {} with exit status {}.\nstdout:\n{}\nstderr:\n{}",
            verdict,
            self.exit_code,
            crate::truncate_safe(&self.stdout, max_bytes),
            crate::truncate_safe(&self.stderr, max_bytes),
        )
    }
}

/// Terminal session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// POSIX shell used as `<shell> -c <command>`
    pub shell: String,
    /// Working directory (current directory when unset)
    pub working_dir: Option<PathBuf>,
    /// Echo pty output to the caller's stdout while capturing
    pub echo_output: bool,
    /// Forward the caller's stdin into the pty (and use raw mode when it is a tty)
    pub forward_input: bool,
    /// Descriptor forwarded as the child's input; borrowed, never closed
    pub input_fd: RawFd,
    /// How long to keep draining output after the child exited
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: None,
            echo_output: true,
            forward_input: true,
            input_fd: libc::STDIN_FILENO,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            drain_timeout: config.drain_timeout(),
            ..Self::default()
        }
    }
}

/// Executes approved commands on behalf of the conversation loop
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<ExecutionResult, SessionError>;
}

/// Runs each command in a fresh [`TerminalSession`]
#[derive(Debug, Clone, Default)]
pub struct PtyRunner {
    config: SessionConfig,
}

impl PtyRunner {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl CommandRunner for PtyRunner {
    async fn run(&self, command: &str) -> Result<ExecutionResult, SessionError> {
        crate::ui::info(format!("Running command: {}", command));
        TerminalSession::new(self.config.clone()).execute(command).await
    }
}
