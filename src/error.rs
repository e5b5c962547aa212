//! Fatal error taxonomy for a run
//!
//! Everything in here ends the process with [`EXIT_FAILURE`]. A command that
//! exits non-zero is not an error: it is reported through
//! [`crate::agent::tool_loop::Outcome`].

use crate::agent::llm::TransportError;
use crate::agent::protocol::ProtocolViolation;
use crate::terminal::SessionError;
use thiserror::Error;

/// Process exit status for configuration, protocol, transport and session errors
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Missing API key, empty prompt, unreadable config file, bad `--config` value
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The backend kept issuing non-terminal commands past the configured bound
    #[error("no final command after {0} round trips")]
    RoundLimit(usize),
}

impl AgentError {
    pub fn config(message: impl Into<String>) -> Self {
        AgentError::Config(message.into())
    }

    /// Exit status the process should terminate with
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}
