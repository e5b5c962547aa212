//! Agent module - conversation with the completion backend
//!
//! - [`llm`]: wire types and the HTTP client
//! - [`protocol`]: the `run_shell_command` schema and reply decoding
//! - [`conversation`]: append-only history for one run
//! - [`tool_loop`]: the round-trip state machine

pub mod conversation;
pub mod llm;
pub mod prompts;
pub mod protocol;
pub mod tool_loop;

pub use conversation::ConversationState;
pub use llm::{ChatMessage, CompletionClient, OpenAiClient, TransportError};
pub use protocol::{BackendReply, ProtocolViolation, ToolCallRequest};
pub use tool_loop::{ConversationLoop, LoopConfig, LoopState, Outcome};
