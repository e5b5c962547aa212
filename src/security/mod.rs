//! Security module
//!
//! The only safeguard around executed commands is a human confirmation gate.

pub mod approval;

pub use approval::{is_affirmative, ConfirmationError, ConfirmationGate, PromptGate, StdioGate};
