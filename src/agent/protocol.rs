//! The single-tool calling protocol
//!
//! Every request offers exactly one function, `run_shell_command`, and forces
//! the backend to call it. Replies are decoded once into a [`BackendReply`].

use super::llm::{ChatMessage, FunctionCall, FunctionDefinition, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const SHELL_TOOL_NAME: &str = "run_shell_command";

/// A backend reply that cannot be acted on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("backend reply carried neither text nor a tool call")]
    NoToolCall,

    #[error("backend called unknown function `{0}`")]
    UnknownFunction(String),

    #[error("malformed tool arguments: {0}")]
    MalformedArguments(String),

    #[error("tool call carried an empty command")]
    EmptyCommand,
}

/// Decoded `run_shell_command` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Opaque identifier echoed back in the tool-result message
    pub id: String,
    /// Command line for `sh -c`; never empty
    pub command: String,
    /// True when this is the final command
    pub stop: bool,
}

/// What the backend asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    PlainText(String),
    ToolCall(ToolCallRequest),
}

#[derive(Debug, Serialize, Deserialize)]
struct ShellArguments {
    command: String,
    stop: bool,
}

/// Schema for the one invocable operation
pub fn shell_tool() -> ToolDefinition {
    ToolDefinition {
        r#type: "function".to_string(),
        function: FunctionDefinition {
            name: SHELL_TOOL_NAME.to_string(),
            description: "Execute a shell command.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to execute"
                    },
                    "stop": {
                        "type": "boolean",
                        "description": "true if final command"
                    }
                },
                "required": ["command", "stop"]
            }),
        },
    }
}

/// `tool_choice` value forcing [`SHELL_TOOL_NAME`]
pub fn forced_tool_choice() -> Value {
    json!({
        "type": "function",
        "function": { "name": SHELL_TOOL_NAME }
    })
}

/// Decode a backend reply. A tool call takes precedence over accompanying text.
pub fn decode(message: &ChatMessage) -> Result<BackendReply, ProtocolViolation> {
    let calls = message.tool_calls.as_deref().unwrap_or_default();
    match calls {
        [] => match message.text_content() {
            Some(text) => Ok(BackendReply::PlainText(text.to_string())),
            None => Err(ProtocolViolation::NoToolCall),
        },
        [first, surplus @ ..] => {
            if !surplus.is_empty() {
                tracing::warn!(
                    honored = %first.id,
                    ignored = surplus.len(),
                    "backend returned several tool calls, only the first is used"
                );
            }
            decode_call(first).map(BackendReply::ToolCall)
        }
    }
}

/// Validate one tool call and extract its arguments
pub fn decode_call(call: &ToolCall) -> Result<ToolCallRequest, ProtocolViolation> {
    if call.function.name != SHELL_TOOL_NAME {
        return Err(ProtocolViolation::UnknownFunction(call.function.name.clone()));
    }
    let args: ShellArguments = serde_json::from_str(&call.function.arguments)
        .map_err(|e| ProtocolViolation::MalformedArguments(e.to_string()))?;
    if args.command.trim().is_empty() {
        return Err(ProtocolViolation::EmptyCommand);
    }
    Ok(ToolCallRequest {
        id: call.id.clone(),
        command: args.command,
        stop: args.stop,
    })
}

/// Wire form of a request, as appended to the history
pub fn encode(request: &ToolCallRequest) -> ToolCall {
    let arguments = json!({ "command": request.command, "stop": request.stop });
    ToolCall {
        id: request.id.clone(),
        r#type: "function".to_string(),
        function: FunctionCall {
            name: SHELL_TOOL_NAME.to_string(),
            arguments: arguments.to_string(),
        },
    }
}
