//! The conversation loop
//!
//! Drives round trips with the completion backend until one of:
//! - the backend answers in plain text (printed, exit 0);
//! - the operator declines a command (exit 0);
//! - a final (`stop=true`) command runs (exit 0, or the command's status);
//! - a fatal error occurs (exit 1).
//!
//! Non-final commands are executed and their result fed back as a tool
//! message before the next round trip.

use super::conversation::ConversationState;
use super::llm::{CompletionClient, ToolDefinition};
use super::prompts;
use super::protocol::{self, BackendReply, ToolCallRequest};
use crate::config::Config;
use crate::error::AgentError;
use crate::security::ConfirmationGate;
use crate::terminal::{CommandRunner, ExecutionResult};
use crate::ui;
use serde_json::Value;

/// How a run ended without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The backend answered in text instead of a command
    PlainReply(String),
    /// The final command exited 0
    Succeeded,
    /// The final command exited non-zero
    CommandFailed { exit_code: i32 },
    /// The operator declined a command
    Declined,
}

impl Outcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::CommandFailed { exit_code } => *exit_code,
            Outcome::PlainReply(_) | Outcome::Succeeded | Outcome::Declined => 0,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::PlainReply(_) => write!(f, "plain reply"),
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::CommandFailed { exit_code } => write!(f, "command failed with status {}", exit_code),
            Outcome::Declined => write!(f, "declined"),
        }
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingReply,
    ConfirmPending,
    Executing,
    Continue,
    TerminalSuccess,
    TerminalFailure,
    PlainReply,
    Declined,
    ProtocolError,
}

/// Configuration for the conversation loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub system_prompt: String,
    /// Maximum backend round trips (0 = unbounded)
    pub max_rounds: usize,
    /// Bytes of each output stream fed back per tool result
    pub max_output_bytes: usize,
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: prompts::system_prompt(std::env::consts::OS),
            max_rounds: config.max_rounds,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Runs one natural-language request to completion
pub struct ConversationLoop<C, R> {
    client: C,
    runner: R,
    /// `None` in unsafe mode: commands run without asking
    gate: Option<Box<dyn ConfirmationGate>>,
    config: LoopConfig,
    tools: Vec<ToolDefinition>,
    tool_choice: Value,
    state: LoopState,
}

impl<C: CompletionClient, R: CommandRunner> ConversationLoop<C, R> {
    pub fn new(client: C, runner: R, gate: Option<Box<dyn ConfirmationGate>>, config: LoopConfig) -> Self {
        Self {
            client,
            runner,
            gate,
            config,
            tools: vec![protocol::shell_tool()],
            tool_choice: protocol::forced_tool_choice(),
            state: LoopState::AwaitingReply,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drive the conversation for `prompt` until a terminal outcome or a fatal error
    pub async fn run(&mut self, prompt: &str) -> Result<Outcome, AgentError> {
        let mut conversation = ConversationState::seed(self.config.system_prompt.clone(), prompt);

        loop {
            if let Some(outcome) = conversation.outcome() {
                return Ok(outcome.clone());
            }
            if self.config.max_rounds > 0 && conversation.rounds() >= self.config.max_rounds {
                tracing::warn!(rounds = conversation.rounds(), "round limit reached");
                return Err(AgentError::RoundLimit(conversation.rounds()));
            }

            self.transition(LoopState::AwaitingReply);
            let reply = self
                .client
                .complete(conversation.messages(), &self.tools, &self.tool_choice)
                .await?;
            conversation.complete_round();

            let request = match protocol::decode(&reply) {
                Ok(BackendReply::ToolCall(request)) => request,
                Ok(BackendReply::PlainText(text)) => {
                    self.transition(LoopState::PlainReply);
                    ui::plain(&text);
                    conversation.finish(Outcome::PlainReply(text));
                    continue;
                }
                Err(violation) => {
                    self.transition(LoopState::ProtocolError);
                    return Err(violation.into());
                }
            };
            tracing::info!(
                round = conversation.rounds(),
                command = %request.command,
                stop = request.stop,
                "Backend proposed command"
            );

            self.transition(LoopState::ConfirmPending);
            conversation.set_pending(request.clone());
            if !self.confirm(&request.command) {
                self.transition(LoopState::Declined);
                ui::warn("Command aborted.");
                conversation.finish(Outcome::Declined);
                continue;
            }
            conversation.take_pending();

            self.transition(LoopState::Executing);
            let result = self.runner.run(&request.command).await?;

            if request.stop {
                let outcome = self.finish_final(&result);
                conversation.finish(outcome);
                continue;
            }

            self.record_intermediate(&mut conversation, &request, &result);
            self.transition(LoopState::Continue);
        }
    }

    fn confirm(&mut self, command: &str) -> bool {
        let Some(gate) = self.gate.as_mut() else {
            return true;
        };
        match gate.confirm(command) {
            Ok(approved) => approved,
            Err(err) => {
                tracing::warn!(error = %err, "confirmation unreadable, treating as declined");
                ui::warn(&err);
                false
            }
        }
    }

    fn finish_final(&mut self, result: &ExecutionResult) -> Outcome {
        if result.success() {
            self.transition(LoopState::TerminalSuccess);
            ui::success("Command executed.");
            Outcome::Succeeded
        } else {
            self.transition(LoopState::TerminalFailure);
            ui::error(format!("Command failed with exit status {}", result.exit_code));
            Outcome::CommandFailed {
                exit_code: result.exit_code,
            }
        }
    }

    fn record_intermediate(
        &self,
        conversation: &mut ConversationState,
        request: &ToolCallRequest,
        result: &ExecutionResult,
    ) {
        if !result.success() {
            ui::warn(format!("Command exited with status {}", result.exit_code));
        }
        conversation.record_step(request, result.summary(self.config.max_output_bytes));
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "loop state");
        self.state = next;
    }
}
