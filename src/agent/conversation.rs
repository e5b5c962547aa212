//! Conversation state for one run
//!
//! History is append-only: messages are never edited, removed or reordered.

use super::llm::ChatMessage;
use super::protocol::{self, ToolCallRequest};
use super::tool_loop::Outcome;

/// Ordered history plus loop-control fields
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    /// Command awaiting the operator's decision
    pending: Option<ToolCallRequest>,
    outcome: Option<Outcome>,
    /// Completed backend round trips
    rounds: usize,
}

impl ConversationState {
    /// Start a conversation with the system instruction and the user's request
    pub fn seed(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(prompt)],
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Count a completed round trip
    pub fn complete_round(&mut self) {
        self.rounds += 1;
    }

    pub fn set_pending(&mut self, request: ToolCallRequest) {
        self.pending = Some(request);
    }

    pub fn take_pending(&mut self) -> Option<ToolCallRequest> {
        self.pending.take()
    }

    /// Append the assistant turn carrying `request` and the tool result answering it
    pub fn record_step(&mut self, request: &ToolCallRequest, result_summary: impl Into<String>) {
        self.messages
            .push(ChatMessage::assistant_with_tool_call(protocol::encode(request)));
        self.messages
            .push(ChatMessage::tool_result(request.id.clone(), result_summary));
    }

    pub fn finish(&mut self, outcome: Outcome) {
        self.pending = None;
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn request(id: &str, command: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            command: command.to_string(),
            stop: false,
        }
    }

    #[test]
    fn test_seed() {
        let state = ConversationState::seed("be terse", "list files");
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(state.messages()[1].content.as_deref(), Some("list files"));
        assert_eq!(state.rounds(), 0);
        assert!(state.outcome().is_none());
    }

    #[test]
    fn test_record_step_appends_call_then_result() {
        let mut state = ConversationState::seed("sys", "user");
        state.record_step(&request("call_a", "ls"), "Command succeeded");
        state.record_step(&request("call_b", "pwd"), "Command failed");

        let messages = state.messages();
        assert_eq!(messages.len(), 6);

        let assistant = &messages[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.as_ref().map(Vec::len), Some(1));
        assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].id, "call_a");

        let tool = &messages[3];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(tool.content.as_deref(), Some("Command succeeded"));

        assert_eq!(messages[5].tool_call_id.as_deref(), Some("call_b"));
    }

    #[test]
    fn test_pending_and_finish() {
        let mut state = ConversationState::seed("sys", "user");
        state.set_pending(request("call_a", "ls"));
        assert_eq!(state.take_pending().map(|r| r.command), Some("ls".to_string()));
        assert!(state.take_pending().is_none());

        state.set_pending(request("call_b", "rm -rf build"));
        state.finish(Outcome::Declined);
        assert!(state.take_pending().is_none());
        assert_eq!(state.outcome(), Some(&Outcome::Declined));
    }
}
