//! Completion backend client (OpenAI-compatible chat completions)

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::types::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const HELICONE_BASE_URL: &str = "https://oai.helicone.ai/v1";

/// Failures talking to the completion backend. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach completion backend: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed completion response: {0}")]
    Envelope(String),
}

// ============ Wire types ============

/// One conversation turn as sent to and received from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    /// Text content. Serialized as `null` on assistant tool-call turns.
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool definition for OpenAI-compatible function calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition for tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool call from the backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: FunctionCall,
}

/// Function call details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Arguments can arrive as either a JSON string or a raw JSON object
    /// depending on the backend. Normalized to a string.
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

/// Deserialize arguments that may be a JSON string or a JSON object.
fn deserialize_arguments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// Deserialize content given as a string, an array of content parts, or null.
fn deserialize_content<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(parts)) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.concat())
            }
        }
        Some(other) => Some(other.to_string()),
    })
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn carrying exactly one tool invocation
    pub fn assistant_with_tool_call(call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![call]),
            tool_call_id: None,
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Text content, if any is present and not blank
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [ToolDefinition],
    tool_choice: &'a Value,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

/// Extract the first choice's message from a response body
pub fn parse_response(body: &str) -> Result<ChatMessage, TransportError> {
    let response: ChatResponse = serde_json::from_str(body.trim())
        .map_err(|e| TransportError::Envelope(format!("invalid JSON: {}", e)))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Envelope("response has no choices".to_string()))?;
    choice
        .message
        .ok_or_else(|| TransportError::Envelope("first choice has no message".to_string()))
}

// ============ Client ============

/// Narrow request/response contract the conversation loop depends on
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tool_choice: &Value,
    ) -> Result<ChatMessage, TransportError>;
}

/// Configuration for the backend endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Extra headers to include in requests
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
        }
    }

    /// Route through the Helicone proxy, tagging requests with `session_id`.
    ///
    /// A custom `base_url` is kept; only the default OpenAI host is swapped
    /// for the proxy host.
    pub fn with_helicone(mut self, helicone_key: &str, session_id: Uuid) -> Self {
        if self.base_url == DEFAULT_BASE_URL {
            self.base_url = HELICONE_BASE_URL.to_string();
        }
        self.extra_headers
            .push(("Helicone-Auth".to_string(), format!("Bearer {}", helicone_key)));
        self.extra_headers
            .push(("Helicone-Session-Id".to_string(), session_id.to_string()));
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key()
            .context("AI_KEY not set in config or environment")?;
        let provider = Self::openai(api_key, config.base_url.trim_end_matches('/'));
        Ok(match config.helicone_key() {
            Some(key) => provider.with_helicone(key, Uuid::new_v4()),
            None => provider,
        })
    }
}

/// Chat-completions client for OpenAI-compatible backends
#[derive(Clone)]
pub struct OpenAiClient {
    client: Arc<Client>,
    provider: ProviderConfig,
    model: String,
}

impl OpenAiClient {
    pub fn new(provider: ProviderConfig, model: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client: Arc::new(client),
            provider,
            model: model.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(ProviderConfig::from_config(config)?, &config.model, config.timeout())
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tool_choice: &Value,
    ) -> Result<ChatMessage, TransportError> {
        let content_bytes: usize = messages
            .iter()
            .filter_map(|m| m.content.as_ref())
            .map(|c| c.len())
            .sum();
        tracing::debug!(
            "LLM request: {} messages ({} content bytes), {} tools, model {}",
            messages.len(),
            content_bytes,
            tools.len(),
            self.model
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice,
            temperature: 0.0,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(pretty) = serde_json::to_string_pretty(&request) {
                tracing::debug!("Payload:\n{}", pretty);
            }
        }

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder.json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body });
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let pretty = serde_json::from_str::<Value>(&body)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| body.clone());
            tracing::debug!("Response:\n{}", pretty);
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_creation() {
        let user_msg = ChatMessage::user("Hello");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content.as_deref(), Some("Hello"));

        let sys_msg = ChatMessage::system("You are helpful");
        assert_eq!(sys_msg.role, Role::System);
        assert!(sys_msg.tool_calls.is_none());
    }

    #[test]
    fn test_function_call_arguments_string() {
        let json = r#"{"name":"run_shell_command","arguments":"{\"command\":\"ls\",\"stop\":true}"}"#;
        let fc: FunctionCall = serde_json::from_str(json).unwrap();
        assert_eq!(fc.name, "run_shell_command");
        assert_eq!(fc.arguments, r#"{"command":"ls","stop":true}"#);
    }

    #[test]
    fn test_function_call_arguments_object() {
        let json = r#"{"name":"run_shell_command","arguments":{"command":"ls","stop":false}}"#;
        let fc: FunctionCall = serde_json::from_str(json).unwrap();
        let parsed: Value = serde_json::from_str(&fc.arguments).unwrap();
        assert_eq!(parsed["command"], "ls");
        assert_eq!(parsed["stop"], false);
    }

    #[test]
    fn test_function_call_arguments_null() {
        let json = r#"{"name":"run_shell_command","arguments":null}"#;
        let fc: FunctionCall = serde_json::from_str(json).unwrap();
        assert_eq!(fc.arguments, "");
    }

    #[test]
    fn test_content_as_string_parts_and_null() {
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant","content":"Hello world"}"#).unwrap();
        assert_eq!(msg.text_content(), Some("Hello world"));

        let msg: ChatMessage = serde_json::from_str(
            r#"{"role":"assistant","content":[{"type":"text","text":"Hello "},{"type":"text","text":"world"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.content.as_deref(), Some("Hello world"));

        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
        assert_eq!(msg.content, None);

        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant","content":"   "}"#).unwrap();
        assert_eq!(msg.text_content(), None);
    }

    #[test]
    fn test_tool_call_turns_serialize_in_openai_shape() {
        let call = ToolCall {
            id: "call_1".to_string(),
            r#type: "function".to_string(),
            function: FunctionCall {
                name: "run_shell_command".to_string(),
                arguments: r#"{"command":"ls","stop":false}"#.to_string(),
            },
        };
        let assistant = serde_json::to_value(ChatMessage::assistant_with_tool_call(call)).unwrap();
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["content"], Value::Null);
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert!(assistant.get("tool_call_id").is_none());

        let tool = serde_json::to_value(ChatMessage::tool_result("call_1", "done")).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
        assert_eq!(tool["content"], "done");
        assert!(tool.get("tool_calls").is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = [ChatMessage::user("list files")];
        let tool_choice = json!({"type": "function", "function": {"name": "run_shell_command"}});
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &messages,
            tools: &[],
            tool_choice: &tool_choice,
            temperature: 0.0,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["tool_choice"]["function"]["name"], "run_shell_command");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_parse_response_envelope_errors() {
        let ok = parse_response(r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#).unwrap();
        assert_eq!(ok.content.as_deref(), Some("hi"));

        assert!(matches!(
            parse_response(r#"{"choices":[]}"#),
            Err(TransportError::Envelope(msg)) if msg.contains("no choices")
        ));
        assert!(matches!(
            parse_response(r#"{"choices":[{"finish_reason":"stop"}]}"#),
            Err(TransportError::Envelope(msg)) if msg.contains("no message")
        ));
        assert!(matches!(parse_response("<html>"), Err(TransportError::Envelope(_))));
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = Config::default();
        assert!(ProviderConfig::from_config(&config).is_err());

        config.ai_key = Some("sk-test".to_string());
        let provider = ProviderConfig::from_config(&config).unwrap();
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert!(provider.extra_headers.is_empty());

        config.helicone_key = Some("hk".to_string());
        let provider = ProviderConfig::from_config(&config).unwrap();
        assert_eq!(provider.base_url, HELICONE_BASE_URL);
        assert_eq!(provider.extra_headers[0], ("Helicone-Auth".to_string(), "Bearer hk".to_string()));
        assert_eq!(provider.extra_headers[1].0, "Helicone-Session-Id");
        assert!(Uuid::parse_str(&provider.extra_headers[1].1).is_ok());
    }

    #[test]
    fn test_helicone_keeps_custom_base_url() {
        let provider = ProviderConfig::openai("k", "http://localhost:9000/v1").with_helicone("hk", Uuid::new_v4());
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
        assert_eq!(provider.extra_headers.len(), 2);
    }
}
