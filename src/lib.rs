//! aish - natural-language shell assistant
//!
//! Turns a request like "find files larger than 100MB" into shell commands
//! proposed by a chat-completions backend, asks before running each one, runs
//! it in a pseudo-terminal and feeds the result back until the backend marks
//! a command as final.
//!
//! # Example
//!
//! ```ignore
//! use aish::agent::{ConversationLoop, LoopConfig, OpenAiClient};
//! use aish::config::Config;
//! use aish::security::StdioGate;
//! use aish::terminal::{PtyRunner, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?.with_env_overrides(|k| std::env::var(k).ok());
//!     let client = OpenAiClient::from_config(&config)?;
//!     let runner = PtyRunner::new(SessionConfig::from_config(&config));
//!     let mut agent = ConversationLoop::new(client, runner, Some(Box::new(StdioGate::default())), LoopConfig::from_config(&config));
//!     let outcome = agent.run("show disk usage of my home directory").await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod ui;
pub mod terminal;
pub mod security;
pub mod agent;
pub mod cli;

pub use agent::{ConversationLoop, Outcome};
pub use config::Config;
pub use error::AgentError;

/// Cut `s` to at most `max_bytes` on a char boundary, noting the original size.
pub fn truncate_safe(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated, total: {} bytes]", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_short_input_unchanged() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("", 0), "");
    }

    #[test]
    fn test_truncate_safe_respects_char_boundaries() {
        let s = "héllo wörld";
        let cut = truncate_safe(s, 2);
        assert!(cut.starts_with('h'));
        assert!(!cut.starts_with("hé"));
        assert!(cut.ends_with(&format!("[truncated, total: {} bytes]", s.len())));
    }
}
