//! CLI interface for aish

use crate::agent::{ConversationLoop, LoopConfig, OpenAiClient};
use crate::config::{self, Config};
use crate::error::AgentError;
use crate::security::{ConfirmationGate, StdioGate};
use crate::terminal::{PtyRunner, SessionConfig};
use crate::ui;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aish")]
#[command(about = "Turn a plain-language request into shell commands, confirmed and run in a terminal", long_about = None)]
#[command(version)]
pub struct Cli {
    /// What you want done, in plain language
    #[arg(value_name = "PROMPT", trailing_var_arg = true, allow_hyphen_values = true)]
    pub prompt: Vec<String>,

    /// Run commands without asking for confirmation
    #[arg(short = 'u', long = "unsafe")]
    pub unsafe_mode: bool,

    /// Verbose logging, including request and response payloads
    #[arg(long)]
    pub debug: bool,

    /// Set a config value and exit (repeatable): --config ai_key=XXX
    #[arg(long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,

    /// Model to use for this run
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum backend round trips for this run (0 = unbounded)
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<usize>,
}

/// Initialize logging to stderr (WARN by default, `--debug` raises this crate to DEBUG)
pub fn init_logging(debug: bool) {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if debug {
        if let Ok(directive) = format!("{}=debug", env!("CARGO_CRATE_NAME")).parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the CLI and return the process exit status
pub async fn run(cli: Cli) -> i32 {
    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "run failed");
            ui::error(&err);
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> Result<i32, AgentError> {
    let file_config = Config::load().map_err(config_error)?;

    if !cli.config.is_empty() {
        // Only file values are persisted, never environment overrides.
        let updated = apply_assignments(file_config, &cli.config).map_err(config_error)?;
        let path = updated.save().map_err(config_error)?;
        ui::success(format!("Config saved to {}", path.display()));
        return Ok(0);
    }

    let mut config = file_config.with_env_overrides(|name| std::env::var(name).ok());
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(max_rounds) = cli.max_rounds {
        config.max_rounds = max_rounds;
    }

    if config.api_key().is_none() {
        return Err(AgentError::config("AI_KEY not set in config or environment"));
    }
    let prompt = join_prompt(&cli.prompt)?;

    let client = OpenAiClient::from_config(&config).map_err(config_error)?;
    let runner = PtyRunner::new(SessionConfig::from_config(&config));
    let gate: Option<Box<dyn ConfirmationGate>> = if cli.unsafe_mode {
        tracing::info!("unsafe mode, confirmation disabled");
        None
    } else {
        Some(Box::new(StdioGate::default()))
    };

    let mut agent = ConversationLoop::new(client, runner, gate, LoopConfig::from_config(&config));
    let outcome = agent.run(&prompt).await?;
    tracing::info!(outcome = %outcome, "run finished");
    Ok(outcome.exit_code())
}

/// Apply every `key=value` assignment, rejecting the whole batch on the first bad one
pub fn apply_assignments(mut config: Config, assignments: &[String]) -> anyhow::Result<Config> {
    for assignment in assignments {
        let (key, value) = config::parse_assignment(assignment)?;
        config.set(key, value)?;
    }
    Ok(config)
}

/// Join the prompt words, rejecting a blank request
pub fn join_prompt(words: &[String]) -> Result<String, AgentError> {
    let prompt = words.join(" ");
    if prompt.trim().is_empty() {
        return Err(AgentError::config("No prompt provided."));
    }
    Ok(prompt)
}

fn config_error(err: anyhow::Error) -> AgentError {
    AgentError::config(format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("aish").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_prompt_words_and_flags() {
        let cli = parse(&["-u", "--debug", "list", "large", "files"]);
        assert!(cli.unsafe_mode);
        assert!(cli.debug);
        assert_eq!(join_prompt(&cli.prompt).unwrap(), "list large files");
        assert!(cli.config.is_empty());
    }

    #[test]
    fn test_prompt_may_contain_dashes() {
        let cli = parse(&["find", "-name", "*.rs"]);
        assert_eq!(cli.prompt, vec!["find", "-name", "*.rs"]);
        assert!(!cli.unsafe_mode);
    }

    #[test]
    fn test_repeatable_config_and_overrides() {
        let cli = parse(&[
            "--config",
            "ai_key=sk-1",
            "--config",
            "model=gpt-4o-mini",
            "--model",
            "o4",
            "--max-rounds",
            "3",
        ]);
        assert_eq!(cli.config, vec!["ai_key=sk-1", "model=gpt-4o-mini"]);
        assert_eq!(cli.model.as_deref(), Some("o4"));
        assert_eq!(cli.max_rounds, Some(3));
        assert!(cli.prompt.is_empty());
    }

    #[test]
    fn test_version_and_help_are_handled_by_clap() {
        let err = Cli::try_parse_from(["aish", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        let err = Cli::try_parse_from(["aish", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_blank_prompt_is_a_config_error() {
        let err = join_prompt(&[]).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(join_prompt(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_apply_assignments() {
        let args = vec!["ai_key=sk-1".to_string(), "max_rounds=0".to_string()];
        let config = apply_assignments(Config::default(), &args).unwrap();
        assert_eq!(config.api_key(), Some("sk-1"));
        assert_eq!(config.max_rounds, 0);

        let bad_key = vec!["colour=red".to_string()];
        assert!(apply_assignments(Config::default(), &bad_key).is_err());

        let no_equals = vec!["ai_key".to_string()];
        let err = config_error(apply_assignments(Config::default(), &no_equals).unwrap_err());
        assert!(err.to_string().contains("Invalid config format"));
    }
}
