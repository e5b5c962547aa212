//! Configuration management
//!
//! Backend credentials and loop limits, persisted as TOML in the platform
//! config directory. `AI_KEY` and `HELICONE_KEY` in the environment take
//! precedence over the file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys accepted by `--config key=value`
pub const CONFIG_KEYS: &[&str] = &[
    "ai_key",
    "helicone_key",
    "model",
    "base_url",
    "timeout_secs",
    "max_rounds",
    "max_output_bytes",
    "drain_timeout_ms",
];

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bearer token for the completion backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_key: Option<String>,
    /// Routes requests through the Helicone proxy when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helicone_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Round trips allowed before giving up (0 = unbounded)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Bytes of command output fed back to the model per stream
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// How long to wait for pty output after the command exited
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_rounds() -> usize {
    25
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_drain_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_key: None,
            helicone_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_rounds: default_max_rounds(),
            max_output_bytes: default_max_output_bytes(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default location, returning the path written
    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("Config path has no parent")?;
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `AI_KEY` / `HELICONE_KEY` from `lookup`; empty values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("AI_KEY").filter(|v| !v.is_empty()) {
            self.ai_key = Some(key);
        }
        if let Some(key) = lookup("HELICONE_KEY").filter(|v| !v.is_empty()) {
            self.helicone_key = Some(key);
        }
        self
    }

    /// Set one field by its config key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "ai_key" => self.ai_key = non_empty(value),
            "helicone_key" => self.helicone_key = non_empty(value),
            "model" => self.model = value.to_string(),
            "base_url" => self.base_url = value.trim_end_matches('/').to_string(),
            "timeout_secs" => self.timeout_secs = parse_number(key, value)?,
            "max_rounds" => self.max_rounds = parse_number(key, value)?,
            "max_output_bytes" => self.max_output_bytes = parse_number(key, value)?,
            "drain_timeout_ms" => self.drain_timeout_ms = parse_number(key, value)?,
            _ => bail!(
                "Unknown config key '{}'. Available keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// API key, if one is configured and non-empty
    pub fn api_key(&self) -> Option<&str> {
        self.ai_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn helicone_key(&self) -> Option<&str> {
        self.helicone_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for '{}': expected a number, got '{}'", key, value))
}

/// Split a `key=value` argument at the first `=`
pub fn parse_assignment(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("Invalid config format '{}'. Use: --config ai_key=XXX", arg),
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "aish", "aish")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}
