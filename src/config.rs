// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub turn: TurnSettings,
    #[serde(default)]
    pub subagent: SubagentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the agent server, e.g. `http://127.0.0.1:4096`.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Outbound webhook URL for text and interactive card delivery.
    pub webhook_url: String,
    /// Base URL of the card-rendering collaborator.
    pub card_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSettings {
    #[serde(default = "default_first_event_timeout_secs")]
    pub first_event_timeout_secs: u64,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            first_event_timeout_secs: default_first_event_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentSettings {
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_base_delay_secs")]
    pub poll_base_delay_secs: u64,
}

impl Default for SubagentSettings {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_base_delay_secs: default_poll_base_delay_secs(),
        }
    }
}

fn default_first_event_timeout_secs() -> u64 {
    300
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_base_delay_secs() -> u64 {
    1
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {config_path}"))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {config_path}"))?
        } else {
            Config {
                agent: AgentConfig {
                    base_url: String::new(),
                },
                chat: ChatConfig {
                    webhook_url: String::new(),
                    card_url: String::new(),
                },
                turn: TurnSettings::default(),
                subagent: SubagentSettings::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("PARLEY_AGENT_BASE_URL") {
            config.agent.base_url = val;
        }
        if let Ok(val) = std::env::var("PARLEY_CHAT_WEBHOOK_URL") {
            config.chat.webhook_url = val;
        }
        if let Ok(val) = std::env::var("PARLEY_CHAT_CARD_URL") {
            config.chat.card_url = val;
        }
        if let Ok(val) = std::env::var("PARLEY_FIRST_EVENT_TIMEOUT_SECS") {
            config.turn.first_event_timeout_secs = val
                .parse()
                .context("PARLEY_FIRST_EVENT_TIMEOUT_SECS must be an integer")?;
        }
        if let Ok(val) = std::env::var("PARLEY_SUBAGENT_POLL_ATTEMPTS") {
            config.subagent.poll_attempts = val
                .parse()
                .context("PARLEY_SUBAGENT_POLL_ATTEMPTS must be an integer")?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.base_url.is_empty() {
            bail!("agent.base_url is required (or set PARLEY_AGENT_BASE_URL)");
        }
        if self.chat.webhook_url.is_empty() {
            bail!("chat.webhook_url is required (or set PARLEY_CHAT_WEBHOOK_URL)");
        }
        if self.chat.card_url.is_empty() {
            bail!("chat.card_url is required (or set PARLEY_CHAT_CARD_URL)");
        }
        if self.subagent.poll_attempts == 0 {
            bail!("subagent.poll_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn first_event_timeout(&self) -> Duration {
        Duration::from_secs(self.turn.first_event_timeout_secs)
    }

    pub fn poll_base_delay(&self) -> Duration {
        Duration::from_secs(self.subagent.poll_base_delay_secs)
    }
}
