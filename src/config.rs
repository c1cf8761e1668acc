//! Global configuration parsing and validation.
//!
//! Every field has a default so the agent runs without any config file;
//! hosts that need different behavior pass `--config <path>` pointing at a
//! TOML file overriding individual keys.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Granularity of `agent_message_chunk` updates emitted during a prompt turn.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// One chunk carrying the whole reply. Default mode.
    #[default]
    Whole,
    /// One chunk per character, for hosts that render keystroke-style streams.
    Characters,
}

fn default_agent_name() -> String {
    "agent-conduit".into()
}

fn default_agent_title() -> String {
    "Agent Conduit".into()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_line_bytes() -> usize {
    1_048_576
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Name advertised in `agentInfo.name` during `initialize`.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// Human-readable title advertised in `agentInfo.title`.
    #[serde(default = "default_agent_title")]
    pub agent_title: String,
    /// Deadline for outbound (agent-initiated) requests, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Granularity of streamed agent message chunks.
    #[serde(default)]
    pub chunking: ChunkMode,
    /// Maximum accepted inbound line length in bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            agent_title: default_agent_title(),
            request_timeout_seconds: default_request_timeout_seconds(),
            chunking: ChunkMode::default(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Outbound request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        // Anything below one KiB cannot even hold a small request envelope.
        if self.max_line_bytes < 1024 {
            return Err(AppError::Config(
                "max_line_bytes must be at least 1024".into(),
            ));
        }

        if self.agent_name.trim().is_empty() {
            return Err(AppError::Config("agent_name must not be empty".into()));
        }

        Ok(())
    }
}
