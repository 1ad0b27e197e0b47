//! File-based configuration for conductor.
//!
//! This module reads `<root>/conductor.toml`. It supports:
//! - Retry and archive defaults for every run
//! - Logging level, format and destination
//! - Named collaborator commands
//! - Layered configuration (file → environment → CLI)
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! max_attempts = 3
//! retry_delay_secs = 5
//! archive_on_success = true
//! collaborator_cmd = "agent-runner"
//!
//! [logging]
//! level = "warn"
//! format = "text"
//! to_file = false
//!
//! [collaborators.blog-trend-researcher]
//! command = "./agents/research.sh"
//! working_dir = "."
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::collaborator::{CommandCollaborator, CommandSpec};
use crate::orchestrator::runner::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};

pub const CONFIG_FILE_NAME: &str = "conductor.toml";

pub const ENV_MAX_ATTEMPTS: &str = "CONDUCTOR_MAX_ATTEMPTS";
pub const ENV_RETRY_DELAY_SECS: &str = "CONDUCTOR_RETRY_DELAY_SECS";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: text, json", s),
        }
    }
}

/// Defaults applied to every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    /// Attempts per phase before it is marked as failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed wait between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Move the job to the archive when every phase succeeds
    #[serde(default = "default_archive_on_success")]
    pub archive_on_success: bool,
    /// Fallback command for collaborators without their own entry;
    /// the collaborator name is appended as the last argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator_cmd: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_archive_on_success() -> bool {
    true
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            archive_on_success: default_archive_on_success(),
            collaborator_cmd: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write logs to `<root>/logs/conductor.log` instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            to_file: false,
        }
    }
}

/// A collaborator bound to a shell command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaboratorConfig {
    pub command: String,
    /// Working directory, relative to the job directory unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// The complete conductor.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConductorToml {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Collaborator commands by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collaborators: BTreeMap<String, CollaboratorConfig>,
}

impl ConductorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conductor.toml")
    }

    /// Load `<root>/conductor.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conductor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.defaults.max_attempts = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_MAX_ATTEMPTS, value))?;
        }
        if let Some(value) = lookup(ENV_RETRY_DELAY_SECS) {
            self.defaults.retry_delay_secs = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_RETRY_DELAY_SECS, value))?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.defaults.max_attempts,
            Duration::from_secs(self.defaults.retry_delay_secs),
        )
    }

    /// Build the command-backed collaborator from `[collaborators]` and the fallback.
    pub fn command_collaborator(&self) -> CommandCollaborator {
        self.collaborators
            .iter()
            .fold(CommandCollaborator::new(), |acc, (name, cfg)| {
                acc.with_command(
                    name,
                    CommandSpec {
                        command: cfg.command.clone(),
                        working_dir: cfg.working_dir.clone(),
                    },
                )
            })
            .with_fallback(self.defaults.collaborator_cmd.clone())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.max_attempts == 0 {
            warnings.push("max_attempts is 0; every phase will still be attempted once".to_string());
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            warnings.push(format!("Invalid logging level '{}': {}", self.logging.level, e));
        }

        if let Some(cmd) = &self.defaults.collaborator_cmd
            && cmd.trim().is_empty()
        {
            warnings.push("collaborator_cmd is empty and will be ignored".to_string());
        }

        for (name, cfg) in &self.collaborators {
            if cfg.command.trim().is_empty() {
                warnings.push(format!("Collaborator '{}' has an empty command", name));
            }
        }

        warnings
    }

    /// Commented starter file written by `conductor init`.
    pub fn default_file_contents() -> &'static str {
        r#"# conductor configuration

[defaults]
# Attempts per phase before the run stops with the phase in `error`
max_attempts = 3
# Fixed delay between attempts, in seconds
retry_delay_secs = 5
# Move finished jobs from active/ to archive/
archive_on_success = true
# Fallback for collaborators without an entry below; the name is appended
# collaborator_cmd = "agent-runner"

[logging]
# Filter directive, overridden by RUST_LOG
level = "warn"
# "text" or "json"
format = "text"
# Write to logs/conductor.log instead of stderr
to_file = false

# [collaborators.blog-trend-researcher]
# command = "./agents/research.sh"
# working_dir = "."
"#
    }
}
