use crate::config::store::{lookup, ConfigStore};
use crate::error::ConfigurationError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the published document
pub const DEFAULT_OUTPUT_PATH: &str = "/var/run/nodewatch/output.json";

/// Scheduling settings from the `[agent]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// How long a cycle may stay running before it is abandoned
    pub watchdog_seconds: u64,
    /// Upper bound of the start-up stagger per module, 0 disables it
    pub jitter_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watchdog_seconds: 60,
            jitter_ms: 2000,
        }
    }
}

impl AgentConfig {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_seconds)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Exporter settings from the `[output]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File the document is written to
    pub path: PathBuf,
    /// Write indented JSON instead of a single line
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            pretty: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Sections {
    agent: AgentConfig,
    output: OutputConfig,
}

/// Agent configuration
///
/// The typed sections drive the daemon itself. Everything else in the file
/// (`[system]`, `[modules.*]`, ...) stays available to modules through the
/// [`ConfigStore`] implementation.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub agent: AgentConfig,
    pub output: OutputConfig,
    raw: toml::Table,
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::ReadError` if the file cannot be read,
    /// `ConfigurationError::TomlError` if it is not valid TOML and
    /// `ConfigurationError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigurationError> {
        let raw: toml::Table = contents.parse()?;
        let sections: Sections = toml::from_str(contents)?;

        let config = Self {
            agent: sections.agent,
            output: sections.output,
            raw,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the agent unusable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.agent.watchdog_seconds == 0 {
            return Err(ConfigurationError::ValidationError(
                "agent.watchdog_seconds must be greater than zero".to_string(),
            ));
        }
        if std::time::Instant::now()
            .checked_add(self.agent.watchdog())
            .is_none()
        {
            return Err(ConfigurationError::ValidationError(
                "agent.watchdog_seconds is out of range".to_string(),
            ));
        }

        if self.output.path.as_os_str().is_empty() {
            return Err(ConfigurationError::ValidationError(
                "output.path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl ConfigStore for Config {
    fn get(&self, path: &str) -> Option<toml::Value> {
        lookup(&self.raw, path).cloned()
    }
}
