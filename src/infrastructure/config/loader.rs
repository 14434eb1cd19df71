use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::CommitDescriptor;

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "coverage-relay.yaml";

/// Prefix of environment variable overrides; `__` separates nested keys
pub const ENV_PREFIX: &str = "COVERAGE_RELAY_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Output directory cannot be empty")]
    EmptyOutputDir,

    #[error("Invalid {0} port: 0")]
    InvalidPort(&'static str),

    #[error("Invalid reconnect interval: must be at least 1 second")]
    InvalidReconnectInterval,

    #[error("Invalid git.properties poll interval: must be at least 1 second")]
    InvalidPollInterval,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid commit '{value}': {reason}")]
    InvalidCommit { value: String, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `path`, or `coverage-relay.yaml` in the working directory
    /// 3. Environment variables (`COVERAGE_RELAY_*` prefix, highest priority)
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config: Config = Self::figment(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, ignoring the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::figment(path.as_ref())
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        if config.source.port == 0 {
            return Err(ConfigError::InvalidPort("source"));
        }
        if config.source.reconnect_interval_secs == 0 {
            return Err(ConfigError::InvalidReconnectInterval);
        }
        if config.http_server.as_ref().is_some_and(|s| s.port == 0) {
            return Err(ConfigError::InvalidPort("http_server"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if let Some(commit) = &config.upload.commit {
            commit
                .parse::<CommitDescriptor>()
                .map_err(|err| ConfigError::InvalidCommit {
                    value: commit.clone(),
                    reason: err.to_string(),
                })?;
        }
        if config.upload.git_properties_dir.is_some() && config.upload.git_properties_poll_secs == 0
        {
            return Err(ConfigError::InvalidPollInterval);
        }

        if let Some(server) = &config.upload.server {
            if server.url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Upload server url cannot be empty".to_string(),
                ));
            }
            if server.project.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "Upload server '{}' project cannot be empty",
                    server.url
                )));
            }
        }

        Ok(())
    }
}
