use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for the coverage relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Minutes between scheduled dumps; 0 disables interval dumps
    #[serde(default = "default_dump_interval_minutes")]
    pub dump_interval_minutes: u64,

    /// Run one final dump cycle on shutdown
    #[serde(default = "default_true")]
    pub dump_on_exit: bool,

    /// Directory for converted reports and the upload cache
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// `;`-separated include patterns over class file locations
    #[serde(default)]
    pub includes: String,

    /// `;`-separated exclude patterns over class file locations
    #[serde(default)]
    pub excludes: String,

    /// What to do when a class file location is seen twice in one dump
    #[serde(default)]
    pub duplicate_class_files: DuplicateClassFileBehavior,

    /// Partition attached to uploaded coverage
    #[serde(default)]
    pub partition: Option<String>,

    /// Connection to the recording runtime
    #[serde(default)]
    pub source: SourceConfig,

    /// Control surface; disabled when absent
    #[serde(default)]
    pub http_server: Option<HttpServerConfig>,

    /// Remote delivery configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_dump_interval_minutes() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("coverage")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dump_interval_minutes: default_dump_interval_minutes(),
            dump_on_exit: true,
            output_dir: default_output_dir(),
            includes: String::new(),
            excludes: String::new(),
            duplicate_class_files: DuplicateClassFileBehavior::default(),
            partition: None,
            source: SourceConfig::default(),
            http_server: None,
            upload: UploadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Interval between scheduled dumps, `None` if interval dumps are disabled
    pub fn dump_interval(&self) -> Option<Duration> {
        (self.dump_interval_minutes > 0)
            .then(|| Duration::from_secs(self.dump_interval_minutes * 60))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateClassFileBehavior {
    Ignore,
    #[default]
    Warn,
    Fail,
}

/// Backoff applied between reconnection attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

/// Connection to the recording runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    #[serde(default = "default_source_host")]
    pub host: String,

    #[serde(default = "default_source_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum time to wait for a dump after requesting it
    #[serde(default = "default_dump_timeout_secs")]
    pub dump_timeout_secs: u64,

    /// Wait between reconnection attempts (initial wait for exponential backoff)
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Upper bound for exponential backoff
    #[serde(default = "default_max_reconnect_interval_secs")]
    pub max_reconnect_interval_secs: u64,

    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_source_host() -> String {
    "localhost".to_string()
}

const fn default_source_port() -> u16 {
    6300
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_dump_timeout_secs() -> u64 {
    60
}

const fn default_reconnect_interval_secs() -> u64 {
    60
}

const fn default_max_reconnect_interval_secs() -> u64 {
    600
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_source_host(),
            port: default_source_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            dump_timeout_secs: default_dump_timeout_secs(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            max_reconnect_interval_secs: default_max_reconnect_interval_secs(),
            backoff: BackoffStrategy::default(),
        }
    }
}

/// Control surface listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_http_port() -> u16 {
    8000
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

/// Remote delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UploadConfig {
    /// Collection endpoint; reports stay in `output_dir` when absent
    #[serde(default)]
    pub server: Option<RemoteServerConfig>,

    /// Fixed commit as `branch:timestamp`
    #[serde(default)]
    pub commit: Option<String>,

    /// Directory searched for a `git.properties` file to detect the commit
    #[serde(default)]
    pub git_properties_dir: Option<PathBuf>,

    #[serde(default = "default_git_properties_poll_secs")]
    pub git_properties_poll_secs: u64,
}

const fn default_git_properties_poll_secs() -> u64 {
    10
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            server: None,
            commit: None,
            git_properties_dir: None,
            git_properties_poll_secs: default_git_properties_poll_secs(),
        }
    }
}

/// Collection endpoint credentials and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteServerConfig {
    pub url: String,
    pub project: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_upload_message")]
    pub message: String,
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_upload_message() -> String {
    "Agent coverage upload".to_string()
}

const fn default_upload_timeout_secs() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for log files (optional, if None logs only to stderr)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
