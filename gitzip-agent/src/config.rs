//! Configuration management for the download agent.
//!
//! Loads configuration from an optional TOML file with `GITZIP_` environment
//! variable overrides (`GITZIP_FORGE__API_BASE_URL=...`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub forge: ForgeConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// HTTP/WebSocket server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the credential, settings and history files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory finished archives are written to
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Base URL of the forge REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Client identifier sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept header for JSON endpoints
    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Attempts per file, including the first one
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff before the second attempt; doubles for every further attempt
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Pause inserted between two batches
    #[serde(default = "default_batch_pacing_ms")]
    pub batch_pacing_ms: u64,

    /// Hard ceiling on the per-batch concurrency, whatever the options ask for
    #[serde(default = "default_concurrency_ceiling")]
    pub concurrency_ceiling: usize,

    /// Maximum number of directories a single collection may expand
    #[serde(default = "default_max_directories")]
    pub max_directories: usize,

    /// Jobs fail fast when the remaining API quota is at or below this value
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer: u64,

    /// How long a successful credential validation is trusted
    #[serde(default = "default_credential_revalidate_secs")]
    pub credential_revalidate_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Number of completion records kept in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_port() -> u16 {
    9870
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    "GitHub-Dir-Download-Extension/1.0.0".to_string()
}

fn default_accept() -> String {
    "application/vnd.github.v3+json".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_batch_pacing_ms() -> u64 {
    100
}

fn default_concurrency_ceiling() -> usize {
    10
}

fn default_max_directories() -> usize {
    2000
}

fn default_rate_limit_buffer() -> u64 {
    10
}

fn default_credential_revalidate_secs() -> u64 {
    60 * 60
}

fn default_history_limit() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            downloads_dir: default_downloads_dir(),
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            batch_pacing_ms: default_batch_pacing_ms(),
            concurrency_ceiling: default_concurrency_ceiling(),
            max_directories: default_max_directories(),
            rate_limit_buffer: default_rate_limit_buffer(),
            credential_revalidate_secs: default_credential_revalidate_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }

    pub fn credential_revalidate_after(&self) -> Duration {
        Duration::from_secs(self.credential_revalidate_secs)
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `GITZIP_*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("GITZIP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.transfer.retry_attempts == 0 {
            anyhow::bail!("transfer.retry_attempts must be at least 1");
        }
        if self.transfer.concurrency_ceiling == 0 {
            anyhow::bail!("transfer.concurrency_ceiling must be at least 1");
        }
        if self.transfer.max_directories == 0 {
            anyhow::bail!("transfer.max_directories must be at least 1");
        }
        if self.storage.history_limit == 0 {
            anyhow::bail!("storage.history_limit must be at least 1");
        }
        Ok(())
    }
}
