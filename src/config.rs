use crate::finder::DEFAULT_MAX_PATH_LEN;
use dotenvy::dotenv;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Error loading config: {0}")]
    ConfigError(String),
}

/// Configuration for the ledger synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce interval coalescing a burst of offer-change events into one
    /// batched fetch-and-apply, in milliseconds.
    pub trigger_delay_ms: u64,
    /// Buffer size of the change-event channel.
    pub channel_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { trigger_delay_ms: 5, channel_buffer_size: 100 }
    }
}

impl SyncConfig {
    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }
}

/// Configuration for the query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    /// Route prefix, e.g. `"/v1"`. Empty for none.
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8000, prefix: String::new() }
    }
}

/// Configuration for the path search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Maximum path length including the destination asset.
    pub max_path_len: usize,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self { max_path_len: DEFAULT_MAX_PATH_LEN }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub api: ApiConfig,
    pub finder: FinderConfig,
}

impl AppConfig {
    /// Defaults overridden from environment variables.
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Self::default();

        if let Ok(delay_str) = env::var("TRIGGER_DELAY_MS") {
            config.sync.trigger_delay_ms =
                delay_str.parse().map_err(|e| eyre::eyre!("Invalid TRIGGER_DELAY_MS: {}", e))?;
        }

        if let Ok(buffer_str) = env::var("CHANNEL_BUFFER_SIZE") {
            config.sync.channel_buffer_size =
                buffer_str.parse().map_err(|e| eyre::eyre!("Invalid CHANNEL_BUFFER_SIZE: {}", e))?;
        }

        if let Ok(port_str) = env::var("API_PORT") {
            config.api.port = port_str.parse().map_err(|e| eyre::eyre!("Invalid API_PORT: {}", e))?;
        }

        if let Ok(prefix) = env::var("API_PREFIX") {
            config.api.prefix = prefix;
        }

        if let Ok(len_str) = env::var("MAX_PATH_LEN") {
            config.finder.max_path_len =
                len_str.parse().map_err(|e| eyre::eyre!("Invalid MAX_PATH_LEN: {}", e))?;
        }

        Ok(config)
    }
}

/// Load any config section from a TOML file, expanding `${VAR}` references
/// from the environment first.
pub async fn load_from_file<T: DeserializeOwned>(file_name: String) -> Result<T, ConfigError> {
    dotenv().ok();
    let contents = tokio::fs::read_to_string(file_name).await?;
    let contents = expand_vars(&contents);
    let config: T = toml::from_str(&contents)?;
    Ok(config)
}

fn expand_vars(raw_config: &str) -> String {
    let re = Regex::new(r"\$\{([a-zA-Z_][0-9a-zA-Z_]*)\}").unwrap();
    re.replace_all(raw_config, |caps: &Captures| match env::var(&caps[1]) {
        Ok(val) => val,
        Err(_) => caps[0].to_string(),
    })
    .to_string()
}
