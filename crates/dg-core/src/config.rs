use std::path::{Path, PathBuf};
use std::time::Duration;

use dg_backend::{ClientConfig, RetryPolicy, API_BASE_ENV, DEFAULT_API_BASE};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Backend base URL. `DGD_API_BASE` takes precedence when set.
    pub base_url: Option<String>,
    /// Timeout for non-streaming requests.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Resolve the base URL from `DGD_API_BASE`, the config file, or the default.
    pub fn resolve_base_url(&self) -> String {
        self.resolve_base_url_with(std::env::var(API_BASE_ENV).ok())
    }

    fn resolve_base_url_with(&self, env_value: Option<String>) -> String {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Delay before the first retry; multiplied after each attempt.
    pub delay_ms: u64,
    pub backoff_multiplier: u32,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            delay_ms: policy.delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            retryable_statuses: policy.retryable_statuses,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            retryable_statuses: self.retryable_statuses.clone(),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Self {
        Self::load_from(&config_path())
    }

    /// Load from `path`, falling back to defaults if it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.server.resolve_base_url(),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            retry: self.retry.policy(),
        }
    }
}

fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("dgchat").join("config.toml")
}
