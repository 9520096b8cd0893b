//! Configuration for chat-search

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SearchError};

/// Environment prefix for layered configuration (`CHAT_SEARCH__SLACK__TOKEN`, ...)
pub const ENV_PREFIX: &str = "CHAT_SEARCH";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote API connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    /// Web API base URL, without trailing slash
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// User token (search.messages requires a user token, not a bot token)
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Tuning knobs of the search engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    /// Maximum number of hit enrichments in flight
    #[serde(default = "default_concurrency")]
    pub enrichment_concurrency: usize,
    /// Maximum messages fetched for a thread
    #[serde(default = "default_thread_limit")]
    pub thread_message_limit: usize,
    /// Messages fetched before a non-threaded anchor
    #[serde(default = "default_context_side")]
    pub context_before: usize,
    /// Messages fetched after a non-threaded anchor
    #[serde(default = "default_context_side")]
    pub context_after: usize,
    /// Per-call result count when the request has no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Upper bound for requested limits
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    5
}

fn default_thread_limit() -> usize {
    50
}

fn default_context_side() -> usize {
    2
}

fn default_limit() -> usize {
    20
}

fn default_max_limit() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8091".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enrichment_concurrency: default_concurrency(),
            thread_message_limit: default_thread_limit(),
            context_before: default_context_side(),
            context_after: default_context_side(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack: SlackConfig::default(),
            search: SearchSettings::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Layered load: defaults, then the optional TOML file, then `CHAT_SEARCH__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Config::default())
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SearchError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.slack.api_base.trim().is_empty() {
            return Err(SearchError::Config("slack.api_base is empty".to_string()));
        }

        let search = &self.search;
        if search.enrichment_concurrency == 0 {
            return Err(SearchError::Config(
                "search.enrichment_concurrency must be at least 1".to_string(),
            ));
        }
        if search.thread_message_limit == 0 {
            return Err(SearchError::Config(
                "search.thread_message_limit must be at least 1".to_string(),
            ));
        }
        if search.max_limit == 0 {
            return Err(SearchError::Config(
                "search.max_limit must be at least 1".to_string(),
            ));
        }
        if search.default_limit > search.max_limit {
            return Err(SearchError::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                search.default_limit, search.max_limit
            )));
        }

        Ok(())
    }
}
