use std::time::Duration;

use serde::Deserialize;

use crate::services::retry::RetryPolicy;

/// Client configuration loaded from `POPCORN_*` environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the Popcorn API, including the `/api` prefix
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout enforced by the HTTP client
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Successful loads resolve no faster than this
    #[serde(default = "default_min_loading_ms")]
    pub min_loading_ms: u64,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: u32,

    #[serde(default = "default_popular_limit")]
    pub popular_limit: u32,

    #[serde(default = "default_new_releases_limit")]
    pub new_releases_limit: u32,

    #[serde(default = "default_similar_limit")]
    pub similar_limit: u32,

    /// Bearer token to start the session with
    #[serde(default)]
    pub token: Option<String>,

    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_api_url() -> String {
    "https://popcorn-ggng.onrender.com/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_min_loading_ms() -> u64 {
    800
}

fn default_page_limit() -> u32 {
    20
}

fn default_search_limit() -> u32 {
    20
}

fn default_recommendation_limit() -> u32 {
    15
}

fn default_popular_limit() -> u32 {
    12
}

fn default_new_releases_limit() -> u32 {
    8
}

fn default_similar_limit() -> u32 {
    8
}

fn default_log_filter() -> String {
    "popcorn_client=info,popcorn=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            min_loading_ms: default_min_loading_ms(),
            page_limit: default_page_limit(),
            search_limit: default_search_limit(),
            recommendation_limit: default_recommendation_limit(),
            popular_limit: default_popular_limit(),
            new_releases_limit: default_new_releases_limit(),
            similar_limit: default_similar_limit(),
            token: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::prefixed("POPCORN_")
            .from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.retry_max_attempts == 0 {
            anyhow::bail!("POPCORN_RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.page_limit == 0 || self.search_limit == 0 {
            anyhow::bail!("page and search limits must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            min_latency: Duration::from_millis(self.min_loading_ms),
        }
    }
}
