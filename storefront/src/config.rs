use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::{Result, StorefrontError};

/// Retry schedule for optimistic hosted transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Linear backoff step between attempts in milliseconds
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            base_backoff_ms: 20,
        }
    }
}

/// Configuration for the hosted realtime document store
#[derive(Debug, Clone)]
pub struct HostedConfig {
    /// Database root URL (e.g., "https://my-shop.firebaseio.com")
    pub base_url: String,
    /// Static auth token, used when the session identity carries none
    pub auth_token: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Retry schedule for `transact`
    pub transaction_retry: RetryPolicy,
}

impl HostedConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout_ms: 10_000,
            transaction_retry: RetryPolicy::default(),
        }
    }
}

/// Bounds applied to comment submissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLimits {
    pub max_name_chars: usize,
    pub max_text_chars: usize,
    /// Minimum time between two submissions from the same client
    pub min_interval_ms: i64,
}

impl Default for CommentLimits {
    fn default() -> Self {
        Self {
            max_name_chars: 40,
            max_text_chars: 600,
            min_interval_ms: 10_000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// File backing the local store, in-memory when absent
    pub local_path: Option<PathBuf>,
    /// Byte budget of the local store
    pub local_quota_bytes: Option<usize>,
    /// Hosted backend, local-only when absent
    pub hosted: Option<HostedConfig>,
    pub comment_limits: CommentLimits,
    /// Rows kept on the leaderboard
    pub leaderboard_size: usize,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            local_path: None,
            local_quota_bytes: Some(5 * 1024 * 1024),
            hosted: None,
            comment_limits: CommentLimits::default(),
            leaderboard_size: 10,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from `STOREFRONT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let hosted = match var("STOREFRONT_DATABASE_URL") {
            Some(base_url) => {
                let mut hosted = HostedConfig::new(base_url);
                hosted.auth_token = var("STOREFRONT_AUTH_TOKEN");
                hosted.request_timeout_ms =
                    try_load("STOREFRONT_REQUEST_TIMEOUT_MS", hosted.request_timeout_ms)?;
                hosted.transaction_retry.max_attempts = try_load(
                    "STOREFRONT_TX_MAX_ATTEMPTS",
                    hosted.transaction_retry.max_attempts,
                )?;
                Some(hosted)
            }
            None => {
                info!("STOREFRONT_DATABASE_URL not set, running local-only");
                None
            }
        };

        let local_quota_bytes = match var("STOREFRONT_LOCAL_QUOTA_BYTES") {
            Some(raw) => Some(parse("STOREFRONT_LOCAL_QUOTA_BYTES", &raw)?),
            None => defaults.local_quota_bytes,
        };

        let mut comment_limits = defaults.comment_limits;
        comment_limits.min_interval_ms =
            try_load("STOREFRONT_COMMENT_INTERVAL_MS", comment_limits.min_interval_ms)?;

        Ok(Self {
            local_path: var("STOREFRONT_LOCAL_PATH").map(PathBuf::from),
            local_quota_bytes,
            hosted,
            comment_limits,
            leaderboard_size: try_load("STOREFRONT_LEADERBOARD_SIZE", defaults.leaderboard_size)?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => parse(key, &raw),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        StorefrontError::config_error(format!("{key}: {e}"))
    })
}
