use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitConfigError {
    #[error("max_requests must be at least 1")]
    ZeroMaxRequests,

    #[error("window must be greater than zero")]
    ZeroWindow,

    #[error("queue timeout must be greater than zero")]
    ZeroQueueTimeout,
}

/// Longest a queued caller waits for a slot unless configured otherwise
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits for one sliding window. Fields are private so every instance has
/// passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_requests: u32,
    window: Duration,
    queue_enabled: bool,
    queue_timeout: Option<Duration>,
}

impl RateLimitConfig {
    pub fn new(
        max_requests: u32,
        window: Duration,
        queue_enabled: bool,
    ) -> Result<Self, RateLimitConfigError> {
        if max_requests == 0 {
            return Err(RateLimitConfigError::ZeroMaxRequests);
        }
        if window.is_zero() {
            return Err(RateLimitConfigError::ZeroWindow);
        }

        Ok(Self {
            max_requests,
            window,
            queue_enabled,
            queue_timeout: None,
        })
    }

    /// Presets are non-zero literals
    const fn preset(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            queue_enabled: true,
            queue_timeout: Some(DEFAULT_QUEUE_TIMEOUT),
        }
    }

    /// Bounds how long a queued caller waits for its turn
    pub fn with_queue_timeout(self, timeout: Duration) -> Result<Self, RateLimitConfigError> {
        if timeout.is_zero() {
            return Err(RateLimitConfigError::ZeroQueueTimeout);
        }

        Ok(Self {
            queue_timeout: Some(timeout),
            ..self
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn queue_enabled(&self) -> bool {
        self.queue_enabled
    }

    pub fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout
    }
}

/// Classes of outbound calls, each with its own limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiCategory {
    Api = 0,
    Search = 1,
    Upload = 2,
    Ai = 3,
    Email = 4,
}

impl ApiCategory {
    pub const ALL: [ApiCategory; 5] = [
        ApiCategory::Api,
        ApiCategory::Search,
        ApiCategory::Upload,
        ApiCategory::Ai,
        ApiCategory::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiCategory::Api => "api",
            ApiCategory::Search => "search",
            ApiCategory::Upload => "upload",
            ApiCategory::Ai => "ai",
            ApiCategory::Email => "email",
        }
    }

    /// Position in `ALL`
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn default_config(&self) -> RateLimitConfig {
        match self {
            ApiCategory::Api => RateLimitConfig::preset(60, 60),
            ApiCategory::Search => RateLimitConfig::preset(30, 60),
            ApiCategory::Upload => RateLimitConfig::preset(10, 60),
            ApiCategory::Ai => RateLimitConfig::preset(20, 60),
            ApiCategory::Email => RateLimitConfig::preset(50, 3600),
        }
    }
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown rate limit category: {}", s))
    }
}
