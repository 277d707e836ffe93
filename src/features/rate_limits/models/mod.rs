mod rate_limit_config;
mod rate_limit_status;

pub use rate_limit_config::{ApiCategory, RateLimitConfig, RateLimitConfigError, DEFAULT_QUEUE_TIMEOUT};
pub use rate_limit_status::RateLimitStatus;
