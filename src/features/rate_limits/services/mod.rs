mod rate_limiter;
mod registry;

pub use rate_limiter::RateLimiter;
pub use registry::RateLimiterRegistry;
