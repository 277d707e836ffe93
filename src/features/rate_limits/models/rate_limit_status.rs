use std::time::Duration;

use super::ApiCategory;

/// Point-in-time view of one limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub category: ApiCategory,
    pub requests_in_window: u32,
    pub max_requests: u32,
    pub queue_length: usize,
    pub can_make_request: bool,
    pub window: Duration,
}
