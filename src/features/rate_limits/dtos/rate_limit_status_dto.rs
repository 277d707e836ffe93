use serde::Serialize;
use utoipa::ToSchema;

use crate::features::rate_limits::models::{ApiCategory, RateLimitStatus};

/// Response DTO for a limiter's current state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RateLimitStatusDto {
    pub category: ApiCategory,
    /// Requests started within the current window
    pub requests_in_window: u32,
    pub max_requests: u32,
    /// Requests waiting for a free slot
    pub queue_length: usize,
    /// Whether a new request would run without queueing
    pub can_make_request: bool,
    pub window_ms: u64,
}

impl From<RateLimitStatus> for RateLimitStatusDto {
    fn from(status: RateLimitStatus) -> Self {
        Self {
            category: status.category,
            requests_in_window: status.requests_in_window,
            max_requests: status.max_requests,
            queue_length: status.queue_length,
            can_make_request: status.can_make_request,
            window_ms: status.window.as_millis() as u64,
        }
    }
}
