use std::time::Duration;

use thiserror::Error;

use crate::core::error::AppError;
use crate::features::rate_limits::models::ApiCategory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for {category} requests, retry in {retry_after:?}")]
    Exceeded {
        category: ApiCategory,
        retry_after: Duration,
    },

    #[error("Gave up after waiting {waited:?} in the {category} queue")]
    QueueTimeout {
        category: ApiCategory,
        waited: Duration,
    },

    #[error("The {category} queue was cleared before the request ran")]
    QueueCleared { category: ApiCategory },
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded { retry_after, .. } => AppError::RateLimitExceeded {
                message: err.to_string(),
                // Round up so clients never retry early
                retry_after_secs: Some(retry_after.as_millis().div_ceil(1000) as u64),
            },
            RateLimitError::QueueTimeout { .. } => AppError::RateLimitExceeded {
                message: err.to_string(),
                retry_after_secs: None,
            },
            RateLimitError::QueueCleared { .. } => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}
