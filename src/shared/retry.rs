//! Retry policy shared by every outbound provider call.
//!
//! Two independent budgets live here:
//! - transient failures (5xx, 408, 429, connect/timeout) are retried with
//!   exponential backoff up to `RetryPolicy::max_attempts`;
//! - an upstream 401 earns exactly `UNAUTHORIZED_RETRIES` retry after a
//!   forced token refresh (see the integrations token manager).
//!
//! The rate limiter never retries; it only delays.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

/// Retries granted after a forced token refresh on upstream 401
pub const UNAUTHORIZED_RETRIES: u32 = 1;

/// Upper bound honoured for a provider's `Retry-After` hint
const MAX_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

/// Errors that know whether the failed call is worth repeating
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;

    /// Server-provided delay hint, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// 429, 408 and 5xx are transient; every other status is final
pub fn retry_decision_for_status(status: StatusCode) -> RetryDecision {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

/// Parses a delta-seconds `Retry-After` header value
pub fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

impl RetryPolicy {
    /// Policy that makes a single attempt
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }

        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .initial_backoff_ms
            .saturating_mul(exponent)
            .min(self.max_backoff_ms);
        let jitter = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0)
            % 150;
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn with_backoff<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= attempts || err.retry_decision() == RetryDecision::NonRetryable {
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt, err.retry_after());
                    tracing::warn!(
                        "{} retry {}/{} after error: {} (sleep {:?})",
                        label,
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
