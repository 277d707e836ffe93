use std::time::Duration;

use thiserror::Error;

use crate::core::error::AppError;
use crate::features::integrations::models::OAuthProvider;
use crate::features::rate_limits::RateLimitError;
use crate::shared::retry::{retry_decision_for_status, RetryDecision, Retryable};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Unknown integration provider: {0}")]
    UnknownProvider(String),

    #[error("{} is not configured on this server", .0.display_name())]
    ProviderNotConfigured(OAuthProvider),

    #[error("Invalid or expired authorization state")]
    InvalidState,

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("{} has no refresh token, reconnect the account", .0.display_name())]
    NoRefreshToken(OAuthProvider),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The provider answered `invalid_grant`; the grant is gone for good
    #[error("{} revoked access, reconnect the account", .0.display_name())]
    RefreshRejected(OAuthProvider),

    #[error("{} is not connected", .0.display_name())]
    NotConnected(OAuthProvider),

    #[error("{name} does not support {op}", name = .0.display_name(), op = .1)]
    UnsupportedOperation(OAuthProvider, &'static str),

    #[error("Provider rejected the access token")]
    UpstreamUnauthorized,

    #[error("Provider returned HTTP {status}: {message}")]
    UpstreamError {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Retryable for IntegrationError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            IntegrationError::UpstreamError { status, .. } => {
                match reqwest::StatusCode::from_u16(*status) {
                    Ok(status) => retry_decision_for_status(status),
                    Err(_) => RetryDecision::NonRetryable,
                }
            }
            IntegrationError::Http(e) if e.is_timeout() || e.is_connect() => {
                RetryDecision::Retryable
            }
            _ => RetryDecision::NonRetryable,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            IntegrationError::UpstreamError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<IntegrationError> for AppError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::UnknownProvider(_) => AppError::NotFound(err.to_string()),
            IntegrationError::ProviderNotConfigured(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            IntegrationError::InvalidState
            | IntegrationError::ExchangeFailed(_)
            | IntegrationError::UnsupportedOperation(..) => AppError::BadRequest(err.to_string()),
            IntegrationError::NoRefreshToken(_)
            | IntegrationError::RefreshRejected(_)
            | IntegrationError::NotConnected(_)
            | IntegrationError::UpstreamUnauthorized => {
                AppError::ReauthorizationRequired(err.to_string())
            }
            IntegrationError::RefreshFailed(_)
            | IntegrationError::UpstreamError { .. }
            | IntegrationError::InvalidResponse(_)
            | IntegrationError::Http(_) => AppError::ExternalServiceError(err.to_string()),
            IntegrationError::RateLimited(e) => e.into(),
            IntegrationError::Database(e) => AppError::Database(e),
        }
    }
}
