use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::features::integrations::models::{ConnectionState, ConnectionSummary, OAuthProvider};

/// Response DTO for one provider connection. Never carries tokens.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionSummaryDto {
    pub provider: OAuthProvider,
    pub display_name: String,
    pub state: ConnectionState,
    /// Whether the server has client credentials for this provider
    pub configured: bool,
    pub account_email: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl From<ConnectionSummary> for ConnectionSummaryDto {
    fn from(summary: ConnectionSummary) -> Self {
        Self {
            provider: summary.provider,
            display_name: summary.provider.display_name().to_string(),
            state: summary.state,
            configured: summary.configured,
            account_email: summary.account_email,
            scope: summary.scope,
            expires_at: summary.expires_at,
            connected_at: summary.connected_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizeMode {
    /// 303 redirect to the consent page
    #[default]
    Redirect,
    /// Consent URL in the response envelope
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub mode: AuthorizeMode,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthorizationUrlDto {
    pub provider: OAuthProvider,
    pub authorization_url: String,
}

/// Query the provider appends when redirecting back
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user declined consent
    pub error: Option<String>,
    pub error_description: Option<String>,
}
