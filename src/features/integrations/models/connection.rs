use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::OAuthProvider;

/// Lifecycle of one provider connection as seen by the CRM user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// Callback received, code exchange in flight
    CodeReceived,
    Connected,
    /// Refresh grant in flight
    Refreshing,
}

/// Token-free view of a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSummary {
    pub provider: OAuthProvider,
    pub state: ConnectionState,
    pub configured: bool,
    pub account_email: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
}
