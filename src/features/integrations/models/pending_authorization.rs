use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::OAuthProvider;

/// How long a consent round-trip may take before its state is rejected
pub const PENDING_AUTHORIZATION_TTL_MINUTES: i64 = 10;

/// Server-side half of an authorization request, looked up by `state` when
/// the provider redirects back. Consumed on first use.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAuthorization {
    pub state: String,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(
        user_id: Uuid,
        provider: OAuthProvider,
        code_verifier: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state: generate_state(),
            user_id,
            provider,
            code_verifier,
            created_at: now,
        }
    }

    pub fn ttl() -> Duration {
        Duration::minutes(PENDING_AUTHORIZATION_TTL_MINUTES)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at >= Self::ttl()
    }
}

/// 64 hex characters from two v4 UUIDs
fn generate_state() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}
