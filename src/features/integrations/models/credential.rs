use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::OAuthProvider;

/// Lifetime assumed when a token response omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest lifetime accepted from a token response (one year)
const MAX_EXPIRES_IN_SECS: i64 = 86_400 * 365;

/// Token endpoint response, shared by the code exchange and the refresh grant
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    /// Expiry of the granted access token. `expires_in` comes from the
    /// provider, so it is clamped to `0..=MAX_EXPIRES_IN_SECS`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        now.checked_add_signed(Duration::seconds(secs))
            .unwrap_or(now)
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Stored tokens for one `(user_id, provider)` connection
#[derive(Clone, PartialEq)]
pub struct OAuthCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub account_email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
    pub token_type: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthCredential {
    /// Fresh credential from a successful code exchange
    pub fn from_grant(
        user_id: Uuid,
        provider: OAuthProvider,
        account_email: Option<String>,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            provider,
            account_email,
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            expires_at: grant.expires_at(now),
            scope: grant.scope.clone(),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| "Bearer".to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Applies a refresh grant. Providers that do not rotate refresh tokens
    /// omit them, so the stored refresh token and scope are kept.
    pub fn refreshed_with(&self, grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            refresh_token: grant
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            expires_at: grant.expires_at(now),
            scope: grant.scope.clone().or_else(|| self.scope.clone()),
            token_type: grant
                .token_type
                .clone()
                .unwrap_or_else(|| self.token_type.clone()),
            updated_at: now,
            ..self.clone()
        }
    }
}

impl fmt::Debug for OAuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("account_email", &self.account_email)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(refresh_token: Option<&str>, scope: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: "new-access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: Some(3600),
            scope: scope.map(str::to_string),
            token_type: None,
        }
    }

    fn credential(now: DateTime<Utc>) -> OAuthCredential {
        OAuthCredential::from_grant(
            Uuid::new_v4(),
            OAuthProvider::Gmail,
            Some("rep@example.com".to_string()),
            &TokenGrant {
                access_token: "old-access".to_string(),
                refresh_token: Some("old-refresh".to_string()),
                expires_in: Some(120),
                scope: Some("gmail.readonly".to_string()),
                token_type: Some("Bearer".to_string()),
            },
            now,
        )
    }

    #[test]
    fn test_refresh_keeps_refresh_token_and_scope_when_absent() {
        let now = Utc::now();
        let refreshed = credential(now).refreshed_with(&grant(None, None), now);

        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(refreshed.scope.as_deref(), Some("gmail.readonly"));
        assert_eq!(refreshed.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_refresh_applies_rotated_refresh_token() {
        let now = Utc::now();
        let refreshed =
            credential(now).refreshed_with(&grant(Some("rotated"), Some("mail.read")), now);

        assert_eq!(refreshed.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(refreshed.scope.as_deref(), Some("mail.read"));
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = Utc::now();
        let credential = credential(now);

        assert!(credential.needs_refresh(now, Duration::minutes(5)));
        assert!(!credential.needs_refresh(now, Duration::minutes(1)));
        assert!(!credential.is_expired(now));
    }

    #[test]
    fn test_out_of_range_expires_in_is_clamped() {
        let now = Utc::now();
        let huge: TokenGrant = serde_json::from_str(
            r#"{"access_token": "a", "expires_in": 9223372036854775807}"#,
        )
        .unwrap();
        assert_eq!(
            huge.expires_at(now),
            now + Duration::seconds(MAX_EXPIRES_IN_SECS)
        );

        let negative: TokenGrant =
            serde_json::from_str(r#"{"access_token": "a", "expires_in": -5}"#).unwrap();
        assert_eq!(negative.expires_at(now), now);

        let missing: TokenGrant = serde_json::from_str(r#"{"access_token": "a"}"#).unwrap();
        assert_eq!(
            missing.expires_at(now),
            now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
        );
    }

    #[test]
    fn test_debug_output_hides_tokens() {
        let rendered = format!("{:?}", credential(Utc::now()));
        assert!(!rendered.contains("old-access"));
        assert!(!rendered.contains("old-refresh"));
    }
}
