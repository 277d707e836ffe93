use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    OAuthCredential, OAuthProvider, PendingAuthorization,
};

/// Persistence for connections and in-flight authorization requests
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn save_pending(&self, pending: &PendingAuthorization) -> Result<(), IntegrationError>;

    /// Removes and returns the pending request for `state`, so a state value
    /// can be redeemed once
    async fn take_pending(
        &self,
        state: &str,
    ) -> Result<Option<PendingAuthorization>, IntegrationError>;

    async fn purge_expired_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, IntegrationError>;

    /// Inserts or replaces the `(user_id, provider)` connection and marks it
    /// active. A missing refresh token keeps the stored one.
    async fn upsert_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, IntegrationError>;

    async fn find_active(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthCredential>, IntegrationError>;

    /// Persists refreshed token fields of an existing connection
    async fn update_tokens(&self, credential: &OAuthCredential) -> Result<(), IntegrationError>;

    /// Returns whether an active connection was deactivated
    async fn deactivate(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, IntegrationError>;

    /// Active and inactive connections of a user
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OAuthCredential>, IntegrationError>;
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    account_email: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    scope: Option<String>,
    token_type: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for OAuthCredential {
    type Error = IntegrationError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider.parse()?,
            account_email: row.account_email,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
            scope: row.scope,
            token_type: row.token_type,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRow {
    state: String,
    user_id: Uuid,
    provider: String,
    code_verifier: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PendingRow> for PendingAuthorization {
    type Error = IntegrationError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            state: row.state,
            user_id: row.user_id,
            provider: row.provider.parse()?,
            code_verifier: row.code_verifier,
            created_at: row.created_at,
        })
    }
}

const CREDENTIAL_COLUMNS: &str = "id, user_id, provider, account_email, access_token, \
     refresh_token, expires_at, scope, token_type, is_active, created_at, updated_at";

/// Postgres-backed store over `integration_credentials` and
/// `oauth_pending_authorizations`
pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn save_pending(&self, pending: &PendingAuthorization) -> Result<(), IntegrationError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_pending_authorizations (state, user_id, provider, code_verifier, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&pending.state)
        .bind(pending.user_id)
        .bind(pending.provider.as_str())
        .bind(&pending.code_verifier)
        .bind(pending.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_pending(
        &self,
        state: &str,
    ) -> Result<Option<PendingAuthorization>, IntegrationError> {
        let row = sqlx::query_as::<_, PendingRow>(
            r#"
            DELETE FROM oauth_pending_authorizations
            WHERE state = $1
            RETURNING state, user_id, provider, code_verifier, created_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn purge_expired_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, IntegrationError> {
        let result = sqlx::query("DELETE FROM oauth_pending_authorizations WHERE created_at < $1")
            .bind(created_before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn upsert_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, IntegrationError> {
        let query = format!(
            r#"
            INSERT INTO integration_credentials
                (id, user_id, provider, account_email, access_token, refresh_token,
                 expires_at, scope, token_type, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $10)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                account_email = COALESCE(EXCLUDED.account_email, integration_credentials.account_email),
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, integration_credentials.refresh_token),
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                token_type = EXCLUDED.token_type,
                is_active = TRUE,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            CREDENTIAL_COLUMNS
        );

        let row = sqlx::query_as::<_, CredentialRow>(&query)
            .bind(credential.id)
            .bind(credential.user_id)
            .bind(credential.provider.as_str())
            .bind(&credential.account_email)
            .bind(&credential.access_token)
            .bind(&credential.refresh_token)
            .bind(credential.expires_at)
            .bind(&credential.scope)
            .bind(&credential.token_type)
            .bind(credential.updated_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthCredential>, IntegrationError> {
        let query = format!(
            "SELECT {} FROM integration_credentials \
             WHERE user_id = $1 AND provider = $2 AND is_active",
            CREDENTIAL_COLUMNS
        );

        let row = sqlx::query_as::<_, CredentialRow>(&query)
            .bind(user_id)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_tokens(&self, credential: &OAuthCredential) -> Result<(), IntegrationError> {
        sqlx::query(
            r#"
            UPDATE integration_credentials
            SET access_token = $3, refresh_token = $4, expires_at = $5,
                scope = $6, token_type = $7, updated_at = $8
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(credential.user_id)
        .bind(credential.provider.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.scope)
        .bind(&credential.token_type)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, IntegrationError> {
        let result = sqlx::query(
            r#"
            UPDATE integration_credentials
            SET is_active = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND provider = $2 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OAuthCredential>, IntegrationError> {
        let query = format!(
            "SELECT {} FROM integration_credentials WHERE user_id = $1 ORDER BY provider",
            CREDENTIAL_COLUMNS
        );

        let rows = sqlx::query_as::<_, CredentialRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
