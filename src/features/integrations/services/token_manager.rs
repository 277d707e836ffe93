use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::integration_store::IntegrationStore;
use super::pkce::PkcePair;
use crate::features::integrations::clients::TokenEndpoint;
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    ConnectionState, ConnectionSummary, OAuthCredential, OAuthProvider, PendingAuthorization,
    ProviderRegistry,
};
use crate::shared::retry::UNAUTHORIZED_RETRIES;

/// Refresh this long before the provider's expiry
const DEFAULT_REFRESH_MARGIN_MINUTES: i64 = 5;

type ConnectionKey = (Uuid, OAuthProvider);

/// Consent URL plus the state value that will come back on the callback
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub provider: OAuthProvider,
    pub authorization_url: String,
    pub state: String,
}

/// Connection states that only exist while a request is in flight
#[derive(Default)]
struct TransientStates {
    states: StdMutex<HashMap<ConnectionKey, ConnectionState>>,
}

impl TransientStates {
    fn enter(&self, key: ConnectionKey, state: ConnectionState) -> TransientGuard<'_> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, state);
        TransientGuard { owner: self, key }
    }

    fn get(&self, key: &ConnectionKey) -> Option<ConnectionState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

struct TransientGuard<'a> {
    owner: &'a TransientStates,
    key: ConnectionKey,
}

impl Drop for TransientGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Owns the OAuth lifecycle of every external connection: authorization,
/// code exchange, proactive refresh and the refresh-on-401 retry.
pub struct TokenManager {
    providers: ProviderRegistry,
    store: Arc<dyn IntegrationStore>,
    token_endpoint: Arc<dyn TokenEndpoint>,
    refresh_margin: Duration,
    /// One lock per connection so concurrent callers share a single refresh.
    /// Entries exist only while a refresh check is in flight.
    refresh_locks: Mutex<HashMap<ConnectionKey, Arc<Mutex<()>>>>,
    transient: TransientStates,
}

impl TokenManager {
    pub fn new(
        providers: ProviderRegistry,
        store: Arc<dyn IntegrationStore>,
        token_endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            providers,
            store,
            token_endpoint,
            refresh_margin: Duration::minutes(DEFAULT_REFRESH_MARGIN_MINUTES),
            refresh_locks: Mutex::new(HashMap::new()),
            transient: TransientStates::default(),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Starts the authorization-code flow for `provider`
    pub async fn initiate_auth(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<AuthorizationRequest, IntegrationError> {
        let config = self.providers.get(provider)?;
        let now = Utc::now();

        if let Err(e) = self
            .store
            .purge_expired_pending(now - PendingAuthorization::ttl())
            .await
        {
            tracing::warn!("Failed to purge expired authorization requests: {}", e);
        }

        let pkce = config.use_pkce.then(PkcePair::generate);
        let pending = PendingAuthorization::new(
            user_id,
            provider,
            pkce.as_ref().map(|p| p.verifier.clone()),
            now,
        );
        let authorization_url = config
            .authorization_url(&pending.state, pkce.as_ref().map(|p| p.challenge.as_str()))?;

        self.store.save_pending(&pending).await?;

        tracing::info!(%user_id, %provider, "Authorization started");

        Ok(AuthorizationRequest {
            provider,
            authorization_url,
            state: pending.state,
        })
    }

    /// Completes the flow: validates `state`, exchanges `code` and stores the
    /// resulting connection as active
    pub async fn handle_callback(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<OAuthCredential, IntegrationError> {
        let pending = self
            .store
            .take_pending(state)
            .await?
            .ok_or(IntegrationError::InvalidState)?;

        let now = Utc::now();
        if pending.user_id != user_id || pending.provider != provider || pending.is_expired(now) {
            tracing::warn!(%user_id, %provider, "Rejected authorization callback");
            return Err(IntegrationError::InvalidState);
        }

        let config = self.providers.get(provider)?;
        let _state = self
            .transient
            .enter((user_id, provider), ConnectionState::CodeReceived);

        let grant = self
            .token_endpoint
            .exchange_code(config, code, pending.code_verifier.as_deref())
            .await?;

        let account_email = match self
            .token_endpoint
            .fetch_account_email(config, &grant.access_token)
            .await
        {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(%provider, "Could not resolve account email: {}", e);
                None
            }
        };

        let credential =
            OAuthCredential::from_grant(user_id, provider, account_email, &grant, Utc::now());
        let stored = self.store.upsert_credential(&credential).await?;

        tracing::info!(%user_id, %provider, "Integration connected");
        Ok(stored)
    }

    /// Returns a usable access token for `credential`, refreshing it first
    /// when it expires within the refresh margin
    pub async fn get_valid_access_token(
        &self,
        credential: &OAuthCredential,
    ) -> Result<String, IntegrationError> {
        if !credential.needs_refresh(Utc::now(), self.refresh_margin) {
            return Ok(credential.access_token.clone());
        }

        let key = (credential.user_id, credential.provider);
        self.serialized(key, move || async move {
            // Another caller may have refreshed while we waited for the lock
            let current = self
                .store
                .find_active(key.0, key.1)
                .await?
                .ok_or(IntegrationError::NotConnected(key.1))?;
            if !current.needs_refresh(Utc::now(), self.refresh_margin) {
                return Ok(current.access_token);
            }

            self.refresh_locked(current, false).await
        })
        .await
    }

    /// Loads the active connection and returns a valid access token
    pub async fn access_token_for(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<String, IntegrationError> {
        let credential = self
            .store
            .find_active(user_id, provider)
            .await?
            .ok_or(IntegrationError::NotConnected(provider))?;

        self.get_valid_access_token(&credential).await
    }

    /// Refreshes after the provider rejected `rejected_token`, unless a
    /// concurrent caller has already replaced it
    async fn force_refresh(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        rejected_token: &str,
    ) -> Result<String, IntegrationError> {
        self.serialized((user_id, provider), move || async move {
            let current = self
                .store
                .find_active(user_id, provider)
                .await?
                .ok_or(IntegrationError::NotConnected(provider))?;
            if current.access_token != rejected_token {
                return Ok(current.access_token);
            }

            self.refresh_locked(current, true).await
        })
        .await
    }

    /// Runs the refresh grant. Callers hold the connection's refresh lock.
    async fn refresh_locked(
        &self,
        credential: OAuthCredential,
        forced: bool,
    ) -> Result<String, IntegrationError> {
        let provider = credential.provider;
        let user_id = credential.user_id;

        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            // Still usable for a little while; the caller finds out on expiry
            if !forced && !credential.is_expired(Utc::now()) {
                tracing::warn!(%user_id, %provider, "Token near expiry and no refresh token stored");
                return Ok(credential.access_token);
            }
            return Err(IntegrationError::NoRefreshToken(provider));
        };

        let config = self.providers.get(provider)?;
        let _state = self
            .transient
            .enter((user_id, provider), ConnectionState::Refreshing);

        match self.token_endpoint.refresh(config, refresh_token).await {
            Ok(grant) => {
                let refreshed = credential.refreshed_with(&grant, Utc::now());
                self.store.update_tokens(&refreshed).await?;
                tracing::info!(
                    %user_id,
                    %provider,
                    expires_at = %refreshed.expires_at,
                    "Access token refreshed"
                );
                Ok(refreshed.access_token)
            }
            Err(IntegrationError::RefreshRejected(p)) => {
                tracing::warn!(%user_id, %provider, "Refresh token rejected, deactivating connection");
                self.store.deactivate(user_id, provider).await?;
                Err(IntegrationError::RefreshRejected(p))
            }
            Err(e) => {
                tracing::error!(%user_id, %provider, "Token refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Runs `op` with a valid access token. When the provider answers 401 the
    /// token is refreshed and `op` retried `UNAUTHORIZED_RETRIES` time(s);
    /// a repeated 401 is returned to the caller.
    pub async fn with_access_token<T, F, Fut>(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        op: F,
    ) -> Result<T, IntegrationError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, IntegrationError>>,
    {
        let mut token = self.access_token_for(user_id, provider).await?;
        let mut retries_left = UNAUTHORIZED_RETRIES;

        loop {
            match op(token.clone()).await {
                Err(IntegrationError::UpstreamUnauthorized) if retries_left > 0 => {
                    retries_left -= 1;
                    tracing::info!(%user_id, %provider, "Provider rejected token, refreshing and retrying");
                    token = self.force_refresh(user_id, provider, &token).await?;
                }
                result => return result,
            }
        }
    }

    /// Marks the connection inactive. Tokens are not revoked at the provider.
    pub async fn disconnect(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, IntegrationError> {
        let disconnected = self.store.deactivate(user_id, provider).await?;
        if disconnected {
            tracing::info!(%user_id, %provider, "Integration disconnected");
        }
        Ok(disconnected)
    }

    /// One summary per known provider, in `OAuthProvider::ALL` order
    pub async fn connections(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConnectionSummary>, IntegrationError> {
        let credentials = self.store.list_for_user(user_id).await?;

        Ok(OAuthProvider::ALL
            .into_iter()
            .map(|provider| {
                let active = credentials
                    .iter()
                    .find(|c| c.provider == provider && c.is_active);
                let state = self
                    .transient
                    .get(&(user_id, provider))
                    .unwrap_or(match active {
                        Some(_) => ConnectionState::Connected,
                        None => ConnectionState::Disconnected,
                    });

                ConnectionSummary {
                    provider,
                    state,
                    configured: self.providers.is_configured(provider),
                    account_email: active.and_then(|c| c.account_email.clone()),
                    scope: active.and_then(|c| c.scope.clone()),
                    expires_at: active.map(|c| c.expires_at),
                    connected_at: active.map(|c| c.created_at),
                }
            })
            .collect())
    }

    /// Runs `f` under the connection's refresh lock. The lock entry is
    /// dropped again once no other caller holds or awaits it.
    async fn serialized<T, F, Fut>(&self, key: ConnectionKey, f: F) -> Result<T, IntegrationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, IntegrationError>>,
    {
        let lock = {
            let mut locks = self.refresh_locks.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };

        let result = {
            let _guard = lock.lock().await;
            f().await
        };

        // Clones are only handed out under the map lock, so the count cannot
        // grow while it is held. Two means the map's copy and ours.
        let mut locks = self.refresh_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }

        result
    }
}
