//! Fixtures shared by the unit tests: injected users, an in-memory
//! integration store, a scripted token endpoint and throwaway HTTP servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{extract::Request, middleware::Next, Router};
use chrono::{DateTime, Duration, Utc};
use fake::{faker::internet::en::SafeEmail, Fake};
use uuid::Uuid;

use crate::features::auth::model::AuthenticatedUser;
use crate::features::integrations::clients::TokenEndpoint;
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    OAuthCredential, OAuthProvider, OAuthProviderConfig, PendingAuthorization, TokenGrant,
};
use crate::features::integrations::services::IntegrationStore;
use crate::shared::constants::ROLE_ADMIN;

const TEST_USER_ID: Uuid = Uuid::from_u128(0x0192_7e1a_5c3b_7d10_8a11_2b3c_4d5e_6f70);
const TEST_ADMIN_ID: Uuid = Uuid::from_u128(0x0192_7e1a_5c3b_7d10_8a11_2b3c_4d5e_6f71);

/// Signed-in sales rep with no application roles
pub fn test_user() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: TEST_USER_ID,
        email: Some(SafeEmail().fake()),
        role: "authenticated".to_string(),
        roles: Vec::new(),
    }
}

pub fn test_admin() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: TEST_ADMIN_ID,
        email: Some(SafeEmail().fake()),
        role: "authenticated".to_string(),
        roles: vec![ROLE_ADMIN.to_string()],
    }
}

/// Puts `user` into the request extensions the way `auth_middleware` does
pub fn with_user(router: Router, user: AuthenticatedUser) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| {
            let user = user.clone();
            async move {
                request.extensions_mut().insert(user);
                next.run(request).await
            }
        },
    ))
}

pub fn with_user_auth(router: Router) -> Router {
    with_user(router, test_user())
}

pub fn with_admin_auth(router: Router) -> Router {
    with_user(router, test_admin())
}

/// Active connection with an hour left and a refresh token
pub fn test_credential(user_id: Uuid, provider: OAuthProvider) -> OAuthCredential {
    let now = Utc::now();
    OAuthCredential {
        id: Uuid::now_v7(),
        user_id,
        provider,
        account_email: Some("rep@example.com".to_string()),
        access_token: "stored-access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: now + Duration::hours(1),
        scope: None,
        token_type: "Bearer".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL
pub async fn spawn_mock_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    format!("http://{}", addr)
}

/// `IntegrationStore` over in-process maps, with the same upsert rules as
/// the Postgres store
#[derive(Default)]
pub struct InMemoryIntegrationStore {
    pending: Mutex<HashMap<String, PendingAuthorization>>,
    credentials: Mutex<HashMap<(Uuid, OAuthProvider), OAuthCredential>>,
}

impl InMemoryIntegrationStore {
    pub fn pending(&self, state: &str) -> Option<PendingAuthorization> {
        self.pending.lock().unwrap().get(state).cloned()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn save_pending(&self, pending: &PendingAuthorization) -> Result<(), IntegrationError> {
        self.pending
            .lock()
            .unwrap()
            .insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending(
        &self,
        state: &str,
    ) -> Result<Option<PendingAuthorization>, IntegrationError> {
        Ok(self.pending.lock().unwrap().remove(state))
    }

    async fn purge_expired_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, IntegrationError> {
        let mut pending = self.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|_, p| p.created_at >= created_before);
        Ok((before - pending.len()) as u64)
    }

    async fn upsert_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<OAuthCredential, IntegrationError> {
        let mut credentials = self.credentials.lock().unwrap();
        let key = (credential.user_id, credential.provider);

        let stored = match credentials.get(&key) {
            Some(existing) => OAuthCredential {
                id: existing.id,
                created_at: existing.created_at,
                account_email: credential
                    .account_email
                    .clone()
                    .or_else(|| existing.account_email.clone()),
                refresh_token: credential
                    .refresh_token
                    .clone()
                    .or_else(|| existing.refresh_token.clone()),
                is_active: true,
                ..credential.clone()
            },
            None => OAuthCredential {
                is_active: true,
                ..credential.clone()
            },
        };

        credentials.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<Option<OAuthCredential>, IntegrationError> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .get(&(user_id, provider))
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn update_tokens(&self, credential: &OAuthCredential) -> Result<(), IntegrationError> {
        if let Some(stored) = self
            .credentials
            .lock()
            .unwrap()
            .get_mut(&(credential.user_id, credential.provider))
        {
            stored.access_token = credential.access_token.clone();
            stored.refresh_token = credential.refresh_token.clone();
            stored.expires_at = credential.expires_at;
            stored.scope = credential.scope.clone();
            stored.token_type = credential.token_type.clone();
            stored.updated_at = credential.updated_at;
        }
        Ok(())
    }

    async fn deactivate(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, IntegrationError> {
        match self.credentials.lock().unwrap().get_mut(&(user_id, provider)) {
            Some(stored) if stored.is_active => {
                stored.is_active = false;
                stored.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OAuthCredential>, IntegrationError> {
        let mut list: Vec<OAuthCredential> = self
            .credentials
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.provider.as_str());
        Ok(list)
    }
}

/// Token endpoint with scripted answers:
/// * code `bad-code` fails the exchange, anything else yields `exchanged-access`
/// * refresh `n` yields `refreshed-access-n`, optionally rotating the refresh token
/// * the account email is always `rep@example.com`
#[derive(Default)]
pub struct FakeTokenEndpoint {
    refresh_calls: AtomicU32,
    rotate: AtomicBool,
    reject: AtomicBool,
    last_verifier: Mutex<Option<String>>,
}

impl FakeTokenEndpoint {
    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn rotate_refresh_tokens(&self, rotate: bool) {
        self.rotate.store(rotate, Ordering::SeqCst);
    }

    /// Answer refresh requests with `invalid_grant`
    pub fn reject_refresh(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn last_verifier(&self) -> Option<String> {
        self.last_verifier.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange_code(
        &self,
        _config: &OAuthProviderConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant, IntegrationError> {
        *self.last_verifier.lock().unwrap() = code_verifier.map(str::to_string);

        if code == "bad-code" {
            return Err(IntegrationError::ExchangeFailed(
                "Malformed auth code.".to_string(),
            ));
        }

        Ok(TokenGrant {
            access_token: "exchanged-access".to_string(),
            refresh_token: Some("exchanged-refresh".to_string()),
            expires_in: Some(3600),
            scope: Some("mail".to_string()),
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn refresh(
        &self,
        config: &OAuthProviderConfig,
        _refresh_token: &str,
    ) -> Result<TokenGrant, IntegrationError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Give concurrent callers a chance to pile up on the refresh lock
        tokio::task::yield_now().await;

        if self.reject.load(Ordering::SeqCst) {
            return Err(IntegrationError::RefreshRejected(config.provider));
        }

        Ok(TokenGrant {
            access_token: format!("refreshed-access-{}", n),
            refresh_token: self
                .rotate
                .load(Ordering::SeqCst)
                .then(|| format!("rotated-refresh-{}", n)),
            expires_in: Some(3600),
            scope: None,
            token_type: None,
        })
    }

    async fn fetch_account_email(
        &self,
        _config: &OAuthProviderConfig,
        _access_token: &str,
    ) -> Result<Option<String>, IntegrationError> {
        Ok(Some("rep@example.com".to_string()))
    }
}
