use std::sync::Arc;

use uuid::Uuid;

use super::token_manager::TokenManager;
use crate::features::integrations::clients::{GmailClient, GoogleCalendarClient, OutlookClient};
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{
    CalendarEvent, CalendarEventPage, MailMessageDetail, MailPage, NewCalendarEvent,
    OAuthProvider, OutgoingEmail, SentEmail,
};
use crate::features::rate_limits::{ApiCategory, RateLimiterRegistry};
use crate::shared::retry::RetryPolicy;

/// Mailbox client selected by provider
#[derive(Clone)]
enum Mailbox {
    Gmail(GmailClient),
    Outlook(OutlookClient),
}

impl Mailbox {
    async fn list_messages(
        &self,
        access_token: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MailPage, IntegrationError> {
        match self {
            Mailbox::Gmail(client) => {
                client
                    .list_messages(access_token, page_size, page_token)
                    .await
            }
            Mailbox::Outlook(client) => {
                client
                    .list_messages(access_token, page_size, page_token)
                    .await
            }
        }
    }

    async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MailMessageDetail, IntegrationError> {
        match self {
            Mailbox::Gmail(client) => client.get_message(access_token, message_id).await,
            Mailbox::Outlook(client) => client.get_message(access_token, message_id).await,
        }
    }

    async fn send_message(
        &self,
        access_token: &str,
        email: &OutgoingEmail,
    ) -> Result<SentEmail, IntegrationError> {
        match self {
            Mailbox::Gmail(client) => client.send_message(access_token, email).await,
            Mailbox::Outlook(client) => client.send_message(access_token, email).await,
        }
    }
}

/// Calls provider APIs on behalf of a CRM user.
///
/// Each call takes one slot of its category's limiter. Inside that slot the
/// request runs with a valid access token, transient failures are retried
/// with backoff and a rejected token is refreshed once.
pub struct ProviderApiService {
    tokens: Arc<TokenManager>,
    rate_limiters: Arc<RateLimiterRegistry>,
    retry_policy: RetryPolicy,
    calendar: GoogleCalendarClient,
    gmail: GmailClient,
    outlook: OutlookClient,
}

impl ProviderApiService {
    pub fn new(
        tokens: Arc<TokenManager>,
        rate_limiters: Arc<RateLimiterRegistry>,
        retry_policy: RetryPolicy,
        calendar: GoogleCalendarClient,
        gmail: GmailClient,
        outlook: OutlookClient,
    ) -> Self {
        Self {
            tokens,
            rate_limiters,
            retry_policy,
            calendar,
            gmail,
            outlook,
        }
    }

    pub async fn create_calendar_event(
        &self,
        user_id: Uuid,
        event: NewCalendarEvent,
    ) -> Result<CalendarEvent, IntegrationError> {
        let tokens = Arc::clone(&self.tokens);
        let client = self.calendar.clone();
        let policy = self.retry_policy;

        self.rate_limiters
            .execute(ApiCategory::Api, move || async move {
                tokens
                    .with_access_token(user_id, OAuthProvider::GoogleCalendar, |token| {
                        let client = client.clone();
                        let event = event.clone();
                        async move {
                            policy
                                .with_backoff("google_calendar.create_event", || {
                                    client.create_event(&token, &event)
                                })
                                .await
                        }
                    })
                    .await
            })
            .await
    }

    pub async fn list_calendar_events(
        &self,
        user_id: Uuid,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<CalendarEventPage, IntegrationError> {
        let tokens = Arc::clone(&self.tokens);
        let client = self.calendar.clone();
        let policy = self.retry_policy;

        self.rate_limiters
            .execute(ApiCategory::Api, move || async move {
                tokens
                    .with_access_token(user_id, OAuthProvider::GoogleCalendar, |token| {
                        let client = client.clone();
                        let page_token = page_token.clone();
                        async move {
                            policy
                                .with_backoff("google_calendar.list_events", || {
                                    client.list_upcoming_events(
                                        &token,
                                        max_results,
                                        page_token.as_deref(),
                                    )
                                })
                                .await
                        }
                    })
                    .await
            })
            .await
    }

    fn mailbox(
        &self,
        provider: OAuthProvider,
        operation: &'static str,
    ) -> Result<Mailbox, IntegrationError> {
        match provider {
            OAuthProvider::Gmail => Ok(Mailbox::Gmail(self.gmail.clone())),
            OAuthProvider::Outlook => Ok(Mailbox::Outlook(self.outlook.clone())),
            OAuthProvider::GoogleCalendar => {
                Err(IntegrationError::UnsupportedOperation(provider, operation))
            }
        }
    }

    /// One page of the connected mailbox. Only mailbox providers qualify.
    pub async fn list_messages(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MailPage, IntegrationError> {
        let mailbox = self.mailbox(provider, "mail listing")?;
        let tokens = Arc::clone(&self.tokens);
        let policy = self.retry_policy;
        let label = format!("{}.list_messages", provider);

        self.rate_limiters
            .execute(ApiCategory::Email, move || async move {
                tokens
                    .with_access_token(user_id, provider, |token| {
                        let mailbox = mailbox.clone();
                        let page_token = page_token.clone();
                        let label = label.clone();
                        async move {
                            policy
                                .with_backoff(&label, || {
                                    mailbox.list_messages(&token, page_size, page_token.as_deref())
                                })
                                .await
                        }
                    })
                    .await
            })
            .await
    }

    /// One message with recipients and decoded bodies
    pub async fn get_message(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        message_id: String,
    ) -> Result<MailMessageDetail, IntegrationError> {
        let mailbox = self.mailbox(provider, "mail reading")?;
        let tokens = Arc::clone(&self.tokens);
        let policy = self.retry_policy;
        let label = format!("{}.get_message", provider);

        self.rate_limiters
            .execute(ApiCategory::Email, move || async move {
                tokens
                    .with_access_token(user_id, provider, |token| {
                        let mailbox = mailbox.clone();
                        let message_id = message_id.clone();
                        let label = label.clone();
                        async move {
                            policy
                                .with_backoff(&label, || mailbox.get_message(&token, &message_id))
                                .await
                        }
                    })
                    .await
            })
            .await
    }

    /// Sends from the connected mailbox. A rejected token is refreshed once,
    /// but server errors are not retried since the message may already be out.
    pub async fn send_email(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
        email: OutgoingEmail,
    ) -> Result<SentEmail, IntegrationError> {
        let mailbox = self.mailbox(provider, "sending mail")?;
        let tokens = Arc::clone(&self.tokens);

        let sent = self
            .rate_limiters
            .execute(ApiCategory::Email, move || async move {
                tokens
                    .with_access_token(user_id, provider, |token| {
                        let mailbox = mailbox.clone();
                        let email = email.clone();
                        async move { mailbox.send_message(&token, &email).await }
                    })
                    .await
            })
            .await?;

        tracing::info!(%user_id, %provider, message_id = ?sent.id, "Email sent");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::integrations::models::{OAuthCredential, OAuthProviderConfig, ProviderRegistry};
    use crate::features::integrations::services::IntegrationStore;
    use crate::features::rate_limits::models::RateLimitConfig;
    use crate::core::config::RateLimitSettings;
    use crate::shared::test_helpers::{
        spawn_mock_server, FakeTokenEndpoint, InMemoryIntegrationStore,
    };
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn provider_config(provider: OAuthProvider) -> OAuthProviderConfig {
        OAuthProviderConfig {
            provider,
            client_id: "client".to_string(),
            client_secret: None,
            authorize_url: "https://auth.example.com/authorize".to_string(),
            token_url: "https://auth.example.com/token".to_string(),
            userinfo_url: "https://auth.example.com/me".to_string(),
            redirect_uri: "https://crm.example.com/auth/callback".to_string(),
            scopes: Vec::new(),
            use_pkce: false,
            extra_authorize_params: Vec::new(),
        }
    }

    fn credential(user_id: Uuid, provider: OAuthProvider) -> OAuthCredential {
        let now = Utc::now();
        OAuthCredential {
            id: Uuid::now_v7(),
            user_id,
            provider,
            account_email: None,
            access_token: "stored-access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: now + ChronoDuration::hours(1),
            scope: None,
            token_type: "Bearer".to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Gmail mock: the stored token is stale, the first request with a
    /// refreshed token hits a 503, the next one succeeds
    async fn gmail_mock(hits: Arc<AtomicU32>) -> String {
        let handler = move |headers: HeaderMap| {
            let hits = Arc::clone(&hits);
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer stored-access" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": {"message": "backend error"}})),
                    );
                }
                (
                    StatusCode::OK,
                    Json::<Value>(json!({
                        "messages": [{"id": "m1", "threadId": "t1"}],
                        "nextPageToken": "next"
                    })),
                )
            }
        };
        spawn_mock_server(Router::new().route("/users/me/messages", get(handler))).await
    }

    async fn service(
        gmail_base: &str,
        settings: RateLimitSettings,
    ) -> (ProviderApiService, Arc<FakeTokenEndpoint>, Uuid) {
        let mut providers = ProviderRegistry::default();
        for provider in OAuthProvider::ALL {
            providers.insert(provider_config(provider));
        }
        let store = Arc::new(InMemoryIntegrationStore::default());
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let user_id = Uuid::new_v4();
        store
            .upsert_credential(&credential(user_id, OAuthProvider::Gmail))
            .await
            .unwrap();

        let tokens = Arc::new(TokenManager::new(providers, store, endpoint.clone()));
        let http = reqwest::Client::new();
        let service = ProviderApiService::new(
            tokens,
            Arc::new(RateLimiterRegistry::new(&settings)),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            GoogleCalendarClient::new(http.clone(), "http://127.0.0.1:9"),
            GmailClient::new(http.clone(), gmail_base),
            OutlookClient::new(http, "http://127.0.0.1:9"),
        );
        (service, endpoint, user_id)
    }

    #[tokio::test]
    async fn test_list_messages_refreshes_and_retries_transient_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = gmail_mock(hits.clone()).await;
        let (service, endpoint, user_id) = service(&base, RateLimitSettings::default()).await;

        let page = service
            .list_messages(user_id, OAuthProvider::Gmail, 10, None)
            .await
            .unwrap();

        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, "m1");
        assert_eq!(page.next_page_token.as_deref(), Some("next"));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_one_logical_call_takes_one_limiter_slot() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = gmail_mock(hits).await;
        let mut categories = HashMap::new();
        categories.insert(
            ApiCategory::Email,
            RateLimitConfig::new(1, Duration::from_secs(60), false).unwrap(),
        );
        let (service, _, user_id) = service(&base, RateLimitSettings { categories }).await;

        service
            .list_messages(user_id, OAuthProvider::Gmail, 10, None)
            .await
            .unwrap();

        let err = service
            .list_messages(user_id, OAuthProvider::Gmail, 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_calendar_provider_has_no_mailbox() {
        let (service, _, user_id) =
            service("http://127.0.0.1:9", RateLimitSettings::default()).await;

        let err = service
            .list_messages(user_id, OAuthProvider::GoogleCalendar, 10, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IntegrationError::UnsupportedOperation(OAuthProvider::GoogleCalendar, _)
        ));
    }

    #[tokio::test]
    async fn test_calendar_requires_connection() {
        let (service, _, user_id) =
            service("http://127.0.0.1:9", RateLimitSettings::default()).await;

        let err = service
            .list_calendar_events(user_id, 5, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IntegrationError::NotConnected(OAuthProvider::GoogleCalendar)
        ));
    }

    fn outgoing() -> OutgoingEmail {
        OutgoingEmail {
            to: vec!["dana@acme.test".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "Renewal".to_string(),
            body: "Hi Dana".to_string(),
            is_html: false,
            thread_id: None,
        }
    }

    /// Gmail send endpoint that rejects the stored token and answers
    /// `status` to every refreshed one
    async fn gmail_send_mock(status: StatusCode, hits: Arc<AtomicU32>) -> String {
        let handler = move |headers: HeaderMap| {
            let hits = Arc::clone(&hits);
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer stored-access" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                hits.fetch_add(1, Ordering::SeqCst);
                if status.is_success() {
                    (status, Json(json!({"id": "sent-1", "threadId": "t1"})))
                } else {
                    (status, Json(json!({"error": {"message": "backend error"}})))
                }
            }
        };
        spawn_mock_server(Router::new().route("/users/me/messages/send", post(handler))).await
    }

    #[tokio::test]
    async fn test_send_email_refreshes_rejected_token() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = gmail_send_mock(StatusCode::OK, hits.clone()).await;
        let (service, endpoint, user_id) = service(&base, RateLimitSettings::default()).await;

        let sent = service
            .send_email(user_id, OAuthProvider::Gmail, outgoing())
            .await
            .unwrap();

        assert_eq!(sent.id.as_deref(), Some("sent-1"));
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            service.rate_limiters.status(ApiCategory::Email).await.requests_in_window,
            1
        );
    }

    #[tokio::test]
    async fn test_send_email_is_not_retried_on_server_error() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = gmail_send_mock(StatusCode::SERVICE_UNAVAILABLE, hits.clone()).await;
        let (service, _, user_id) = service(&base, RateLimitSettings::default()).await;

        let err = service
            .send_email(user_id, OAuthProvider::Gmail, outgoing())
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::UpstreamError { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calendar_provider_cannot_send() {
        let (service, _, user_id) =
            service("http://127.0.0.1:9", RateLimitSettings::default()).await;

        let err = service
            .send_email(user_id, OAuthProvider::GoogleCalendar, outgoing())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IntegrationError::UnsupportedOperation(OAuthProvider::GoogleCalendar, "sending mail")
        ));
    }
}
