use async_trait::async_trait;
use serde::Deserialize;

use super::http::{error_message, oauth_error_code};
use crate::features::integrations::error::IntegrationError;
use crate::features::integrations::models::{OAuthProviderConfig, ProviderFamily, TokenGrant};

/// OAuth token and identity endpoints of a provider
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// `authorization_code` grant
    async fn exchange_code(
        &self,
        config: &OAuthProviderConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant, IntegrationError>;

    /// `refresh_token` grant. `invalid_grant` yields `RefreshRejected`.
    async fn refresh(
        &self,
        config: &OAuthProviderConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, IntegrationError>;

    async fn fetch_account_email(
        &self,
        config: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<Option<String>, IntegrationError>;
}

/// Google userinfo exposes `email`; Graph `/me` exposes `mail`, which is
/// empty for some personal accounts, so `userPrincipalName` backs it up
#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(rename = "userPrincipalName", default)]
    user_principal_name: Option<String>,
}

impl UserInfo {
    fn into_email(self) -> Option<String> {
        self.email
            .or(self.mail)
            .or(self.user_principal_name)
            .filter(|e| !e.is_empty())
    }
}

pub struct HttpTokenEndpoint {
    client: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post_form(
        &self,
        config: &OAuthProviderConfig,
        form: &[(&str, &str)],
    ) -> Result<Result<TokenGrant, (reqwest::StatusCode, String)>, IntegrationError> {
        let mut params: Vec<(&str, &str)> = vec![("client_id", config.client_id.as_str())];
        if let Some(secret) = config.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }
        params.extend_from_slice(form);

        let response = self
            .client
            .post(&config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(Err((status, body)));
        }

        let grant = response
            .json::<TokenGrant>()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
        Ok(Ok(grant))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        config: &OAuthProviderConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant, IntegrationError> {
        tracing::debug!(provider = %config.provider, "Exchanging authorization code");

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        match self.post_form(config, &form).await? {
            Ok(grant) => Ok(grant),
            Err((status, body)) => {
                tracing::warn!(provider = %config.provider, %status, "Code exchange rejected");
                Err(IntegrationError::ExchangeFailed(error_message(&body)))
            }
        }
    }

    async fn refresh(
        &self,
        config: &OAuthProviderConfig,
        refresh_token: &str,
    ) -> Result<TokenGrant, IntegrationError> {
        let scope = config.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        // Microsoft issues the new access token for the scopes requested here
        if config.provider.family() == ProviderFamily::Microsoft {
            form.push(("scope", scope.as_str()));
        }

        match self.post_form(config, &form).await? {
            Ok(grant) => Ok(grant),
            Err((status, body)) => {
                if oauth_error_code(&body).as_deref() == Some("invalid_grant") {
                    return Err(IntegrationError::RefreshRejected(config.provider));
                }
                Err(IntegrationError::RefreshFailed(format!(
                    "HTTP {} - {}",
                    status,
                    error_message(&body)
                )))
            }
        }
    }

    async fn fetch_account_email(
        &self,
        config: &OAuthProviderConfig,
        access_token: &str,
    ) -> Result<Option<String>, IntegrationError> {
        let response = self
            .client
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let info: UserInfo = super::http::read_json(response).await?;
        Ok(info.into_email())
    }
}
