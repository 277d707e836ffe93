use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::config::OAuthConfig;
use crate::features::integrations::error::IntegrationError;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const MICROSOFT_AUTHORIZE_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_USERINFO_URL: &str = "https://graph.microsoft.com/v1.0/me";

const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

const GOOGLE_CALENDAR_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/userinfo.email",
];

const OUTLOOK_SCOPES: &[&str] = &[
    "https://graph.microsoft.com/Mail.Read",
    "https://graph.microsoft.com/Mail.Send",
    "https://graph.microsoft.com/Mail.ReadWrite",
    "https://graph.microsoft.com/User.Read",
    "offline_access",
];

/// External accounts a CRM user can connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Gmail,
    Outlook,
    GoogleCalendar,
}

/// Identity platform that issues the provider's tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    Google,
    Microsoft,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 3] = [
        OAuthProvider::Gmail,
        OAuthProvider::Outlook,
        OAuthProvider::GoogleCalendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Gmail => "gmail",
            OAuthProvider::Outlook => "outlook",
            OAuthProvider::GoogleCalendar => "google_calendar",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Gmail => "Gmail",
            OAuthProvider::Outlook => "Outlook",
            OAuthProvider::GoogleCalendar => "Google Calendar",
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            OAuthProvider::Gmail | OAuthProvider::GoogleCalendar => ProviderFamily::Google,
            OAuthProvider::Outlook => ProviderFamily::Microsoft,
        }
    }

    /// Front-end page the provider redirects back to. Each provider gets its
    /// own path so the page knows which callback route to call.
    pub fn redirect_uri(&self, redirect_base_url: &str) -> String {
        format!(
            "{}/auth/callback/{}",
            redirect_base_url.trim_end_matches('/'),
            self.as_str()
        )
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OAuthProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| IntegrationError::UnknownProvider(s.to_string()))
    }
}

/// Client registration and endpoints for one provider
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub provider: OAuthProvider,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub use_pkce: bool,
    pub extra_authorize_params: Vec<(String, String)>,
}

impl OAuthProviderConfig {
    fn google(
        provider: OAuthProvider,
        client_id: &str,
        client_secret: Option<&String>,
        redirect_base_url: &str,
        scopes: &[&str],
    ) -> Self {
        Self {
            provider,
            client_id: client_id.to_string(),
            client_secret: client_secret.cloned(),
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            redirect_uri: provider.redirect_uri(redirect_base_url),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            use_pkce: true,
            extra_authorize_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    fn microsoft(client_id: &str, client_secret: Option<&String>, redirect_base_url: &str) -> Self {
        Self {
            provider: OAuthProvider::Outlook,
            client_id: client_id.to_string(),
            client_secret: client_secret.cloned(),
            authorize_url: MICROSOFT_AUTHORIZE_URL.to_string(),
            token_url: MICROSOFT_TOKEN_URL.to_string(),
            userinfo_url: MICROSOFT_USERINFO_URL.to_string(),
            redirect_uri: OAuthProvider::Outlook.redirect_uri(redirect_base_url),
            scopes: OUTLOOK_SCOPES.iter().map(|s| s.to_string()).collect(),
            use_pkce: false,
            extra_authorize_params: vec![
                ("response_mode".to_string(), "query".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    /// Consent page URL for the given state and optional S256 challenge
    pub fn authorization_url(
        &self,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<String, IntegrationError> {
        let mut params: Vec<(String, String)> = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("redirect_uri".to_string(), self.redirect_uri.clone()),
            ("response_type".to_string(), "code".to_string()),
            ("scope".to_string(), self.scopes.join(" ")),
            ("state".to_string(), state.to_string()),
        ];

        if let Some(challenge) = code_challenge {
            params.push(("code_challenge".to_string(), challenge.to_string()));
            params.push(("code_challenge_method".to_string(), "S256".to_string()));
        }
        params.extend(self.extra_authorize_params.iter().cloned());

        reqwest::Url::parse_with_params(&self.authorize_url, &params)
            .map(|url| url.to_string())
            .map_err(|e| IntegrationError::InvalidResponse(format!("Bad authorize URL: {}", e)))
    }
}

/// Provider configurations resolved from `OAuthConfig`. Providers whose
/// client id is missing are absent.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    configs: HashMap<OAuthProvider, OAuthProviderConfig>,
}

impl ProviderRegistry {
    pub fn from_config(config: &OAuthConfig) -> Self {
        let mut registry = Self::default();
        let base = config.redirect_base_url.as_str();

        if let Some(client_id) = config.google_client_id.as_deref() {
            let secret = config.google_client_secret.as_ref();
            registry.insert(OAuthProviderConfig::google(
                OAuthProvider::Gmail,
                client_id,
                secret,
                base,
                GMAIL_SCOPES,
            ));
            registry.insert(OAuthProviderConfig::google(
                OAuthProvider::GoogleCalendar,
                client_id,
                secret,
                base,
                GOOGLE_CALENDAR_SCOPES,
            ));
        }

        if let Some(client_id) = config.microsoft_client_id.as_deref() {
            registry.insert(OAuthProviderConfig::microsoft(
                client_id,
                config.microsoft_client_secret.as_ref(),
                base,
            ));
        }

        registry
    }

    pub fn insert(&mut self, config: OAuthProviderConfig) {
        self.configs.insert(config.provider, config);
    }

    pub fn get(&self, provider: OAuthProvider) -> Result<&OAuthProviderConfig, IntegrationError> {
        self.configs
            .get(&provider)
            .ok_or(IntegrationError::ProviderNotConfigured(provider))
    }

    pub fn is_configured(&self, provider: OAuthProvider) -> bool {
        self.configs.contains_key(&provider)
    }
}
