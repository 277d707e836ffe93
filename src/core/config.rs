use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::features::rate_limits::models::{ApiCategory, RateLimitConfig, DEFAULT_QUEUE_TIMEOUT};
use crate::shared::retry::RetryPolicy;

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub swagger: SwaggerConfig,
    pub oauth: OAuthConfig,
    pub gemini: GeminiConfig,
    pub rate_limits: RateLimitSettings,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub frontend_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Supabase Auth settings used to validate the CRM user's access token
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub issuer: String,
    pub jwks_url: String,
    pub audience: String,
    pub jwks_cache_ttl: Duration,
    pub jwt_leeway: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// OAuth client registrations for the external integrations.
///
/// A provider family without a client id is left unconfigured and its
/// endpoints answer with a descriptive error instead of failing startup.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub microsoft_client_id: Option<String>,
    pub microsoft_client_secret: Option<String>,
    /// Origin the provider redirects back to (the CRM front end)
    pub redirect_base_url: String,
    /// Access tokens this close to expiry are refreshed before use
    pub refresh_margin_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Per-category limiter configuration, validated at load time. Categories
/// missing from the map use their built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct RateLimitSettings {
    pub categories: HashMap<ApiCategory, RateLimitConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let app = AppConfig::from_env()?;
        let oauth = OAuthConfig::from_env(&app.frontend_url)?;

        Ok(Config {
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
            gemini: GeminiConfig::from_env()?,
            rate_limits: RateLimitSettings::from_env()?,
            retry: retry_policy_from_env()?,
            oauth,
            app,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool, String> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(format!("{} must be true or false", key)),
        },
        Err(_) => Ok(default),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            frontend_url,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Self {
            url,
            max_connections: parse_env("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: parse_env(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: parse_env("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: parse_env("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl AuthConfig {
    const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 3600; // 1 hour
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, String> {
        let supabase_url = env::var("SUPABASE_URL")
            .map_err(|_| "SUPABASE_URL environment variable is required".to_string())?;
        let issuer = format!("{}/auth/v1", supabase_url.trim_end_matches('/'));
        let jwks_url = format!("{}/.well-known/jwks.json", issuer);

        let audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());

        let jwks_cache_ttl_secs = parse_env("JWKS_CACHE_TTL", Self::DEFAULT_JWKS_CACHE_TTL_SECS)?;
        let jwt_leeway_secs = parse_env("JWT_LEEWAY", Self::DEFAULT_JWT_LEEWAY_SECS)?;

        Ok(Self {
            issuer,
            jwks_url,
            audience,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = non_empty_env("SWAGGER_USERNAME");
        let password = non_empty_env("SWAGGER_PASSWORD");
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Nexus CRM API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION").unwrap_or_else(|_| {
            "Integration, rate limiting and AI insight endpoints for Nexus CRM".to_string()
        });

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

impl OAuthConfig {
    const DEFAULT_REFRESH_MARGIN_MINUTES: i64 = 5;

    pub fn from_env(frontend_url: &str) -> Result<Self, String> {
        let redirect_base_url = non_empty_env("OAUTH_REDIRECT_BASE_URL")
            .unwrap_or_else(|| frontend_url.to_string())
            .trim_end_matches('/')
            .to_string();

        let refresh_margin_minutes = parse_env(
            "OAUTH_REFRESH_MARGIN_MINUTES",
            Self::DEFAULT_REFRESH_MARGIN_MINUTES,
        )?;
        if refresh_margin_minutes < 0 {
            return Err("OAUTH_REFRESH_MARGIN_MINUTES must not be negative".to_string());
        }

        Ok(Self {
            google_client_id: non_empty_env("GOOGLE_CLIENT_ID"),
            google_client_secret: non_empty_env("GOOGLE_CLIENT_SECRET"),
            microsoft_client_id: non_empty_env("MICROSOFT_CLIENT_ID"),
            microsoft_client_secret: non_empty_env("MICROSOFT_CLIENT_SECRET"),
            redirect_base_url,
            refresh_margin_minutes,
        })
    }
}

impl GeminiConfig {
    const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";
    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Result<Self, String> {
        let timeout_secs = parse_env("GEMINI_TIMEOUT_SECS", Self::DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            api_key: non_empty_env("GEMINI_API_KEY"),
            model: non_empty_env("GEMINI_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: non_empty_env("GEMINI_BASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl RateLimitSettings {
    /// Reads `RATE_LIMIT_<CATEGORY>_MAX_REQUESTS`, `_WINDOW_SECS` and `_QUEUE`
    /// on top of the per-category defaults. `RATE_LIMIT_QUEUE_TIMEOUT_SECS`
    /// bounds the queue wait of every category and defaults to
    /// `DEFAULT_QUEUE_TIMEOUT`.
    pub fn from_env() -> Result<Self, String> {
        let queue_timeout = Duration::from_secs(parse_env(
            "RATE_LIMIT_QUEUE_TIMEOUT_SECS",
            DEFAULT_QUEUE_TIMEOUT.as_secs(),
        )?);

        let mut categories = HashMap::new();
        for category in ApiCategory::ALL {
            let defaults = category.default_config();
            let prefix = format!("RATE_LIMIT_{}", category.as_str().to_uppercase());

            let max_requests = parse_env(
                &format!("{}_MAX_REQUESTS", prefix),
                defaults.max_requests(),
            )?;
            let window_secs = parse_env(
                &format!("{}_WINDOW_SECS", prefix),
                defaults.window().as_secs(),
            )?;
            let queue_enabled =
                parse_bool_env(&format!("{}_QUEUE", prefix), defaults.queue_enabled())?;

            let config =
                RateLimitConfig::new(max_requests, Duration::from_secs(window_secs), queue_enabled)
                    .map_err(|e| format!("{}: {}", prefix, e))?
                    .with_queue_timeout(queue_timeout)
                    .map_err(|e| format!("RATE_LIMIT_QUEUE_TIMEOUT_SECS: {}", e))?;

            categories.insert(category, config);
        }

        Ok(Self { categories })
    }
}

fn retry_policy_from_env() -> Result<RetryPolicy, String> {
    let defaults = RetryPolicy::default();

    Ok(RetryPolicy {
        max_attempts: parse_env("API_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
        initial_backoff_ms: parse_env("API_RETRY_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
        max_backoff_ms: parse_env("API_RETRY_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
    })
}
