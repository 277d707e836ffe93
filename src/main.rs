mod core;
mod features;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::auth;
use crate::features::auth::routes as auth_routes;
use crate::features::insights::{routes as insights_routes, GeminiClient, InsightService};
use crate::features::integrations::clients::{
    GmailClient, GoogleCalendarClient, HttpTokenEndpoint, OutlookClient, GMAIL_BASE_URL,
    GOOGLE_CALENDAR_BASE_URL, GRAPH_BASE_URL,
};
use crate::features::integrations::models::{OAuthProvider, ProviderRegistry};
use crate::features::integrations::services::{
    PgIntegrationStore, ProviderApiService, TokenManager,
};
use crate::features::integrations::{routes as integrations_routes, IntegrationsState};
use crate::features::rate_limits::{routes as rate_limits_routes, RateLimiterRegistry};
use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Timeout for calls to the provider APIs and token endpoints
const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );
    tracing::info!("Configuration loaded successfully");

    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    // Supabase access tokens
    let jwks_client = Arc::new(auth::JwksClient::new(
        &config.auth.jwks_url,
        config.auth.jwks_cache_ttl,
    ));
    let jwt_validator = Arc::new(auth::JwtValidator::new(
        jwks_client,
        config.auth.issuer.clone(),
        config.auth.audience.clone(),
        config.auth.jwt_leeway,
    ));
    tracing::info!("Auth configuration initialized");

    // One limiter per outbound API category, shared by every feature
    let rate_limiters = Arc::new(RateLimiterRegistry::new(&config.rate_limits));
    for status in rate_limiters.statuses().await {
        tracing::info!(
            category = %status.category,
            max_requests = status.max_requests,
            window_ms = status.window.as_millis() as u64,
            "Rate limiter configured"
        );
    }

    // Integrations
    let http = reqwest::Client::builder()
        .timeout(PROVIDER_HTTP_TIMEOUT)
        .build()?;
    let providers = ProviderRegistry::from_config(&config.oauth);
    if !providers.is_configured(OAuthProvider::Gmail) {
        tracing::warn!("Google OAuth client not configured; Gmail and Google Calendar disabled");
    }
    if !providers.is_configured(OAuthProvider::Outlook) {
        tracing::warn!("Microsoft OAuth client not configured; Outlook disabled");
    }
    let token_manager = Arc::new(
        TokenManager::new(
            providers,
            Arc::new(PgIntegrationStore::new(pool.clone())),
            Arc::new(HttpTokenEndpoint::new(http.clone())),
        )
        .with_refresh_margin(chrono::Duration::minutes(
            config.oauth.refresh_margin_minutes,
        )),
    );
    let provider_api = Arc::new(ProviderApiService::new(
        Arc::clone(&token_manager),
        Arc::clone(&rate_limiters),
        config.retry,
        GoogleCalendarClient::new(http.clone(), GOOGLE_CALENDAR_BASE_URL),
        GmailClient::new(http.clone(), GMAIL_BASE_URL),
        OutlookClient::new(http, GRAPH_BASE_URL),
    ));
    tracing::info!("Integration services initialized");

    // Insights
    let gemini_client = GeminiClient::new(&config.gemini)
        .map_err(|e| anyhow::anyhow!("Failed to create Gemini client: {}", e))?;
    if config.gemini.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; insights will return fallback answers");
    }
    let insight_service = Arc::new(InsightService::new(
        Arc::new(gemini_client),
        Arc::clone(&rate_limiters),
    ));
    tracing::info!("Insight service initialized (model: {})", config.gemini.model);

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn_with_state(
                Arc::new(credentials),
                middleware::basic_auth_middleware,
            ))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    // Protected routes (require a Supabase access token)
    let protected_routes = Router::new()
        .merge(auth_routes::protected_routes())
        .merge(integrations_routes::routes(IntegrationsState {
            tokens: token_manager,
            api: provider_api,
        }))
        .merge(insights_routes::routes(insight_service))
        .merge(rate_limits_routes::routes(Arc::clone(&rate_limiters)))
        .merge(rate_limits_routes::admin_routes(rate_limiters))
        .route_layer(from_fn_with_state(
            jwt_validator.clone(),
            middleware::auth_middleware,
        ));

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(protected_routes)
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app).await?;

    Ok(())
}
