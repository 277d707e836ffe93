use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{get_rate_limit_status, list_rate_limit_statuses, reset_rate_limit};
use super::services::RateLimiterRegistry;

/// Limiter status routes (any authenticated user)
pub fn routes(registry: Arc<RateLimiterRegistry>) -> Router {
    Router::new()
        .route("/api/rate-limits", get(list_rate_limit_statuses))
        .route("/api/rate-limits/{category}", get(get_rate_limit_status))
        .with_state(registry)
}

/// Administrative limiter routes (admin role)
pub fn admin_routes(registry: Arc<RateLimiterRegistry>) -> Router {
    Router::new()
        .route(
            "/api/admin/rate-limits/{category}/reset",
            post(reset_rate_limit),
        )
        .with_state(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rate_limits::error::RateLimitError;
    use crate::features::rate_limits::models::ApiCategory;
    use crate::shared::test_helpers::{with_admin_auth, with_user_auth};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;

    fn router(registry: Arc<RateLimiterRegistry>) -> Router {
        routes(registry.clone()).merge(admin_routes(registry))
    }

    #[tokio::test]
    async fn test_list_statuses() {
        let registry = Arc::new(RateLimiterRegistry::with_defaults());
        let server = TestServer::new(with_user_auth(router(registry))).unwrap();

        let response = server.get("/api/rate-limits").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
        assert_eq!(body["data"][4]["category"], "email");
        assert_eq!(body["data"][4]["window_ms"], 3_600_000);
    }

    #[tokio::test]
    async fn test_unknown_category_is_not_found() {
        let registry = Arc::new(RateLimiterRegistry::with_defaults());
        let server = TestServer::new(with_user_auth(router(registry))).unwrap();

        let response = server.get("/api/rate-limits/bulk").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_requires_admin() {
        let registry = Arc::new(RateLimiterRegistry::with_defaults());
        let server = TestServer::new(with_user_auth(router(registry))).unwrap();

        let response = server.post("/api/admin/rate-limits/ai/reset").await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_reset_clears_window() {
        let registry = Arc::new(RateLimiterRegistry::with_defaults());
        registry
            .execute(ApiCategory::Ai, || async { Ok::<_, RateLimitError>(()) })
            .await
            .unwrap();

        let server = TestServer::new(with_admin_auth(router(registry.clone()))).unwrap();
        let response = server.post("/api/admin/rate-limits/ai/reset").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["data"]["requests_in_window"], 0);
        assert_eq!(
            registry.status(ApiCategory::Ai).await.requests_in_window,
            0
        );
    }
}
