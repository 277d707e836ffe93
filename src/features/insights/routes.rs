use std::sync::Arc;

use axum::{routing::post, Router};

use super::handlers::{deal_insights, sales_forecast};
use super::InsightService;

/// AI insight routes (any authenticated user)
pub fn routes(service: Arc<InsightService>) -> Router {
    Router::new()
        .route("/api/insights/deal", post(deal_insights))
        .route("/api/insights/forecast", post(sales_forecast))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GeminiConfig;
    use crate::features::insights::GeminiClient;
    use crate::features::rate_limits::RateLimiterRegistry;
    use crate::shared::test_helpers::with_user_auth;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Gemini without an API key, so every answer is a fallback
    fn unconfigured_service() -> Arc<InsightService> {
        let client = GeminiClient::new(&GeminiConfig {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();
        Arc::new(InsightService::new(
            Arc::new(client),
            Arc::new(RateLimiterRegistry::with_defaults()),
        ))
    }

    fn server() -> TestServer {
        TestServer::new(with_user_auth(routes(unconfigured_service()))).unwrap()
    }

    fn deal() -> Value {
        json!({
            "id": "deal-1",
            "title": "Globex expansion",
            "value": 12500.0,
            "stage": "PROPOSAL",
            "probability": 40
        })
    }

    #[tokio::test]
    async fn test_deal_insights_degrade_to_fallback() {
        let response = server()
            .post("/api/insights/deal")
            .json(&json!({
                "deal": deal(),
                "contact": {"name": "Hank Scorpio"},
                "activities": []
            }))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["is_llm_success"], false);
        assert_eq!(
            body["data"]["summary"],
            "Unable to generate insights at this time."
        );
        assert!(body["data"]["risk_level"].is_null());
    }

    #[tokio::test]
    async fn test_forecast_degrades_to_fixed_message() {
        let response = server()
            .post("/api/insights/forecast")
            .json(&json!({"deals": [deal()]}))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(
            body["data"]["summary"],
            "Unable to generate forecast at this time."
        );
    }

    #[tokio::test]
    async fn test_invalid_deal_is_rejected() {
        let mut bad = deal();
        bad["probability"] = json!(150);

        server()
            .post("/api/insights/deal")
            .json(&json!({"deal": bad, "contact": {"name": "Hank"}}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_requires_authentication() {
        let server = TestServer::new(routes(unconfigured_service())).unwrap();

        server
            .post("/api/insights/forecast")
            .json(&json!({"deals": []}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
