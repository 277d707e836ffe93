use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::auth::{dto as auth_dto, handler as auth_handler};
use crate::features::insights::{
    dtos as insights_dtos, handlers as insights_handlers, models as insights_models,
};
use crate::features::integrations::{
    dtos as integrations_dtos, handlers as integrations_handlers, models as integrations_models,
};
use crate::features::rate_limits::{
    dtos as rate_limits_dtos, handlers as rate_limits_handlers, models as rate_limits_models,
};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        auth_handler::get_me,
        // Integrations
        integrations_handlers::list_connections,
        integrations_handlers::authorize,
        integrations_handlers::callback,
        integrations_handlers::disconnect,
        integrations_handlers::create_calendar_event,
        integrations_handlers::list_calendar_events,
        integrations_handlers::list_messages,
        integrations_handlers::get_message,
        integrations_handlers::send_email,
        // Rate limits
        rate_limits_handlers::list_rate_limit_statuses,
        rate_limits_handlers::get_rate_limit_status,
        rate_limits_handlers::reset_rate_limit,
        // Insights
        insights_handlers::deal_insights,
        insights_handlers::sales_forecast,
    ),
    components(
        schemas(
            Meta,
            // Auth
            auth_dto::MeResponseDto,
            ApiResponse<auth_dto::MeResponseDto>,
            // Integrations
            integrations_models::OAuthProvider,
            integrations_models::ConnectionState,
            integrations_dtos::ConnectionSummaryDto,
            integrations_dtos::AuthorizationUrlDto,
            integrations_dtos::CreateCalendarEventDto,
            integrations_dtos::CalendarEventDto,
            integrations_dtos::MailMessageDto,
            integrations_dtos::MailMessageDetailDto,
            integrations_dtos::SendEmailDto,
            integrations_dtos::SentEmailDto,
            ApiResponse<Vec<integrations_dtos::ConnectionSummaryDto>>,
            ApiResponse<integrations_dtos::ConnectionSummaryDto>,
            ApiResponse<integrations_dtos::AuthorizationUrlDto>,
            ApiResponse<integrations_dtos::CalendarEventDto>,
            ApiResponse<Vec<integrations_dtos::CalendarEventDto>>,
            ApiResponse<Vec<integrations_dtos::MailMessageDto>>,
            ApiResponse<integrations_dtos::MailMessageDetailDto>,
            ApiResponse<integrations_dtos::SentEmailDto>,
            // Rate limits
            rate_limits_models::ApiCategory,
            rate_limits_dtos::RateLimitStatusDto,
            ApiResponse<rate_limits_dtos::RateLimitStatusDto>,
            ApiResponse<Vec<rate_limits_dtos::RateLimitStatusDto>>,
            // Insights
            insights_models::RiskLevel,
            insights_dtos::DealContextDto,
            insights_dtos::ContactContextDto,
            insights_dtos::ActivityContextDto,
            insights_dtos::DealInsightRequestDto,
            insights_dtos::ForecastRequestDto,
            insights_dtos::DealInsightsDto,
            insights_dtos::SalesForecastDto,
            ApiResponse<insights_dtos::DealInsightsDto>,
            ApiResponse<insights_dtos::SalesForecastDto>,
        )
    ),
    tags(
        (name = "auth", description = "Current user from the Supabase access token"),
        (name = "integrations", description = "Gmail, Outlook and Google Calendar connections"),
        (name = "rate-limits", description = "Outbound API rate limiter status"),
        (name = "insights", description = "Gemini-powered deal insights and forecasts"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Nexus CRM API",
        version = "0.1.0",
        description = "Integration, rate limiting and AI insight endpoints for Nexus CRM",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_feature() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/auth/me",
            "/api/integrations",
            "/api/integrations/{provider}/authorize",
            "/api/integrations/google_calendar/events",
            "/api/integrations/{provider}/messages",
            "/api/integrations/{provider}/messages/{message_id}",
            "/api/rate-limits",
            "/api/admin/rate-limits/{category}/reset",
            "/api/insights/deal",
            "/api/insights/forecast",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
    }

    #[test]
    fn test_bearer_scheme_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
