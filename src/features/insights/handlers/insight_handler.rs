use std::sync::Arc;

use axum::{extract::State, Json};

use crate::core::error::Result;
use crate::core::extractor::ValidatedJson;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::insights::dtos::{
    DealInsightRequestDto, DealInsightsDto, ForecastRequestDto, SalesForecastDto,
};
use crate::features::insights::InsightService;
use crate::shared::types::ApiResponse;

/// Summary, risk and next steps for one deal
#[utoipa::path(
    post,
    path = "/api/insights/deal",
    request_body = DealInsightRequestDto,
    responses(
        (status = 200, description = "Insights, or a fallback when the model is unavailable", body = ApiResponse<DealInsightsDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "insights",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn deal_insights(
    user: AuthenticatedUser,
    State(service): State<Arc<InsightService>>,
    ValidatedJson(dto): ValidatedJson<DealInsightRequestDto>,
) -> Result<Json<ApiResponse<DealInsightsDto>>> {
    tracing::debug!(user_id = %user.user_id, deal_id = %dto.deal.id, "Deal insights requested");

    let insights = service.deal_insights(&dto).await;

    Ok(Json(ApiResponse::success(Some(insights.into()), None, None)))
}

/// Executive summary of the pipeline
#[utoipa::path(
    post,
    path = "/api/insights/forecast",
    request_body = ForecastRequestDto,
    responses(
        (status = 200, description = "Forecast, or a fixed message when the model is unavailable", body = ApiResponse<SalesForecastDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "insights",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sales_forecast(
    _user: AuthenticatedUser,
    State(service): State<Arc<InsightService>>,
    ValidatedJson(dto): ValidatedJson<ForecastRequestDto>,
) -> Result<Json<ApiResponse<SalesForecastDto>>> {
    let forecast = service.sales_forecast(&dto.deals).await;

    Ok(Json(ApiResponse::success(Some(forecast.into()), None, None)))
}
