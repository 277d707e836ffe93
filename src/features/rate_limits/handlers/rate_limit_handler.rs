use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::error::{AppError, Result};
use crate::features::auth::guards::RequireAdmin;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::rate_limits::dtos::RateLimitStatusDto;
use crate::features::rate_limits::models::ApiCategory;
use crate::features::rate_limits::services::RateLimiterRegistry;
use crate::shared::types::{ApiResponse, Meta};

fn parse_category(raw: &str) -> Result<ApiCategory> {
    raw.parse::<ApiCategory>().map_err(AppError::NotFound)
}

/// Status of every rate limiter
#[utoipa::path(
    get,
    path = "/api/rate-limits",
    responses(
        (status = 200, description = "Status of each limiter", body = ApiResponse<Vec<RateLimitStatusDto>>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "rate-limits",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_rate_limit_statuses(
    _user: AuthenticatedUser,
    State(registry): State<Arc<RateLimiterRegistry>>,
) -> Result<Json<ApiResponse<Vec<RateLimitStatusDto>>>> {
    let statuses: Vec<RateLimitStatusDto> = registry
        .statuses()
        .await
        .into_iter()
        .map(Into::into)
        .collect();
    let meta = Meta::total(statuses.len());

    Ok(Json(ApiResponse::success(Some(statuses), None, Some(meta))))
}

/// Status of one rate limiter
#[utoipa::path(
    get,
    path = "/api/rate-limits/{category}",
    params(
        ("category" = String, Path, description = "One of api, search, upload, ai, email")
    ),
    responses(
        (status = 200, description = "Limiter status", body = ApiResponse<RateLimitStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown category")
    ),
    tag = "rate-limits",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_rate_limit_status(
    _user: AuthenticatedUser,
    State(registry): State<Arc<RateLimiterRegistry>>,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse<RateLimitStatusDto>>> {
    let category = parse_category(&category)?;
    let status = registry.status(category).await;

    Ok(Json(ApiResponse::success(Some(status.into()), None, None)))
}

/// Clear a limiter's window and queue. Queued callers are released with an error.
#[utoipa::path(
    post,
    path = "/api/admin/rate-limits/{category}/reset",
    params(
        ("category" = String, Path, description = "One of api, search, upload, ai, email")
    ),
    responses(
        (status = 200, description = "Limiter reset", body = ApiResponse<RateLimitStatusDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - Admin access required"),
        (status = 404, description = "Unknown category")
    ),
    tag = "rate-limits",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn reset_rate_limit(
    RequireAdmin(user): RequireAdmin,
    State(registry): State<Arc<RateLimiterRegistry>>,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse<RateLimitStatusDto>>> {
    let category = parse_category(&category)?;
    registry.reset(category).await;

    tracing::info!("Rate limiter '{}' reset by {}", category, user.user_id);

    let status = registry.status(category).await;
    Ok(Json(ApiResponse::success(
        Some(status.into()),
        Some(format!("Rate limiter '{}' reset", category)),
        None,
    )))
}
