use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};

use crate::core::error::{AppError, Result};
use crate::core::extractor::ValidatedJson;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::integrations::dtos::{
    AuthorizationUrlDto, AuthorizeMode, AuthorizeQuery, CalendarEventDto, CalendarEventsQuery,
    CallbackQuery, ConnectionSummaryDto, CreateCalendarEventDto, MailMessageDetailDto,
    MailMessageDto, MessagesQuery, SendEmailDto, SentEmailDto,
};
use crate::features::integrations::models::OAuthProvider;
use crate::features::integrations::services::{ProviderApiService, TokenManager};
use crate::shared::types::{ApiResponse, Meta};

/// Services behind the integration routes
#[derive(Clone)]
pub struct IntegrationsState {
    pub tokens: Arc<TokenManager>,
    pub api: Arc<ProviderApiService>,
}

fn parse_provider(raw: &str) -> Result<OAuthProvider> {
    Ok(raw.parse::<OAuthProvider>()?)
}

/// Connection state of every provider for the current user
#[utoipa::path(
    get,
    path = "/api/integrations",
    responses(
        (status = 200, description = "One entry per provider", body = ApiResponse<Vec<ConnectionSummaryDto>>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_connections(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
) -> Result<Json<ApiResponse<Vec<ConnectionSummaryDto>>>> {
    let connections: Vec<ConnectionSummaryDto> = state
        .tokens
        .connections(user.user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    let meta = Meta::total(connections.len());

    Ok(Json(ApiResponse::success(Some(connections), None, Some(meta))))
}

/// Start connecting a provider account
#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/authorize",
    params(
        ("provider" = String, Path, description = "One of gmail, outlook, google_calendar"),
        AuthorizeQuery
    ),
    responses(
        (status = 303, description = "Redirect to the provider's consent page"),
        (status = 200, description = "Consent URL (mode=json)", body = ApiResponse<AuthorizationUrlDto>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown provider"),
        (status = 503, description = "Provider not configured")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn authorize(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response> {
    let provider = parse_provider(&provider)?;
    let request = state.tokens.initiate_auth(user.user_id, provider).await?;

    Ok(match query.mode {
        AuthorizeMode::Redirect => Redirect::to(&request.authorization_url).into_response(),
        AuthorizeMode::Json => Json(ApiResponse::success(
            Some(AuthorizationUrlDto {
                provider: request.provider,
                authorization_url: request.authorization_url,
            }),
            None,
            None,
        ))
        .into_response(),
    })
}

/// Complete the authorization with the code the provider redirected back with
#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/callback",
    params(
        ("provider" = String, Path, description = "One of gmail, outlook, google_calendar"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "Provider connected", body = ApiResponse<ConnectionSummaryDto>),
        (status = 400, description = "Invalid state, declined consent or failed code exchange"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown provider")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn callback(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ApiResponse<ConnectionSummaryDto>>> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or(error);
        return Err(AppError::BadRequest(format!(
            "{} authorization was not granted: {}",
            provider.display_name(),
            detail
        )));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(AppError::BadRequest(
            "Both code and state are required".to_string(),
        ));
    };

    state
        .tokens
        .handle_callback(user.user_id, provider, &code, &oauth_state)
        .await?;

    let summary = state
        .tokens
        .connections(user.user_id)
        .await?
        .into_iter()
        .find(|c| c.provider == provider)
        .ok_or_else(|| AppError::Internal("Connection missing after callback".to_string()))?;

    Ok(Json(ApiResponse::success(
        Some(summary.into()),
        Some(format!("{} connected", provider.display_name())),
        None,
    )))
}

/// Disconnect a provider account. Tokens are not revoked at the provider.
#[utoipa::path(
    delete,
    path = "/api/integrations/{provider}",
    params(
        ("provider" = String, Path, description = "One of gmail, outlook, google_calendar")
    ),
    responses(
        (status = 200, description = "Provider disconnected"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown provider or no active connection")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn disconnect(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path(provider): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let provider = parse_provider(&provider)?;

    if !state.tokens.disconnect(user.user_id, provider).await? {
        return Err(AppError::NotFound(format!(
            "{} is not connected",
            provider.display_name()
        )));
    }

    Ok(Json(ApiResponse::success(
        None,
        Some(format!("{} disconnected", provider.display_name())),
        None,
    )))
}

/// Create an event on the connected Google Calendar
#[utoipa::path(
    post,
    path = "/api/integrations/google_calendar/events",
    request_body = CreateCalendarEventDto,
    responses(
        (status = 201, description = "Event created", body = ApiResponse<CalendarEventDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized or reconnection required"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Google Calendar error")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_calendar_event(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    ValidatedJson(dto): ValidatedJson<CreateCalendarEventDto>,
) -> Result<(StatusCode, Json<ApiResponse<CalendarEventDto>>)> {
    let event = state
        .api
        .create_calendar_event(user.user_id, dto.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(event.into()),
            Some("Event created".to_string()),
            None,
        )),
    ))
}

/// Upcoming events on the connected Google Calendar
#[utoipa::path(
    get,
    path = "/api/integrations/google_calendar/events",
    params(CalendarEventsQuery),
    responses(
        (status = 200, description = "Page of upcoming events", body = ApiResponse<Vec<CalendarEventDto>>),
        (status = 401, description = "Unauthorized or reconnection required"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Google Calendar error")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_calendar_events(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Query(query): Query<CalendarEventsQuery>,
) -> Result<Json<ApiResponse<Vec<CalendarEventDto>>>> {
    let page = state
        .api
        .list_calendar_events(user.user_id, query.limit(), query.page_token)
        .await?;

    let events: Vec<CalendarEventDto> = page.events.into_iter().map(Into::into).collect();
    let meta = Meta::page(events.len(), page.next_page_token);

    Ok(Json(ApiResponse::success(Some(events), None, Some(meta))))
}

/// One page of the connected mailbox
#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/messages",
    params(
        ("provider" = String, Path, description = "gmail or outlook"),
        MessagesQuery
    ),
    responses(
        (status = 200, description = "Page of messages", body = ApiResponse<Vec<MailMessageDto>>),
        (status = 400, description = "Provider has no mailbox"),
        (status = 401, description = "Unauthorized or reconnection required"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Provider error")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_messages(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path(provider): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<ApiResponse<Vec<MailMessageDto>>>> {
    let provider = parse_provider(&provider)?;
    let page = state
        .api
        .list_messages(user.user_id, provider, query.limit(), query.page_token.clone())
        .await?;

    let messages: Vec<MailMessageDto> = page.messages.into_iter().map(Into::into).collect();
    let meta = Meta::page(messages.len(), page.next_page_token);

    Ok(Json(ApiResponse::success(Some(messages), None, Some(meta))))
}

/// One message from the connected mailbox
#[utoipa::path(
    get,
    path = "/api/integrations/{provider}/messages/{message_id}",
    params(
        ("provider" = String, Path, description = "gmail or outlook"),
        ("message_id" = String, Path, description = "Provider message id")
    ),
    responses(
        (status = 200, description = "Message with recipients and bodies", body = ApiResponse<MailMessageDetailDto>),
        (status = 400, description = "Provider has no mailbox"),
        (status = 401, description = "Unauthorized or reconnection required"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Provider error")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_message(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path((provider, message_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<MailMessageDetailDto>>> {
    let provider = parse_provider(&provider)?;
    let message = state
        .api
        .get_message(user.user_id, provider, message_id)
        .await?;

    Ok(Json(ApiResponse::success(Some(message.into()), None, None)))
}

/// Send an email from the connected mailbox
#[utoipa::path(
    post,
    path = "/api/integrations/{provider}/messages",
    params(
        ("provider" = String, Path, description = "gmail or outlook")
    ),
    request_body = SendEmailDto,
    responses(
        (status = 202, description = "Accepted by the provider", body = ApiResponse<SentEmailDto>),
        (status = 400, description = "Validation error or provider has no mailbox"),
        (status = 401, description = "Unauthorized or reconnection required"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Provider error")
    ),
    tag = "integrations",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_email(
    user: AuthenticatedUser,
    State(state): State<IntegrationsState>,
    Path(provider): Path<String>,
    ValidatedJson(dto): ValidatedJson<SendEmailDto>,
) -> Result<(StatusCode, Json<ApiResponse<SentEmailDto>>)> {
    let provider = parse_provider(&provider)?;
    let sent = state
        .api
        .send_email(user.user_id, provider, dto.into())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(
            Some(sent.into()),
            Some(format!("Email sent via {}", provider.display_name())),
            None,
        )),
    ))
}
