use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::features::integrations::error::IntegrationError;
use crate::shared::retry::parse_retry_after;

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Passes a successful response through. 401 becomes `UpstreamUnauthorized`
/// so the token manager can refresh and retry; any other failure keeps its
/// status.
pub async fn ensure_success(response: Response) -> Result<Response, IntegrationError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(IntegrationError::UpstreamUnauthorized);
    }

    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers().get(header::RETRY_AFTER));
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::UpstreamError {
            status: status.as_u16(),
            message: error_message(&body),
            retry_after,
        });
    }

    Ok(response)
}

/// Decodes a provider API response after `ensure_success`
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, IntegrationError> {
    ensure_success(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
}

/// Pulls a readable message out of Google, Graph or OAuth error bodies
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error_description"),
            value.get("error"),
        ];
        if let Some(message) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
            return message.to_string();
        }
    }

    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// OAuth `error` code from a token endpoint body, e.g. `invalid_grant`
pub fn oauth_error_code(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}
