use thiserror::Error;

use crate::features::rate_limits::RateLimitError;
use crate::shared::prompts::TemplateError;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Gemini API key is not configured")]
    NotConfigured,

    #[error("Gemini returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Gemini returned no text (finish reason: {0})")]
    EmptyResponse(String),

    #[error("Unexpected Gemini response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
