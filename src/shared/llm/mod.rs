//! Helpers for structured output from generative models.

mod parser;
mod response;

pub use parser::parse_with_fallback;
pub use response::LlmResponse;
