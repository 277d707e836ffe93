use lazy_static::lazy_static;
use regex::Regex;

use super::LlmResponse;

lazy_static! {
    /// Trailing comma before `}` or `]`
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",(\s*[}\]])").unwrap();

    /// JavaScript-style `"a" + "b"` concatenation inside string values
    static ref STRING_CONCAT_RE: Regex = Regex::new(r#""\s*\+\s*""#).unwrap();

    /// Opening code fence with an optional language tag
    static ref CODE_FENCE_RE: Regex = Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap();
}

/// Characters of the offending payload kept in fallback error messages
const ERROR_EXCERPT_CHARS: usize = 200;

/// Successive attempts at turning model output into the target type
#[derive(Debug, Clone, Copy)]
enum Stage {
    /// Payload as extracted
    Direct,
    /// Trailing commas and string concatenation removed
    QuickFixes,
    /// Full repair through `llm_json`
    Repaired,
}

impl Stage {
    const ALL: [Stage; 3] = [Stage::Direct, Stage::QuickFixes, Stage::Repaired];

    fn apply(self, payload: &str) -> Option<String> {
        match self {
            Stage::Direct => Some(payload.to_string()),
            Stage::QuickFixes => Some(quick_fix(payload)),
            Stage::Repaired => repair(payload),
        }
    }
}

/// Pulls the JSON object out of a model reply.
///
/// Accepts a fenced code block (with or without a language tag), a bare
/// object, or an object surrounded by prose.
pub fn extract_json(text: &str) -> Result<&str, String> {
    if let Some(fence) = CODE_FENCE_RE.find(text) {
        let body = &text[fence.end()..];
        let end = body.find("```").unwrap_or(body.len());
        let inner = body[..end].trim();
        if inner.starts_with('{') {
            return Ok(inner);
        }
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(trimmed);
    }

    let start = text
        .find('{')
        .ok_or_else(|| "No JSON object found in model output".to_string())?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| "Unterminated JSON object in model output".to_string())?;

    Ok(&text[start..=end])
}

/// `{"a": 1,}` -> `{"a": 1}`
pub fn strip_trailing_commas(json: &str) -> String {
    TRAILING_COMMA_RE.replace_all(json, "$1").into_owned()
}

/// `"Call " + "Monday"` -> `"Call Monday"`
pub fn join_string_concatenation(json: &str) -> String {
    STRING_CONCAT_RE.replace_all(json, "").into_owned()
}

fn quick_fix(json: &str) -> String {
    strip_trailing_commas(&join_string_concatenation(json))
}

fn repair(json: &str) -> Option<String> {
    let options = llm_json::RepairOptions::default();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        llm_json::repair_json(json, &options)
    }));

    match outcome {
        Ok(Ok(repaired)) => Some(repaired),
        Ok(Err(e)) => {
            tracing::debug!("JSON repair failed: {:?}", e);
            None
        }
        Err(_) => {
            tracing::warn!("JSON repair panicked");
            None
        }
    }
}

/// Parses model output into `T`, trying each repair stage in turn
pub fn parse_llm_json<T: LlmResponse>(text: &str) -> Result<T, String> {
    let payload = extract_json(text)?;

    let mut last_error = String::new();
    for stage in Stage::ALL {
        let Some(candidate) = stage.apply(payload) else {
            continue;
        };
        match serde_json::from_str::<T>(&candidate) {
            Ok(parsed) => {
                tracing::debug!(?stage, "Model output parsed");
                return Ok(parsed);
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(format!(
        "Unparseable model output ({}): {}",
        last_error,
        payload.chars().take(ERROR_EXCERPT_CHARS).collect::<String>()
    ))
}

/// Parses model output, degrading to `T::default()` flagged as a fallback
/// when every stage fails. Never panics on malformed input.
pub fn parse_with_fallback<T: LlmResponse>(text: &str) -> T {
    parse_llm_json(text).unwrap_or_else(|error| {
        tracing::warn!("Model output parsing failed, using fallback: {}", error);
        T::fallback(error)
    })
}
