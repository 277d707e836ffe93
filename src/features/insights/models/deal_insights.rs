use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shared::llm::LlmResponse;

/// Shown when the model produced nothing usable
const INSIGHTS_FALLBACK_SUMMARY: &str = "Unable to generate insights at this time.";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema)]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Model assessment of a single deal
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DealInsights {
    /// One paragraph summary of the deal status
    pub summary: String,
    pub risk_level: RiskLevel,
    /// Top 3 recommended actions
    pub next_steps: Vec<String>,
    /// A personalized follow-up email draft
    pub suggested_email_draft: String,

    #[serde(default = "default_true")]
    #[schemars(skip)]
    pub is_llm_success: bool,

    #[serde(default)]
    #[schemars(skip)]
    pub llm_error_message: Option<String>,
}

impl LlmResponse for DealInsights {
    fn mark_as_fallback(&mut self, error_message: String) {
        self.is_llm_success = false;
        self.llm_error_message = Some(error_message);
        if self.summary.is_empty() {
            self.summary = INSIGHTS_FALLBACK_SUMMARY.to_string();
        }
    }

    fn is_success(&self) -> bool {
        self.is_llm_success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::llm::parse_with_fallback;

    #[test]
    fn test_schema_requires_all_model_fields() {
        let schema = DealInsights::json_schema_value();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        for field in ["summary", "risk_level", "next_steps", "suggested_email_draft"] {
            assert!(required.contains(&field), "{} not required", field);
        }
        assert_eq!(
            schema["properties"]["risk_level"]["enum"],
            serde_json::json!(["Low", "Medium", "High"])
        );
    }

    #[test]
    fn test_fallback_has_readable_summary() {
        let insights: DealInsights = parse_with_fallback("<html>502</html>");

        assert!(!insights.is_success());
        assert_eq!(insights.summary, INSIGHTS_FALLBACK_SUMMARY);
        assert!(insights.next_steps.is_empty());
    }
}
