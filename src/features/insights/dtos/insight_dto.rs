use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::features::insights::models::{DealInsights, RiskLevel, SalesForecast};

/// Deal fields the model sees
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DealContextDto {
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(range(min = 0.0, message = "Value must not be negative"))]
    pub value: f64,

    /// Currency symbol or ISO code, e.g. `$` or `EUR`
    #[serde(default = "default_currency")]
    #[validate(length(min = 1, max = 8))]
    pub currency: String,

    /// Pipeline stage, e.g. `PROPOSAL` or `CLOSED_WON`
    #[validate(length(min = 1, max = 64))]
    pub stage: String,

    #[validate(range(max = 100, message = "Probability must be 0-100"))]
    pub probability: Option<u8>,

    pub expected_close_date: Option<NaiveDate>,
}

fn default_currency() -> String {
    "$".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ContactContextDto {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(max = 255))]
    pub company: Option<String>,

    #[validate(length(max = 255))]
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ActivityContextDto {
    /// Activity type, e.g. `call`, `email`, `meeting`
    #[validate(length(min = 1, max = 32))]
    pub kind: String,

    #[validate(length(min = 1, max = 500))]
    pub subject: String,

    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DealInsightRequestDto {
    #[validate(nested)]
    pub deal: DealContextDto,

    #[validate(nested)]
    pub contact: ContactContextDto,

    #[serde(default)]
    #[validate(length(max = 100, message = "At most 100 activities"), nested)]
    pub activities: Vec<ActivityContextDto>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ForecastRequestDto {
    #[validate(length(max = 200, message = "At most 200 deals"), nested)]
    pub deals: Vec<DealContextDto>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DealInsightsDto {
    pub summary: String,
    /// Absent when the model could not be reached or parsed
    pub risk_level: Option<RiskLevel>,
    pub next_steps: Vec<String>,
    pub suggested_email_draft: String,
    /// `false` when the values are a fallback
    pub is_llm_success: bool,
}

impl From<DealInsights> for DealInsightsDto {
    fn from(insights: DealInsights) -> Self {
        Self {
            risk_level: insights.is_llm_success.then_some(insights.risk_level),
            summary: insights.summary,
            next_steps: insights.next_steps,
            suggested_email_draft: insights.suggested_email_draft,
            is_llm_success: insights.is_llm_success,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SalesForecastDto {
    pub summary: String,
    pub is_llm_success: bool,
}

impl From<SalesForecast> for SalesForecastDto {
    fn from(forecast: SalesForecast) -> Self {
        Self {
            summary: forecast.summary,
            is_llm_success: forecast.is_llm_success,
        }
    }
}
