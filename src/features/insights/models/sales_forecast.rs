/// Returned whenever the model call fails or answers with nothing
pub const FORECAST_FALLBACK: &str = "Unable to generate forecast at this time.";

/// Executive summary of pipeline health
#[derive(Debug, Clone, PartialEq)]
pub struct SalesForecast {
    pub summary: String,
    pub is_llm_success: bool,
}

impl SalesForecast {
    pub fn fallback() -> Self {
        Self {
            summary: FORECAST_FALLBACK.to_string(),
            is_llm_success: false,
        }
    }
}
