use std::sync::Arc;

use crate::features::insights::clients::{GenerationRequest, TextGenerator};
use crate::features::insights::dtos::{DealContextDto, DealInsightRequestDto};
use crate::features::insights::error::GeminiError;
use crate::features::insights::models::{DealInsights, SalesForecast};
use crate::features::rate_limits::{ApiCategory, RateLimiterRegistry};
use crate::shared::llm::{parse_with_fallback, LlmResponse};
use crate::shared::prompts::{render_deal_insights_prompt, render_forecast_prompts};

/// AI assistance for deals. Every call runs under the `ai` limiter and
/// degrades to a fallback answer instead of failing.
pub struct InsightService {
    generator: Arc<dyn TextGenerator>,
    rate_limiters: Arc<RateLimiterRegistry>,
}

impl InsightService {
    pub fn new(generator: Arc<dyn TextGenerator>, rate_limiters: Arc<RateLimiterRegistry>) -> Self {
        Self {
            generator,
            rate_limiters,
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GeminiError> {
        let generator = Arc::clone(&self.generator);
        self.rate_limiters
            .execute(ApiCategory::Ai, move || async move {
                generator.generate(request).await
            })
            .await
    }

    pub async fn deal_insights(&self, request: &DealInsightRequestDto) -> DealInsights {
        let prompt = match render_deal_insights_prompt(
            &request.deal,
            &request.contact,
            &request.activities,
            &DealInsights::json_schema_string(),
        ) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::error!("Failed to render deal insights prompt: {}", e);
                return DealInsights::fallback(e.to_string());
            }
        };

        let generation = GenerationRequest {
            system_instruction: None,
            prompt,
            response_schema: Some(DealInsights::json_schema_value()),
        };

        match self.generate(generation).await {
            Ok(text) => {
                let insights: DealInsights = parse_with_fallback(&text);
                tracing::info!(
                    deal_id = %request.deal.id,
                    success = insights.is_success(),
                    "Deal insights generated"
                );
                insights
            }
            Err(e) => {
                tracing::warn!(deal_id = %request.deal.id, "Deal insights unavailable: {}", e);
                DealInsights::fallback(e.to_string())
            }
        }
    }

    pub async fn sales_forecast(&self, deals: &[DealContextDto]) -> SalesForecast {
        let (system, prompt) = match render_forecast_prompts(deals) {
            Ok(prompts) => prompts,
            Err(e) => {
                tracing::error!("Failed to render forecast prompt: {}", e);
                return SalesForecast::fallback();
            }
        };

        let generation = GenerationRequest {
            system_instruction: Some(system),
            prompt,
            response_schema: None,
        };

        match self.generate(generation).await {
            Ok(text) => SalesForecast {
                summary: text.trim().to_string(),
                is_llm_success: true,
            },
            Err(e) => {
                tracing::warn!(deals = deals.len(), "Sales forecast unavailable: {}", e);
                SalesForecast::fallback()
            }
        }
    }
}
