//! Prompt templates for the generative-AI features.
//!
//! Templates live in `templates/prompts/` and use Jinja syntax. Each
//! prompt the services send has a typed render function here.

pub mod engine;

pub use engine::{render_template, TemplateError};

use minijinja::context;
use serde::Serialize;

/// Deal analysis prompt. `json_schema` describes the expected reply.
pub fn render_deal_insights_prompt<D, C, A>(
    deal: &D,
    contact: &C,
    activities: &[A],
    json_schema: &str,
) -> Result<String, TemplateError>
where
    D: Serialize,
    C: Serialize,
    A: Serialize,
{
    render_template(
        "insights/deal_insights.jinja",
        context! { deal, contact, activities, json_schema },
    )
}

/// System instruction and user prompt for the pipeline forecast
pub fn render_forecast_prompts<D: Serialize>(
    deals: &[D],
) -> Result<(String, String), TemplateError> {
    let system = render_template("insights/forecast_system.jinja", context! {})?;
    let prompt = render_template("insights/forecast.jinja", context! { deals })?;
    Ok((system.trim().to_string(), prompt))
}
