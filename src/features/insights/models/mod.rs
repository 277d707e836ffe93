mod deal_insights;
mod sales_forecast;

pub use deal_insights::{DealInsights, RiskLevel};
pub use sales_forecast::{SalesForecast, FORECAST_FALLBACK};
