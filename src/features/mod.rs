pub mod auth;
pub mod insights;
pub mod integrations;
pub mod rate_limits;
