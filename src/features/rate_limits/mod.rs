pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use error::RateLimitError;
pub use models::ApiCategory;
pub use services::RateLimiterRegistry;
