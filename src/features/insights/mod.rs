pub mod clients;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use clients::GeminiClient;
pub use services::InsightService;
