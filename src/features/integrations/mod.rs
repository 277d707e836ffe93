pub mod clients;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use error::IntegrationError;
pub use handlers::IntegrationsState;
