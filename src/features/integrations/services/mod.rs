mod integration_store;
mod pkce;
mod provider_api_service;
mod token_manager;

pub use integration_store::{IntegrationStore, PgIntegrationStore};
pub use provider_api_service::ProviderApiService;
pub use token_manager::{AuthorizationRequest, TokenManager};
