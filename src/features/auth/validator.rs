use super::model::{AppMetadata, AuthenticatedUser};
use crate::core::error::AppError;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::jwks::JwksClient;

pub struct JwtValidator {
    jwks_client: Arc<JwksClient>,
    issuer: String,
    audience: String,
    leeway: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    is_anonymous: bool,
}

impl JwtValidator {
    pub fn new(
        jwks_client: Arc<JwksClient>,
        issuer: String,
        audience: String,
        leeway: Duration,
    ) -> Self {
        Self {
            jwks_client,
            issuer,
            audience,
            leeway: leeway.as_secs(),
        }
    }

    pub async fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let header = decode_header(token).map_err(|e| AppError::Unauthorized(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AppError::Unauthorized("Missing kid in token header".to_string()))?;

        let signing_key = self
            .jwks_client
            .get_key(&kid)
            .await
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        // The header must agree with the key type the JWKS advertises
        if header.alg != signing_key.algorithm {
            return Err(AppError::Unauthorized(format!(
                "Unexpected algorithm {:?} for key {}",
                header.alg, kid
            )));
        }

        let mut validation = Validation::new(signing_key.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;

        let claims = decode::<Claims>(token, &signing_key.key, &validation)
            .map_err(|e| AppError::Unauthorized(e.to_string()))?
            .claims;

        claims_to_user(claims)
    }
}

fn claims_to_user(claims: Claims) -> Result<AuthenticatedUser, AppError> {
    if claims.is_anonymous {
        return Err(AppError::Unauthorized(
            "Anonymous sessions cannot use the CRM API".to_string(),
        ));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Token subject is not a user id".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: claims.email,
        role: claims.role.unwrap_or_else(|| "authenticated".to_string()),
        roles: claims.app_metadata.into_roles(),
    })
}
