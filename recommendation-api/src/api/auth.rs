use actix_web::{http::header, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use super::error::ApiError;

/// Turns a bearer token into the subject id that owns the request.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, ApiError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// HS256 tokens signed with a shared secret. Audience is not checked.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<String, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            ApiError::AuthenticationFailed("Invalid or expired token".to_string())
        })?;

        if data.claims.sub.is_empty() {
            return Err(ApiError::AuthenticationFailed("Token has no subject".to_string()));
        }
        Ok(data.claims.sub)
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::AuthenticationFailed("Authorization header missing".to_string()))?
        .to_str()
        .map_err(|_| ApiError::AuthenticationFailed("Authorization header is not valid text".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(ApiError::AuthenticationFailed(
            "Authorization header must be 'Bearer <token>'".to_string(),
        )),
    }
}
