use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// Verifies HS256 session tokens carried in the session cookie or, failing
/// that, an `Authorization: Bearer` header.
#[derive(Clone)]
pub struct SessionVerifier {
    decoding: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, carried as a string as JWT subjects are.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i32, ApiError> {
        self.sub
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthenticated("invalid session subject".to_string()))
    }
}

impl SessionVerifier {
    pub fn new(secret: &str, issuer: &str, cookie_name: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.set_issuer(&[issuer]);
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cookie_name: cookie_name.into(),
        }
    }

    /// Resolves the request's session to a user id.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<i32, ApiError> {
        let token = self
            .token_from_headers(headers)
            .ok_or_else(|| ApiError::Unauthenticated("missing session".to_string()))?;
        self.verify(&token)?.user_id()
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthenticated("invalid session".to_string()))
    }

    fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let from_cookie = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if from_cookie.is_some() {
            return from_cookie;
        }
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}
