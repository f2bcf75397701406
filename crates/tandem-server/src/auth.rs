//! Password hashing and bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Tokens are HS256 JWTs
//! whose subject is the user id.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use tandem_shared::constants::TOKEN_HEADER;
use tandem_shared::types::UserId;

use crate::error::ServiceError;

/// JWT claims. Only the subject matters to the server.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: UserId) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Return the user a token was issued to, or `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<UserId, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                ServiceError::Unauthorized
            })?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ServiceError::Unauthorized)
    }
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ServiceError::Internal("Failed to hash password".to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), ServiceError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| ServiceError::Internal("Invalid password hash format".to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ServiceError::InvalidCredentials)
}

/// Pull a token from `Authorization: Bearer …` or the legacy `token` header.
pub fn token_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extractor for the authenticated caller of a protected route.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    TokenKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = TokenKeys::from_ref(state);
        let token = token_from_headers(&parts.headers).ok_or(ServiceError::Unauthorized)?;
        keys.verify(&token).map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_token_round_trip() {
        let keys = TokenKeys::new("test-secret", 1);
        let user = UserId::new();
        let token = keys.issue(user).unwrap();
        assert_eq!(keys.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = TokenKeys::new("one", 1).issue(UserId::new()).unwrap();
        assert!(matches!(
            TokenKeys::new("two", 1).verify(&token),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = TokenKeys::new("test-secret", -2);
        let token = keys.issue(UserId::new()).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_token_header_forms() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));

        let mut legacy = HeaderMap::new();
        legacy.insert("token", "xyz".parse().unwrap());
        assert_eq!(token_from_headers(&legacy).as_deref(), Some("xyz"));

        assert!(token_from_headers(&HeaderMap::new()).is_none());
    }
}
