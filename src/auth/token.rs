//! Bearer token issue and verification (HS256 JWT).

use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| AppError::internal(format!("create token: {}", e)))
    }

    /// Malformed, expired or foreign tokens are 401; key problems are 500.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::ExpiredSignature
                | ErrorKind::ImmatureSignature
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AppError::unauthorized(e.to_string()),
                _ => AppError::internal(format!("verify token: {}", e)),
            })
    }
}

/// `Bearer <token>` header value to the token.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenService::new("secret", 60);
        let token = tokens.issue("user-1").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn foreign_and_expired_tokens_are_unauthorized() {
        let token = TokenService::new("one", 60).issue("u").unwrap();
        let err = TokenService::new("two", 60).verify(&token).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let expired = TokenService::new("one", -1).issue("u").unwrap();
        let err = TokenService::new("one", 60).verify(&expired).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = TokenService::new("one", 60).verify("garbage").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_prefix() {
        assert_eq!(bearer_token("Bearer abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
