pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;

pub use password::{hash_password, hash_token, random_token, verify_password};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: &str, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            email: email.to_string(),
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing session token")]
    MissingToken,

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("JWT secret is not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Random source failure: {0}")]
    Random(String),
}

/// Sign a session token for `user_id`
pub fn issue_session(
    security: &SecurityConfig,
    user_id: Uuid,
    email: &str,
) -> Result<String, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let claims = Claims::new(user_id, email, security.session_expiry_hours);
    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Check signature and expiry; the caller still has to confirm the user exists
pub fn verify_session(security: &SecurityConfig, token: &str) -> Result<Claims, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn security() -> SecurityConfig {
        let mut security = AppConfig::from_env().security;
        security.jwt_secret = "test-secret".into();
        security
    }

    #[test]
    fn session_round_trip() {
        let security = security();
        let user_id = Uuid::new_v4();
        let token = issue_session(&security, user_id, "ada@example.com").unwrap();

        let claims = verify_session(&security, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ada@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = issue_session(&security(), Uuid::new_v4(), "ada@example.com").unwrap();

        let mut other = security();
        other.jwt_secret = "different".into();
        assert!(matches!(
            verify_session(&other, &token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let security = security();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "ada@example.com".into(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(security.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(verify_session(&security, &token).is_err());
    }

    #[test]
    fn empty_secret_refuses_to_sign() {
        let mut security = security();
        security.jwt_secret.clear();
        assert!(matches!(
            issue_session(&security, Uuid::new_v4(), "a@b.c"),
            Err(AuthError::InvalidSecret)
        ));
    }
}
