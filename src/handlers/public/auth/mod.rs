// handlers/public/auth/mod.rs - Public authentication handlers
//
// Account creation and session acquisition. Successful signup and login
// return the token in the body and also set it as an HttpOnly cookie so
// browser apps can skip the Authorization header.

use axum::http::{header, HeaderValue};

use crate::config::SecurityConfig;
use crate::error::ApiError;

pub mod login;  // POST /auth/login
pub mod logout; // POST /auth/logout
pub mod signup; // POST /auth/signup

pub use login::login_post;
pub use logout::logout_post;
pub use signup::signup_post;

/// `Set-Cookie` value carrying the session token
pub(crate) fn session_cookie(security: &SecurityConfig, token: &str) -> Result<(header::HeaderName, HeaderValue), ApiError> {
    let value = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        security.session_cookie_name,
        token,
        security.session_expiry_hours * 3600
    );
    let value = HeaderValue::from_str(&value)
        .map_err(|e| ApiError::internal_server_error(format!("Invalid session cookie: {}", e)))?;
    Ok((header::SET_COOKIE, value))
}

/// Expired cookie that makes the browser drop the session
pub(crate) fn cleared_cookie(security: &SecurityConfig) -> Result<(header::HeaderName, HeaderValue), ApiError> {
    let value = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        security.session_cookie_name
    );
    let value = HeaderValue::from_str(&value)
        .map_err(|e| ApiError::internal_server_error(format!("Invalid session cookie: {}", e)))?;
    Ok((header::SET_COOKIE, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn cookie_carries_token_and_lifetime() {
        let mut config = AppConfig::from_env();
        config.security.session_cookie_name = "sid".into();
        config.security.session_expiry_hours = 2;

        let (name, value) = session_cookie(&config.security, "abc").unwrap();
        assert_eq!(name, header::SET_COOKIE);
        assert_eq!(value.to_str().unwrap(), "sid=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=7200");

        let (_, cleared) = cleared_cookie(&config.security).unwrap();
        assert!(cleared.to_str().unwrap().starts_with("sid=;"));
        assert!(cleared.to_str().unwrap().ends_with("Max-Age=0"));
    }
}
