use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{self, AuthError};
use crate::error::ApiError;

/// Authenticated user context, reloaded from the store on every request
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Session middleware: validates the token, then confirms the user still
/// exists. Runs before any organization check.
pub async fn session_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&headers, &state.config.security.session_cookie_name)
        .ok_or(AuthError::MissingToken)?;

    let claims = auth::verify_session(&state.config.security, &token)?;

    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session user no longer exists"))?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
    });

    Ok(next.run(request).await)
}

/// Bearer header first, then the session cookie
fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("scenehub_session=def"));
        assert_eq!(extract_session_token(&headers, "scenehub_session").as_deref(), Some("abc"));
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; scenehub_session=def; other=1"),
        );
        assert_eq!(extract_session_token(&headers, "scenehub_session").as_deref(), Some("def"));
    }

    #[test]
    fn missing_or_malformed_is_none() {
        let mut headers = HeaderMap::new();
        assert!(extract_session_token(&headers, "scenehub_session").is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("scenehub_session="));
        assert!(extract_session_token(&headers, "scenehub_session").is_none());
    }
}
