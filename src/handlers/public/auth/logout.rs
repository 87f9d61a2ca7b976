// handlers/public/auth/logout.rs - POST /auth/logout handler

use axum::{extract::State, response::IntoResponse};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::ApiResponse;

/// POST /auth/logout - Clear the session cookie
///
/// Tokens are stateless; a client holding a bearer token simply drops it.
pub async fn logout_post(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cookie = super::cleared_cookie(&state.config.security)?;
    Ok(([cookie], ApiResponse::no_content()))
}
