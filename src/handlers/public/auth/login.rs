// handlers/public/auth/login.rs - POST /auth/login handler

use axum::{extract::State, response::IntoResponse};
use tracing::info;

use crate::api::ApiJson;
use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::ApiResponse;
use crate::services::accounts::{self, LoginRequest};

use super::session_cookie;

/// POST /auth/login - Exchange email and password for a session token
///
/// Expected Input:
/// ```json
/// { "email": "ada@example.com", "password": "..." }
/// ```
///
/// Unknown email and wrong password both answer
/// `401 {"error": "Invalid email or password", "code": "UNAUTHORIZED"}`.
pub async fn login_post(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = accounts::login(&state, payload).await?;
    info!("User {} logged in", session.user.id);

    let cookie = session_cookie(&state.config.security, &session.token)?;
    Ok(([cookie], ApiResponse::success(session)))
}
