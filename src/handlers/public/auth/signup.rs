// handlers/public/auth/signup.rs - POST /auth/signup handler

use axum::{extract::State, response::IntoResponse};

use crate::api::ApiJson;
use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::ApiResponse;
use crate::services::accounts::{self, SignupRequest};

use super::session_cookie;

/**
 * POST /auth/signup - Create an account and its personal workspace
 *
 * Expected Input:
 * ```json
 * {
 *   "email": "ada@example.com",
 *   "name": "Ada",              // Optional: defaults to the email local part
 *   "password": "at least 8 characters"
 * }
 * ```
 *
 * Expected Output (201):
 * ```json
 * {
 *   "success": true,
 *   "data": {
 *     "token": "eyJhbGciOiJIUzI1NiI...",
 *     "expiresIn": 604800,
 *     "user": { "id": "...", "email": "ada@example.com", "name": "Ada" },
 *     "workspace": { "id": "...", "slug": "ada-3f9c1e", "isPersonal": true, "planCode": "free" }
 *   }
 * }
 * ```
 *
 * 409 when the email is already registered, in any letter case.
 */
pub async fn signup_post(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = accounts::signup(&state, payload).await?;
    let cookie = session_cookie(&state.config.security, &session.token)?;
    Ok(([cookie], ApiResponse::created(session)))
}
