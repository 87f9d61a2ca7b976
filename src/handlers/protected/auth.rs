// handlers/protected/auth.rs - GET /api/auth/whoami handler

use axum::extract::{Extension, State};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::accounts::{self, Profile};

/// GET /api/auth/whoami - Current user with every membership
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "id": "user_uuid",
///     "email": "ada@example.com",
///     "name": "Ada",
///     "isOperator": false,
///     "organizations": [{ "id": "...", "name": "Ada's Workspace", "role": "owner" }]
///   }
/// }
/// ```
pub async fn whoami_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Profile> {
    let profile = accounts::profile(&state, &user).await?;
    Ok(ApiResponse::success(profile))
}
