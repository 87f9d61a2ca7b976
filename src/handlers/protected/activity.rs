// handlers/protected/activity.rs - GET /api/organizations/:org_id/activity handler

use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::api::{ApiPath, ApiQuery};
use crate::app::AppState;
use crate::database::models::ActivityPage;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::activity::{self, ActivityParams};

/// GET /api/organizations/:org_id/activity?projectId=&entityType=&entityId=&skip=&take=
///
/// Newest first. `take` is clamped to the configured maximum page size.
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ActivityParams>,
) -> ApiResult<ActivityPage> {
    let page = activity::list(state.store.as_ref(), &state.config.api, user.id, org_id, params).await?;
    Ok(ApiResponse::success(page))
}
