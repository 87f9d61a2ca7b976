// handlers/protected/members.rs - /api/organizations/:org_id/members handlers

use axum::extract::{Extension, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::{MemberWithUser, OrganizationMember};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::organizations;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// GET /api/organizations/:org_id/members
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<Vec<MemberWithUser>> {
    let members = organizations::list_members(&state, &user, org_id).await?;
    Ok(ApiResponse::success(members))
}

/// PATCH /api/organizations/:org_id/members/:user_id - `{ "role": "admin" }`
///
/// Granting or revoking `owner` takes an owner. Demoting the last owner is
/// a 400.
pub async fn role_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((org_id, member_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<RoleRequest>,
) -> ApiResult<OrganizationMember> {
    let member = organizations::change_role(&state, &user, org_id, member_id, payload.role).await?;
    Ok(ApiResponse::success(member))
}

/// DELETE /api/organizations/:org_id/members/:user_id
///
/// Passing your own id leaves the organization.
pub async fn remove_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((org_id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    organizations::remove_member(&state, &user, org_id, member_id).await?;
    Ok(ApiResponse::no_content())
}
