// handlers/protected/invites.rs - Invite handlers
//
// Invites are issued per organization and accepted by the invited user
// through the organization-less /api/invites/accept route.

use axum::extract::{Extension, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::{OrganizationInvite, OrganizationMember};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::organizations::{self, CreatedInvite};
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Member
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
}

/// GET /api/organizations/:org_id/invites - Pending (unexpired) invites
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<Vec<OrganizationInvite>> {
    let invites = organizations::list_invites(&state, &user, org_id).await?;
    Ok(ApiResponse::success(invites))
}

/**
 * POST /api/organizations/:org_id/invites - Invite someone by email
 *
 * Expected Input:
 * ```json
 * { "email": "grace@example.com", "role": "member" }
 * ```
 *
 * The response carries the plain `token` exactly once; delivering it to
 * the invitee is up to the caller. Pending invites count as seats.
 */
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<InviteRequest>,
) -> ApiResult<CreatedInvite> {
    let invite = organizations::create_invite(&state, &user, org_id, &payload.email, payload.role).await?;
    Ok(ApiResponse::created(invite))
}

/// DELETE /api/organizations/:org_id/invites/:invite_id
pub async fn revoke_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((org_id, invite_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    organizations::revoke_invite(&state, &user, org_id, invite_id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/invites/accept - `{ "token": "..." }`
pub async fn accept_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<AcceptRequest>,
) -> ApiResult<OrganizationMember> {
    let member = organizations::accept_invite(&state, &user, &payload.token).await?;
    Ok(ApiResponse::created(member))
}
