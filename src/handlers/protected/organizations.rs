// handlers/protected/organizations.rs - /api/organizations handlers

use axum::extract::{Extension, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::{Organization, OrganizationWithRole};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::organizations::{self, CreateOrganization, UsageSummary};

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// GET /api/organizations/list - Organizations the caller belongs to, with role
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<OrganizationWithRole>> {
    let organizations = organizations::list_for_user(&state, &user).await?;
    Ok(ApiResponse::success(organizations))
}

/// POST /api/organizations - Create a team organization owned by the caller
///
/// ```json
/// { "name": "Harbor Survey", "slug": "harbor-survey" }
/// ```
/// `slug` is optional; when given it must be 2-48 characters of `[a-z0-9-]`.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateOrganization>,
) -> ApiResult<Organization> {
    let organization = organizations::create(&state, &user, payload).await?;
    Ok(ApiResponse::created(organization))
}

/// GET /api/organizations/:org_id
pub async fn show_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<OrganizationWithRole> {
    let organization = organizations::get(&state, &user, org_id).await?;
    Ok(ApiResponse::success(organization))
}

/// PATCH /api/organizations/:org_id - Rename (admin or owner)
pub async fn rename_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RenameRequest>,
) -> ApiResult<Organization> {
    let organization = organizations::rename(&state, &user, org_id, &payload.name).await?;
    Ok(ApiResponse::success(organization))
}

/// DELETE /api/organizations/:org_id - Remove the organization and everything in it
///
/// Owners of the organization and privileged operators only.
pub async fn remove_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<()> {
    organizations::delete(&state, &user, org_id).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/organizations/:org_id/usage - Usage against the plan, per dimension
pub async fn usage_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<UsageSummary> {
    let usage = organizations::usage(&state, &user, org_id).await?;
    Ok(ApiResponse::success(usage))
}
