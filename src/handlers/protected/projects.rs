// handlers/protected/projects.rs - /api/projects handlers

use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath, ApiQuery};
use crate::app::AppState;
use crate::database::models::Project;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::projects::{self, CreateProject, ListProjects, ProjectInput};

/// GET /api/projects[?organizationId=] - Projects across the caller's organizations
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ListProjects>,
) -> ApiResult<Vec<Project>> {
    let projects = projects::list(&state, &user, query).await?;
    Ok(ApiResponse::success(projects))
}

/**
 * POST /api/projects - Create a draft project
 *
 * Expected Input:
 * ```json
 * {
 *   "organizationId": "org_uuid",   // Required: caller must be a member
 *   "title": "Harbor",              // Optional: "Untitled Project"
 *   "description": "..."            // Optional
 * }
 * ```
 *
 * Fails with `403 LIMIT_EXCEEDED` when the plan's project quota is full.
 */
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateProject>,
) -> ApiResult<Project> {
    let project = projects::create(&state, &user, payload).await?;
    Ok(ApiResponse::created(project))
}

/// GET /api/projects/:project_id
pub async fn show_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> ApiResult<Project> {
    let project = projects::get(&state, &user, project_id).await?;
    Ok(ApiResponse::success(project))
}

/// PATCH /api/projects/:project_id - Merge the given fields
pub async fn update_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ProjectInput>,
) -> ApiResult<Project> {
    let changes = payload.into_merge()?;
    let project = projects::update(&state, &user, project_id, changes).await?;
    Ok(ApiResponse::success(project))
}

/// PUT /api/projects/:project_id - Replace title, description and scene
pub async fn replace_put(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ProjectInput>,
) -> ApiResult<Project> {
    let changes = payload.into_replace()?;
    let project = projects::update(&state, &user, project_id, changes).await?;
    Ok(ApiResponse::success(project))
}

/// DELETE /api/projects/:project_id
pub async fn remove_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> ApiResult<()> {
    projects::delete(&state, &user, project_id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/projects/:project_id/publish - 400 when the scene is empty
pub async fn publish_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> ApiResult<Project> {
    let project = projects::publish(&state, &user, project_id).await?;
    Ok(ApiResponse::success(project))
}

/// POST /api/projects/:project_id/unpublish
pub async fn unpublish_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(project_id): ApiPath<Uuid>,
) -> ApiResult<Project> {
    let project = projects::unpublish(&state, &user, project_id).await?;
    Ok(ApiResponse::success(project))
}
