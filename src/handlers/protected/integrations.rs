// handlers/protected/integrations.rs - Cesium ion integration handlers
//
// All routes take an admin or owner of the organization.

use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::{CesiumIonIntegration, SyncReport};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::sync::{self, CreateIntegration};

/// GET /api/organizations/:org_id/cesium-integrations
///
/// Access tokens are never serialized back.
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<Vec<CesiumIonIntegration>> {
    let integrations = sync::list_integrations(&state, &user, org_id).await?;
    Ok(ApiResponse::success(integrations))
}

/// POST /api/organizations/:org_id/cesium-integrations
///
/// ```json
/// { "name": "Survey account", "accessToken": "eyJ..." }
/// ```
/// The token is probed against ion first. A rejected token is still stored,
/// with `tokenValid: false`; ion being unreachable is a 502.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreateIntegration>,
) -> ApiResult<CesiumIonIntegration> {
    let integration = sync::create_integration(&state, &user, org_id, payload).await?;
    Ok(ApiResponse::created(integration))
}

/// DELETE /api/organizations/:org_id/cesium-integrations/:integration_id
pub async fn remove_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((org_id, integration_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    sync::delete_integration(&state, &user, org_id, integration_id).await?;
    Ok(ApiResponse::no_content())
}

/**
 * POST /api/organizations/:org_id/cesium-integrations/:integration_id/sync
 *
 * Pulls the full ion catalog and upserts it as assets of the organization.
 *
 * Expected Output:
 * ```json
 * { "success": true, "data": { "created": 3, "updated": 1, "unchanged": 12 } }
 * ```
 *
 * `409 REAUTHORIZE_REQUIRED` when the stored token is invalid or ion
 * rejects it; nothing is written in that case.
 */
pub async fn sync_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((org_id, integration_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<SyncReport> {
    let report = sync::sync(&state, &user, org_id, integration_id).await?;
    Ok(ApiResponse::success(report))
}
