// handlers/protected/assets.rs - Asset handlers

use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::Asset;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::assets::{self, RegisterAsset, SetTransform};

/// GET /api/organizations/:org_id/assets
pub async fn list_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
) -> ApiResult<Vec<Asset>> {
    let assets = assets::list(&state, &user, org_id).await?;
    Ok(ApiResponse::success(assets))
}

/**
 * POST /api/organizations/:org_id/assets - Register an uploaded file or an ion asset
 *
 * Expected Input:
 * ```json
 * {
 *   "name": "pier.glb",
 *   "assetType": "model/gltf-binary",
 *   "storageKey": "uploads/pier.glb",   // one of storageKey / ionAssetId
 *   "ionAssetId": 96188,
 *   "fileSize": 1048576,
 *   "metadata": { "tags": ["harbor"] }
 * }
 * ```
 *
 * Stored files count against the plan's storage quota.
 */
pub async fn register_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RegisterAsset>,
) -> ApiResult<Asset> {
    let asset = assets::register(&state, &user, org_id, payload).await?;
    Ok(ApiResponse::created(asset))
}

/// GET /api/assets/:asset_id
pub async fn show_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(asset_id): ApiPath<Uuid>,
) -> ApiResult<Asset> {
    let asset = assets::get(&state, &user, asset_id).await?;
    Ok(ApiResponse::success(asset))
}

/// DELETE /api/assets/:asset_id - Admins, owners or the uploader
pub async fn remove_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(asset_id): ApiPath<Uuid>,
) -> ApiResult<()> {
    assets::delete(&state, &user, asset_id).await?;
    Ok(ApiResponse::no_content())
}

/// PUT /api/models/:asset_id/transform
///
/// ```json
/// {
///   "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
///   "geolocation": { "longitude": -122.4, "latitude": 37.8, "height": 12.0 }
/// }
/// ```
pub async fn transform_put(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(asset_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SetTransform>,
) -> ApiResult<Asset> {
    let asset = assets::set_transform(&state, &user, asset_id, payload).await?;
    Ok(ApiResponse::success(asset))
}
