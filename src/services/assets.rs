//! Uploaded and synced assets, plus render-time placement.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{Asset, NewAsset};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::scene::{AssetMetadata, GeoLocation, Transform};
use crate::services::activity::ActivityEvent;
use crate::services::membership;
use crate::services::plan_gate::{self, QuotaDimension};
use crate::types::{ActivityAction, EntityType, Role};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAsset {
    pub name: String,
    pub asset_type: String,
    pub storage_key: Option<String>,
    pub ion_asset_id: Option<i64>,
    #[serde(default)]
    pub file_size: i64,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTransform {
    pub transform: Vec<f64>,
    pub geolocation: Option<GeoLocation>,
}

impl SetTransform {
    fn validate(self) -> Result<(Transform, Option<GeoLocation>), ApiError> {
        let matrix: [f64; 16] = self
            .transform
            .try_into()
            .map_err(|_| ApiError::invalid_field("transform", "must have exactly 16 numbers"))?;
        let transform = Transform(matrix);
        transform
            .validate()
            .map_err(|e| ApiError::invalid_field("transform", e))?;
        if let Some(location) = &self.geolocation {
            location
                .validate()
                .map_err(|e| ApiError::invalid_field("geolocation", e))?;
        }
        Ok((transform, self.geolocation))
    }
}

fn entity_type(asset: &Asset) -> EntityType {
    if asset.ion_asset_id.is_some() && asset.storage_key.is_none() {
        EntityType::GeospatialAsset
    } else {
        EntityType::Model
    }
}

/// Asset visible to the caller through organization membership
async fn load_for_member(state: &AppState, user: &AuthUser, asset_id: Uuid) -> Result<Asset, ApiError> {
    let asset = state
        .store
        .find_asset(asset_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;
    if !membership::is_member(state.store.as_ref(), user.id, asset.organization_id).await? {
        return Err(ApiError::not_found("Asset not found"));
    }
    Ok(asset)
}

pub async fn register(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    input: RegisterAsset,
) -> Result<Asset, ApiError> {
    let store = state.store.as_ref();
    membership::require_member(store, user.id, organization_id).await?;

    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "must not be empty"));
    }
    let asset_type = input.asset_type.trim().to_string();
    if asset_type.is_empty() {
        return Err(ApiError::invalid_field("assetType", "must not be empty"));
    }
    let storage_key = input
        .storage_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    if storage_key.is_none() && input.ion_asset_id.is_none() {
        return Err(ApiError::validation_error(
            "Either storageKey or ionAssetId is required",
            None,
        ));
    }
    if input.file_size < 0 {
        return Err(ApiError::invalid_field("fileSize", "must not be negative"));
    }
    let metadata = match input.metadata {
        Some(value) => AssetMetadata::from_value(value)
            .map_err(|e| ApiError::invalid_field("metadata", e.to_string()))?,
        None => AssetMetadata::default(),
    };

    // Only bytes we hold count against storage
    if storage_key.is_some() {
        let organization = store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Organization not found"))?;
        let plan = plan_gate::plan_for(store, &organization).await?;
        let used = store.storage_used(organization_id).await?;
        plan_gate::check_quota(
            &user.email,
            &state.config.security.privileged_operators,
            &plan,
            QuotaDimension::Storage,
            used.saturating_add(input.file_size),
        )?;
    }

    let asset = store
        .create_asset(NewAsset {
            organization_id,
            name,
            asset_type,
            storage_key,
            ion_asset_id: input.ion_asset_id,
            file_size: input.file_size,
            metadata,
            uploaded_by: Some(user.id),
        })
        .await?;

    state.activity.record(
        ActivityEvent::new(organization_id, user.id, entity_type(&asset), asset.id, ActivityAction::Added)
            .message(format!("Added {}", asset.name))
            .metadata(json!({ "fileSize": asset.file_size, "assetType": asset.asset_type })),
    );
    Ok(asset)
}

pub async fn list(state: &AppState, user: &AuthUser, organization_id: Uuid) -> Result<Vec<Asset>, ApiError> {
    membership::require_member(state.store.as_ref(), user.id, organization_id).await?;
    Ok(state.store.list_assets(organization_id).await?)
}

pub async fn get(state: &AppState, user: &AuthUser, asset_id: Uuid) -> Result<Asset, ApiError> {
    load_for_member(state, user, asset_id).await
}

/// Admins and the uploader may delete
pub async fn delete(state: &AppState, user: &AuthUser, asset_id: Uuid) -> Result<(), ApiError> {
    let asset = load_for_member(state, user, asset_id).await?;
    let is_uploader = asset.uploaded_by == Some(user.id);
    if !is_uploader
        && !membership::has_role_at_least(state.store.as_ref(), user.id, asset.organization_id, Role::Admin)
            .await?
    {
        return Err(ApiError::forbidden("Only admins or the uploader may delete this asset"));
    }

    if !state.store.delete_asset(asset_id).await? {
        return Err(ApiError::not_found("Asset not found"));
    }
    state.activity.record(
        ActivityEvent::new(
            asset.organization_id,
            user.id,
            entity_type(&asset),
            asset.id,
            ActivityAction::Removed,
        )
        .message(format!("Removed {}", asset.name)),
    );
    Ok(())
}

/// Stores placement in the asset metadata. The source file and any
/// upstream ion asset are left untouched.
pub async fn set_transform(
    state: &AppState,
    user: &AuthUser,
    asset_id: Uuid,
    input: SetTransform,
) -> Result<Asset, ApiError> {
    let asset = load_for_member(state, user, asset_id).await?;
    let (transform, geolocation) = input.validate()?;

    let mut metadata = asset.metadata.clone();
    metadata.transform = Some(transform);
    if geolocation.is_some() {
        metadata.geolocation = geolocation;
    }

    let updated = state
        .store
        .update_asset_metadata(asset_id, metadata)
        .await?
        .ok_or_else(|| ApiError::not_found("Asset not found"))?;

    state.activity.record(
        ActivityEvent::new(
            asset.organization_id,
            user.id,
            entity_type(&asset),
            asset.id,
            ActivityAction::Updated,
        )
        .message("Updated transform"),
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_needs_sixteen_finite_numbers() {
        let ok = SetTransform {
            transform: Transform::IDENTITY.0.to_vec(),
            geolocation: None,
        };
        assert_eq!(ok.validate().unwrap().0, Transform::IDENTITY);

        let short = SetTransform {
            transform: vec![1.0; 15],
            geolocation: None,
        };
        assert_eq!(short.validate().unwrap_err().status_code(), 400);

        let mut values = Transform::IDENTITY.0.to_vec();
        values[3] = f64::NAN;
        let nan = SetTransform {
            transform: values,
            geolocation: None,
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn geolocation_is_range_checked() {
        let input = SetTransform {
            transform: Transform::IDENTITY.0.to_vec(),
            geolocation: Some(GeoLocation {
                longitude: 200.0,
                latitude: 0.0,
                height: 0.0,
            }),
        };
        assert!(input.validate().is_err());
    }
}
