use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scene::AssetMetadata;

/// Uploaded file or synced Cesium ion asset, scoped to one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub asset_type: String,
    pub storage_key: Option<String>,
    pub ion_asset_id: Option<i64>,
    pub integration_id: Option<Uuid>,
    pub file_size: i64,
    pub metadata: AssetMetadata,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub organization_id: Uuid,
    pub name: String,
    pub asset_type: String,
    pub storage_key: Option<String>,
    pub ion_asset_id: Option<i64>,
    pub file_size: i64,
    pub metadata: AssetMetadata,
    pub uploaded_by: Option<Uuid>,
}

/// Remote catalog entry to reconcile into a local asset row
#[derive(Debug, Clone, PartialEq)]
pub struct IonAssetUpsert {
    pub ion_asset_id: i64,
    pub name: String,
    pub asset_type: String,
    pub file_size: i64,
    pub details: crate::scene::IonAssetDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
}

impl Asset {
    /// True when a sync entry would change what is stored for this asset
    pub fn differs_from(&self, remote: &IonAssetUpsert) -> bool {
        self.name != remote.name
            || self.asset_type != remote.asset_type
            || self.file_size != remote.file_size
            || self.metadata.ion.as_ref() != Some(&remote.details)
    }
}
