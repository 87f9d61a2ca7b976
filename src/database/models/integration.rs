use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-organization Cesium ion credential used to pull tileset assets
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CesiumIonIntegration {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    pub token_valid: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIntegration {
    pub organization_id: Uuid,
    pub name: String,
    pub access_token: String,
    pub token_valid: bool,
    pub created_by: Uuid,
}
