use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{ActivityAction, EntityType};

/// Immutable audit entry. `project_id` becomes `None` when the project is
/// deleted; the entry itself is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: ActivityAction,
    pub message: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: ActivityAction,
    pub message: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub project_id: Option<Uuid>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub skip: i64,
    pub take: i64,
}

impl ActivityQuery {
    pub fn matches(&self, activity: &Activity) -> bool {
        self.project_id.map_or(true, |id| activity.project_id == Some(id))
            && self.entity_type.map_or(true, |t| activity.entity_type == t)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| activity.entity_id == id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub items: Vec<Activity>,
    pub total: i64,
    pub skip: i64,
    pub take: i64,
}
