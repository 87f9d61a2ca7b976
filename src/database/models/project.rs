use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scene::SceneDocument;

/// A unit of authored work owned by exactly one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_published: bool,
    pub publish_url: Option<String>,
    pub scene_data: SceneDocument,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

/// Field-level update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub scene_data: Option<SceneDocument>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.scene_data.is_none()
    }

    pub fn apply(self, project: &mut Project) {
        if let Some(title) = self.title {
            project.title = title;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(scene_data) = self.scene_data {
            project.scene_data = scene_data;
        }
    }
}
