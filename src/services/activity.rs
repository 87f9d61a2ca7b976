//! Audit trail.
//!
//! Mutating operations hand an `ActivityEvent` to the dispatcher and move on.
//! A background task owns the store writes, so a slow or failing audit
//! insert can never fail or roll back the operation that produced it.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::database::models::{ActivityPage, ActivityQuery, NewActivity};
use crate::database::Store;
use crate::error::ApiError;
use crate::services::membership;
use crate::types::{ActivityAction, EntityType};

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: ActivityAction,
    pub message: Option<String>,
    pub metadata: Value,
}

impl ActivityEvent {
    pub fn new(
        organization_id: Uuid,
        actor_id: Uuid,
        entity_type: EntityType,
        entity_id: impl ToString,
        action: ActivityAction,
    ) -> Self {
        Self {
            organization_id,
            project_id: None,
            actor_id,
            entity_type,
            entity_id: entity_id.to_string(),
            action,
            message: None,
            metadata: json!({}),
        }
    }

    pub fn project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<ActivityEvent> for NewActivity {
    fn from(event: ActivityEvent) -> Self {
        NewActivity {
            organization_id: event.organization_id,
            project_id: event.project_id,
            actor_id: event.actor_id,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            action: event.action,
            message: event.message,
            metadata: event.metadata,
        }
    }
}

/// Cheap to clone; every clone feeds the same worker
#[derive(Clone)]
pub struct ActivityDispatcher {
    sender: mpsc::Sender<NewActivity>,
}

impl ActivityDispatcher {
    /// Starts the writer task on the current tokio runtime
    pub fn spawn(store: Arc<dyn Store>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<NewActivity>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(activity) = receiver.recv().await {
                let organization_id = activity.organization_id;
                if let Err(e) = store.insert_activity(activity).await {
                    warn!("Dropping activity for organization {}: {}", organization_id, e);
                }
            }
            debug!("Activity writer stopped");
        });

        Self { sender }
    }

    /// Queue an entry. Never blocks and never reports failure to the caller.
    pub fn record(&self, event: ActivityEvent) {
        match self.sender.try_send(event.into()) {
            Ok(()) => {}
            Err(TrySendError::Full(activity)) => {
                warn!(
                    "Activity queue full, dropping {:?} {:?} {}",
                    activity.entity_type, activity.action, activity.entity_id
                );
            }
            Err(TrySendError::Closed(activity)) => {
                warn!(
                    "Activity writer is gone, dropping {:?} {:?} {}",
                    activity.entity_type, activity.action, activity.entity_id
                );
            }
        }
    }
}

/// Query string for the activity feed
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityParams {
    pub project_id: Option<Uuid>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

impl ActivityParams {
    pub fn into_query(self, api: &ApiConfig) -> ActivityQuery {
        ActivityQuery {
            project_id: self.project_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            skip: self.skip.unwrap_or(0).max(0),
            take: self
                .take
                .unwrap_or(api.default_page_size)
                .clamp(1, api.max_page_size),
        }
    }
}

/// Newest-first page of an organization's feed; members only
pub async fn list(
    store: &dyn Store,
    api: &ApiConfig,
    user_id: Uuid,
    organization_id: Uuid,
    params: ActivityParams,
) -> Result<ActivityPage, ApiError> {
    membership::require_member(store, user_id, organization_id).await?;

    let query = params.into_query(api);
    let (items, total) = store.list_activity(organization_id, &query).await?;
    Ok(ActivityPage {
        items,
        total,
        skip: query.skip,
        take: query.take,
    })
}
