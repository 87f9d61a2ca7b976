//! Project CRUD, scene saves and the publish lifecycle.
//!
//! Projects outside the caller's organizations read as missing, never as
//! forbidden, so ids from other tenants cannot be discovered.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{NewProject, Project, ProjectChanges};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::scene::SceneDocument;
use crate::services::activity::ActivityEvent;
use crate::services::membership;
use crate::services::plan_gate::{self, QuotaDimension};
use crate::types::{ActivityAction, EntityType};

pub const DEFAULT_TITLE: &str = "Untitled Project";
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub organization_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Body of PATCH (merge) and PUT (replace)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub scene_data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProjects {
    pub organization_id: Option<Uuid>,
}

/// Distinguishes an absent field from an explicit `null`
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::invalid_field("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::invalid_field(
            "title",
            format!("must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    Ok(title.to_string())
}

fn validate_description(description: Option<String>) -> Result<Option<String>, ApiError> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
    {
        return Err(ApiError::invalid_field(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
        ));
    }
    Ok(description)
}

impl ProjectInput {
    /// PATCH: only the fields present in the body change
    pub fn into_merge(self) -> Result<ProjectChanges, ApiError> {
        Ok(ProjectChanges {
            title: self.title.as_deref().map(validate_title).transpose()?,
            description: self.description.map(validate_description).transpose()?,
            scene_data: self.scene_data.map(SceneDocument::from_value).transpose()?,
        })
    }

    /// PUT: absent fields reset to their defaults
    pub fn into_replace(self) -> Result<ProjectChanges, ApiError> {
        Ok(ProjectChanges {
            title: Some(match self.title {
                Some(title) => validate_title(&title)?,
                None => DEFAULT_TITLE.to_string(),
            }),
            description: Some(validate_description(self.description.flatten())?),
            scene_data: Some(match self.scene_data {
                Some(value) => SceneDocument::from_value(value)?,
                None => SceneDocument::default(),
            }),
        })
    }
}

/// Loads the project and confirms the caller belongs to its organization
async fn load_for_member(state: &AppState, user: &AuthUser, project_id: Uuid) -> Result<Project, ApiError> {
    let project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    if !membership::is_member(state.store.as_ref(), user.id, project.organization_id).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    Ok(project)
}

fn event(project: &Project, actor: Uuid, action: ActivityAction) -> ActivityEvent {
    ActivityEvent::new(project.organization_id, actor, EntityType::Project, project.id, action)
        .project(project.id)
}

pub async fn create(state: &AppState, user: &AuthUser, input: CreateProject) -> Result<Project, ApiError> {
    let store = state.store.as_ref();
    membership::require_member(store, user.id, input.organization_id).await?;

    let title = match input.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => validate_title(title)?,
        _ => DEFAULT_TITLE.to_string(),
    };
    let description = validate_description(input.description)?;

    let organization = store
        .find_organization(input.organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let plan = plan_gate::plan_for(store, &organization).await?;
    let count = store.count_projects(organization.id).await?;
    plan_gate::check_quota(
        &user.email,
        &state.config.security.privileged_operators,
        &plan,
        QuotaDimension::Projects,
        count + 1,
    )?;

    let project = store
        .create_project(NewProject {
            organization_id: organization.id,
            title,
            description,
            created_by: user.id,
        })
        .await?;

    state.activity.record(
        event(&project, user.id, ActivityAction::Created).message(format!("Created project {}", project.title)),
    );
    Ok(project)
}

/// With an organization filter the caller must belong to it; otherwise
/// every organization the caller belongs to is included.
pub async fn list(state: &AppState, user: &AuthUser, query: ListProjects) -> Result<Vec<Project>, ApiError> {
    let organization_ids = match query.organization_id {
        Some(organization_id) => {
            membership::require_member(state.store.as_ref(), user.id, organization_id).await?;
            vec![organization_id]
        }
        None => state
            .store
            .list_organizations_for_user(user.id)
            .await?
            .into_iter()
            .map(|o| o.organization.id)
            .collect(),
    };
    Ok(state.store.list_projects(&organization_ids).await?)
}

pub async fn get(state: &AppState, user: &AuthUser, project_id: Uuid) -> Result<Project, ApiError> {
    load_for_member(state, user, project_id).await
}

/// Applies the changes. Concurrent saves are last-write-wins.
pub async fn update(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    changes: ProjectChanges,
) -> Result<Project, ApiError> {
    let before = load_for_member(state, user, project_id).await?;
    if changes.is_empty() {
        return Ok(before);
    }

    let renamed = changes.title.as_ref().is_some_and(|t| *t != before.title);
    let scene_saved = changes.scene_data.is_some();

    let project = state
        .store
        .update_project(project_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    if renamed {
        state.activity.record(
            event(&project, user.id, ActivityAction::Renamed)
                .message(format!("Renamed project to {}", project.title))
                .metadata(json!({ "from": before.title, "to": project.title })),
        );
    }
    if scene_saved || !renamed {
        state.activity.record(event(&project, user.id, ActivityAction::Updated));
    }
    Ok(project)
}

/// Requires a non-empty scene. Publishing again refreshes the URL.
pub async fn publish(state: &AppState, user: &AuthUser, project_id: Uuid) -> Result<Project, ApiError> {
    let project = load_for_member(state, user, project_id).await?;
    if project.scene_data.is_empty() {
        return Err(ApiError::bad_request("Cannot publish a project with an empty scene"));
    }

    let url = format!("{}/view/{}", state.config.api.public_base_url, project.id);
    let project = state
        .store
        .set_project_published(project_id, true, Some(url))
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    state.activity.record(
        event(&project, user.id, ActivityAction::Published)
            .metadata(json!({ "publishUrl": project.publish_url })),
    );
    Ok(project)
}

pub async fn unpublish(state: &AppState, user: &AuthUser, project_id: Uuid) -> Result<Project, ApiError> {
    load_for_member(state, user, project_id).await?;
    let project = state
        .store
        .set_project_published(project_id, false, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    state
        .activity
        .record(event(&project, user.id, ActivityAction::Archived).message("Unpublished project"));
    Ok(project)
}

/// Hard delete. Earlier activity stays, detached from the project.
pub async fn delete(state: &AppState, user: &AuthUser, project_id: Uuid) -> Result<(), ApiError> {
    let project = load_for_member(state, user, project_id).await?;
    if !state.store.delete_project(project_id).await? {
        return Err(ApiError::not_found("Project not found"));
    }

    // No project link: the row it would point at is gone
    state.activity.record(
        ActivityEvent::new(
            project.organization_id,
            user.id,
            EntityType::Project,
            project.id,
            ActivityAction::Deleted,
        )
        .message(format!("Deleted project {}", project.title)),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::{ActivityQuery, NewOrganization, NewUser, Plan};
    use crate::database::{MemoryStore, Store};
    use crate::integrations::IonClient;
    use std::sync::Arc;
    use std::time::Duration;

    async fn workspace_state() -> (AppState, AuthUser, Uuid) {
        let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
        let (user, org) = store
            .create_user_with_workspace(
                NewUser {
                    email: "editor@example.com".into(),
                    name: "Editor".into(),
                    password_hash: None,
                },
                NewOrganization {
                    name: "Editor's Workspace".into(),
                    slug: "editor-000000".into(),
                    is_personal: true,
                    plan_code: "free".into(),
                },
            )
            .await
            .unwrap();
        let ion = IonClient::new("http://127.0.0.1:9", 1).unwrap();
        let state = AppState::new(store, AppConfig::from_env(), Arc::new(ion));
        let user = AuthUser {
            id: user.id,
            email: user.email,
            name: user.name,
        };
        (state, user, org.id)
    }

    #[tokio::test]
    async fn queued_activity_loses_the_deleted_project_reference() {
        let (state, user, org) = workspace_state().await;
        let project = create(
            &state,
            &user,
            CreateProject {
                organization_id: org,
                title: Some("Short lived".into()),
                description: None,
            },
        )
        .await
        .unwrap();
        // No wait: the created event may still be queued
        delete(&state, &user, project.id).await.unwrap();

        let mut rows = Vec::new();
        for _ in 0..100 {
            let query = ActivityQuery {
                entity_id: Some(project.id.to_string()),
                take: 10,
                ..Default::default()
            };
            rows = state.store.list_activity(org, &query).await.unwrap().0;
            if rows.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|a| a.action == ActivityAction::Created));
        assert!(rows.iter().all(|a| a.project_id.is_none()));

        let by_project = ActivityQuery {
            project_id: Some(project.id),
            take: 10,
            ..Default::default()
        };
        let (_, total) = state.store.list_activity(org, &by_project).await.unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn patch_keeps_absent_fields_and_clears_null_description() {
        let input: ProjectInput =
            serde_json::from_value(json!({ "description": null })).unwrap();
        let changes = input.into_merge().unwrap();
        assert!(changes.title.is_none());
        assert_eq!(changes.description, Some(None));
        assert!(changes.scene_data.is_none());

        let input: ProjectInput = serde_json::from_value(json!({})).unwrap();
        assert!(input.into_merge().unwrap().is_empty());
    }

    #[test]
    fn put_resets_absent_fields() {
        let input: ProjectInput = serde_json::from_value(json!({ "title": "  Harbor  " })).unwrap();
        let changes = input.into_replace().unwrap();
        assert_eq!(changes.title.as_deref(), Some("Harbor"));
        assert_eq!(changes.description, Some(None));
        assert_eq!(changes.scene_data, Some(SceneDocument::default()));
    }

    #[test]
    fn titles_are_bounded() {
        assert!(validate_title(&"t".repeat(MAX_TITLE_LEN)).is_ok());
        assert!(validate_title(&"t".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_title("   ").is_err());
    }

    #[test]
    fn invalid_scene_is_a_validation_error() {
        let input: ProjectInput = serde_json::from_value(json!({ "sceneData": [1, 2] })).unwrap();
        let err = input.into_merge().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
