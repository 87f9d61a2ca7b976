use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::*;
use crate::database::store::Store;
use crate::scene::{AssetMetadata, SceneDocument};
use crate::types::{Role, SubscriptionStatus};

/// Process-local store. Every method takes the single lock once, so
/// multi-row operations are atomic the same way a transaction is.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    plans: BTreeMap<String, Plan>,
    organizations: HashMap<Uuid, Organization>,
    members: HashMap<(Uuid, Uuid), OrganizationMember>,
    invites: HashMap<Uuid, OrganizationInvite>,
    projects: HashMap<Uuid, Project>,
    assets: HashMap<Uuid, Asset>,
    integrations: HashMap<Uuid, CesiumIonIntegration>,
    activities: Vec<Activity>,
}

impl MemoryState {
    fn owner_count(&self, organization_id: Uuid) -> usize {
        self.members
            .values()
            .filter(|m| m.organization_id == organization_id && m.role == Role::Owner)
            .count()
    }

    fn insert_organization(&mut self, new: NewOrganization, owner: Uuid) -> Result<Organization, DatabaseError> {
        if self.organizations.values().any(|o| o.slug == new.slug) {
            return Err(DatabaseError::Conflict(format!("Slug '{}' is already taken", new.slug)));
        }
        if !self.plans.contains_key(&new.plan_code) {
            return Err(DatabaseError::NotFound(format!("Plan '{}'", new.plan_code)));
        }

        let now = Utc::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: new.name,
            slug: new.slug,
            is_personal: new.is_personal,
            plan_code: new.plan_code,
            subscription_status: SubscriptionStatus::None,
            created_at: now,
            updated_at: now,
        };
        self.organizations.insert(organization.id, organization.clone());
        self.members.insert(
            (organization.id, owner),
            OrganizationMember {
                organization_id: organization.id,
                user_id: owner,
                role: Role::Owner,
                created_at: now,
            },
        );
        Ok(organization)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        let mut state = MemoryState::default();
        for plan in plans {
            state.plans.insert(plan.code.clone(), plan);
        }
        Self {
            state: RwLock::new(state),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn create_user_with_workspace(
        &self,
        user: NewUser,
        workspace: NewOrganization,
    ) -> Result<(User, Organization), DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DatabaseError::Conflict("An account with this email already exists".into()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        // Validate the workspace before the user row becomes visible
        let organization = state.insert_organization(workspace, created.id)?;
        state.users.insert(created.id, created.clone());
        Ok((created, organization))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), DatabaseError> {
        self.state
            .write()
            .await
            .plans
            .insert(plan.code.clone(), plan.clone());
        Ok(())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError> {
        Ok(self.state.read().await.plans.values().cloned().collect())
    }

    async fn find_plan(&self, code: &str) -> Result<Option<Plan>, DatabaseError> {
        Ok(self.state.read().await.plans.get(code).cloned())
    }

    async fn create_organization(
        &self,
        organization: NewOrganization,
        owner: Uuid,
    ) -> Result<Organization, DatabaseError> {
        self.state.write().await.insert_organization(organization, owner)
    }

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
        Ok(self.state.read().await.organizations.get(&id).cloned())
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationWithRole>, DatabaseError> {
        let state = self.state.read().await;
        let mut list: Vec<OrganizationWithRole> = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state
                    .organizations
                    .get(&m.organization_id)
                    .map(|o| OrganizationWithRole {
                        organization: o.clone(),
                        role: m.role,
                    })
            })
            .collect();
        list.sort_by(|a, b| {
            b.organization
                .is_personal
                .cmp(&a.organization.is_personal)
                .then_with(|| a.organization.created_at.cmp(&b.organization.created_at))
        });
        Ok(list)
    }

    async fn rename_organization(&self, id: Uuid, name: &str) -> Result<Organization, DatabaseError> {
        let mut state = self.state.write().await;
        let organization = state
            .organizations
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound("Organization".into()))?;
        organization.name = name.to_string();
        organization.updated_at = Utc::now();
        Ok(organization.clone())
    }

    async fn update_license(
        &self,
        id: Uuid,
        plan_code: &str,
        status: SubscriptionStatus,
    ) -> Result<Organization, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.plans.contains_key(plan_code) {
            return Err(DatabaseError::NotFound(format!("Plan '{}'", plan_code)));
        }
        let organization = state
            .organizations
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound("Organization".into()))?;
        organization.plan_code = plan_code.to_string();
        organization.subscription_status = status;
        organization.updated_at = Utc::now();
        Ok(organization.clone())
    }

    async fn delete_organization(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.organizations.remove(&id).is_none() {
            return Ok(false);
        }
        state.members.retain(|(org, _), _| *org != id);
        state.invites.retain(|_, i| i.organization_id != id);
        state.projects.retain(|_, p| p.organization_id != id);
        state.assets.retain(|_, a| a.organization_id != id);
        state.integrations.retain(|_, i| i.organization_id != id);
        state.activities.retain(|a| a.organization_id != id);
        Ok(true)
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(&(organization_id, user_id))
            .cloned())
    }

    async fn list_members(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, DatabaseError> {
        let state = self.state.read().await;
        let mut members: Vec<MemberWithUser> = state
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .filter_map(|m| {
                state.users.get(&m.user_id).map(|u| MemberWithUser {
                    user_id: u.id,
                    email: u.email.clone(),
                    name: u.name.clone(),
                    role: m.role,
                    created_at: m.created_at,
                })
            })
            .collect();
        members.sort_by(|a, b| b.role.cmp(&a.role).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(members)
    }

    async fn count_members(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .count() as i64)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, DatabaseError> {
        let mut state = self.state.write().await;
        let owners = state.owner_count(organization_id);
        let member = state
            .members
            .get_mut(&(organization_id, user_id))
            .ok_or_else(|| DatabaseError::NotFound("Member".into()))?;
        if member.role == Role::Owner && role != Role::Owner && owners <= 1 {
            return Err(DatabaseError::LastOwner);
        }
        member.role = role;
        Ok(member.clone())
    }

    async fn remove_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(member) = state.members.get(&(organization_id, user_id)) else {
            return Ok(false);
        };
        if member.role == Role::Owner && state.owner_count(organization_id) <= 1 {
            return Err(DatabaseError::LastOwner);
        }
        state.members.remove(&(organization_id, user_id));
        Ok(true)
    }

    async fn create_invite(&self, invite: NewInvite) -> Result<OrganizationInvite, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&invite.organization_id) {
            return Err(DatabaseError::NotFound("Organization".into()));
        }
        let created = OrganizationInvite {
            id: Uuid::new_v4(),
            organization_id: invite.organization_id,
            email: invite.email,
            role: invite.role,
            token_hash: invite.token_hash,
            invited_by: invite.invited_by,
            expires_at: invite.expires_at,
            created_at: Utc::now(),
        };
        state.invites.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_pending_invites(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrganizationInvite>, DatabaseError> {
        let mut state = self.state.write().await;
        state
            .invites
            .retain(|_, i| i.organization_id != organization_id || i.is_pending(now));
        let mut invites: Vec<OrganizationInvite> = state
            .invites
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        invites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(invites)
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OrganizationInvite>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .invites
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn delete_invite(&self, organization_id: Uuid, invite_id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        match state.invites.get(&invite_id) {
            Some(invite) if invite.organization_id == organization_id => {
                state.invites.remove(&invite_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn accept_invite(
        &self,
        invite: &OrganizationInvite,
        user_id: Uuid,
    ) -> Result<OrganizationMember, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.invites.contains_key(&invite.id) {
            return Err(DatabaseError::NotFound("Invite".into()));
        }
        if state.members.contains_key(&(invite.organization_id, user_id)) {
            return Err(DatabaseError::Conflict("Already a member of this organization".into()));
        }

        let member = OrganizationMember {
            organization_id: invite.organization_id,
            user_id,
            role: invite.role,
            created_at: Utc::now(),
        };
        state.members.insert((invite.organization_id, user_id), member.clone());
        state.invites.remove(&invite.id);
        Ok(member)
    }

    async fn create_project(&self, project: NewProject) -> Result<Project, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&project.organization_id) {
            return Err(DatabaseError::NotFound("Organization".into()));
        }
        let now = Utc::now();
        let created = Project {
            id: Uuid::new_v4(),
            organization_id: project.organization_id,
            title: project.title,
            description: project.description,
            is_published: false,
            publish_url: None,
            scene_data: SceneDocument::default(),
            created_by: project.created_by,
            created_at: now,
            updated_at: now,
        };
        state.projects.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, DatabaseError> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self, organization_ids: &[Uuid]) -> Result<Vec<Project>, DatabaseError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| organization_ids.contains(&p.organization_id))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn count_projects(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .projects
            .values()
            .filter(|p| p.organization_id == organization_id)
            .count() as i64)
    }

    async fn update_project(
        &self,
        id: Uuid,
        changes: ProjectChanges,
    ) -> Result<Option<Project>, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(project) = state.projects.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(project);
        project.updated_at = Utc::now();
        Ok(Some(project.clone()))
    }

    async fn set_project_published(
        &self,
        id: Uuid,
        published: bool,
        publish_url: Option<String>,
    ) -> Result<Option<Project>, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(project) = state.projects.get_mut(&id) else {
            return Ok(None);
        };
        project.is_published = published;
        project.publish_url = publish_url;
        project.updated_at = Utc::now();
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.projects.remove(&id).is_none() {
            return Ok(false);
        }
        for activity in state.activities.iter_mut() {
            if activity.project_id == Some(id) {
                activity.project_id = None;
            }
        }
        Ok(true)
    }

    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&asset.organization_id) {
            return Err(DatabaseError::NotFound("Organization".into()));
        }
        let now = Utc::now();
        let created = Asset {
            id: Uuid::new_v4(),
            organization_id: asset.organization_id,
            name: asset.name,
            asset_type: asset.asset_type,
            storage_key: asset.storage_key,
            ion_asset_id: asset.ion_asset_id,
            integration_id: None,
            file_size: asset.file_size,
            metadata: asset.metadata,
            uploaded_by: asset.uploaded_by,
            created_at: now,
            updated_at: now,
        };
        state.assets.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, DatabaseError> {
        Ok(self.state.read().await.assets.get(&id).cloned())
    }

    async fn list_assets(&self, organization_id: Uuid) -> Result<Vec<Asset>, DatabaseError> {
        let state = self.state.read().await;
        let mut assets: Vec<Asset> = state
            .assets
            .values()
            .filter(|a| a.organization_id == organization_id)
            .cloned()
            .collect();
        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assets)
    }

    async fn storage_used(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .assets
            .values()
            .filter(|a| a.organization_id == organization_id && a.storage_key.is_some())
            .map(|a| a.file_size)
            .sum())
    }

    async fn update_asset_metadata(
        &self,
        id: Uuid,
        metadata: AssetMetadata,
    ) -> Result<Option<Asset>, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(asset) = state.assets.get_mut(&id) else {
            return Ok(None);
        };
        asset.metadata = metadata;
        asset.updated_at = Utc::now();
        Ok(Some(asset.clone()))
    }

    async fn delete_asset(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.state.write().await.assets.remove(&id).is_some())
    }

    async fn apply_ion_sync(
        &self,
        organization_id: Uuid,
        integration_id: Uuid,
        remote: Vec<IonAssetUpsert>,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncReport, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.integrations.contains_key(&integration_id) {
            return Err(DatabaseError::NotFound("Integration".into()));
        }

        let mut report = SyncReport::default();
        for entry in remote {
            let existing = state
                .assets
                .values_mut()
                .find(|a| a.organization_id == organization_id && a.ion_asset_id == Some(entry.ion_asset_id));

            match existing {
                Some(asset) if asset.differs_from(&entry) => {
                    asset.name = entry.name;
                    asset.asset_type = entry.asset_type;
                    asset.file_size = entry.file_size;
                    asset.metadata.ion = Some(entry.details);
                    asset.integration_id = Some(integration_id);
                    asset.updated_at = synced_at;
                    report.updated += 1;
                }
                Some(_) => report.unchanged += 1,
                None => {
                    let asset = Asset {
                        id: Uuid::new_v4(),
                        organization_id,
                        name: entry.name,
                        asset_type: entry.asset_type,
                        storage_key: None,
                        ion_asset_id: Some(entry.ion_asset_id),
                        integration_id: Some(integration_id),
                        file_size: entry.file_size,
                        metadata: AssetMetadata {
                            ion: Some(entry.details),
                            ..AssetMetadata::default()
                        },
                        uploaded_by: None,
                        created_at: synced_at,
                        updated_at: synced_at,
                    };
                    state.assets.insert(asset.id, asset);
                    report.created += 1;
                }
            }
        }

        if let Some(integration) = state.integrations.get_mut(&integration_id) {
            integration.last_synced_at = Some(synced_at);
            integration.updated_at = synced_at;
        }
        Ok(report)
    }

    async fn create_integration(
        &self,
        integration: NewIntegration,
    ) -> Result<CesiumIonIntegration, DatabaseError> {
        let mut state = self.state.write().await;
        if !state.organizations.contains_key(&integration.organization_id) {
            return Err(DatabaseError::NotFound("Organization".into()));
        }
        let now = Utc::now();
        let created = CesiumIonIntegration {
            id: Uuid::new_v4(),
            organization_id: integration.organization_id,
            name: integration.name,
            access_token: integration.access_token,
            token_valid: integration.token_valid,
            last_synced_at: None,
            created_by: integration.created_by,
            created_at: now,
            updated_at: now,
        };
        state.integrations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_integration(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CesiumIonIntegration>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .integrations
            .get(&id)
            .filter(|i| i.organization_id == organization_id)
            .cloned())
    }

    async fn list_integrations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<CesiumIonIntegration>, DatabaseError> {
        let state = self.state.read().await;
        let mut integrations: Vec<CesiumIonIntegration> = state
            .integrations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        integrations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(integrations)
    }

    async fn count_integrations(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .integrations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .count() as i64)
    }

    async fn set_integration_token_valid(&self, id: Uuid, valid: bool) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if let Some(integration) = state.integrations.get_mut(&id) {
            integration.token_valid = valid;
            integration.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_integration(&self, organization_id: Uuid, id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        match state.integrations.get(&id) {
            Some(i) if i.organization_id == organization_id => {
                state.integrations.remove(&id);
                for asset in state.assets.values_mut() {
                    if asset.integration_id == Some(id) {
                        asset.integration_id = None;
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, DatabaseError> {
        let mut state = self.state.write().await;
        // Events queued before a project delete land after it
        let project_id = activity.project_id.filter(|id| state.projects.contains_key(id));
        let created = Activity {
            id: Uuid::new_v4(),
            organization_id: activity.organization_id,
            project_id,
            actor_id: activity.actor_id,
            entity_type: activity.entity_type,
            entity_id: activity.entity_id,
            action: activity.action,
            message: activity.message,
            metadata: activity.metadata,
            created_at: Utc::now(),
        };
        state.activities.push(created.clone());
        Ok(created)
    }

    async fn list_activity(
        &self,
        organization_id: Uuid,
        query: &ActivityQuery,
    ) -> Result<(Vec<Activity>, i64), DatabaseError> {
        let state = self.state.read().await;
        // Stored in insertion order; walk backwards for newest first
        let matching: Vec<&Activity> = state
            .activities
            .iter()
            .rev()
            .filter(|a| a.organization_id == organization_id && query.matches(a))
            .collect();
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(query.skip.max(0) as usize)
            .take(query.take.max(0) as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityAction, EntityType};

    async fn store_with_user() -> (MemoryStore, User, Organization) {
        let store = MemoryStore::with_plans(Plan::default_catalog());
        let (user, workspace) = store
            .create_user_with_workspace(
                NewUser {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                    password_hash: None,
                },
                NewOrganization {
                    name: "Ada's Workspace".into(),
                    slug: "ada-1234".into(),
                    is_personal: true,
                    plan_code: "free".into(),
                },
            )
            .await
            .unwrap();
        (store, user, workspace)
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_regardless_of_case() {
        let (store, _, _) = store_with_user().await;
        let err = store
            .create_user_with_workspace(
                NewUser {
                    email: "ADA@example.com".into(),
                    name: "Other".into(),
                    password_hash: None,
                },
                NewOrganization {
                    name: "x".into(),
                    slug: "other-1".into(),
                    is_personal: true,
                    plan_code: "free".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
        assert_eq!(
            store.find_user_by_email("ada@example.com").await.unwrap().unwrap().name,
            "Ada"
        );
    }

    #[tokio::test]
    async fn last_owner_cannot_be_removed_or_demoted() {
        let (store, user, workspace) = store_with_user().await;

        let err = store.remove_member(workspace.id, user.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::LastOwner));
        let err = store
            .update_member_role(workspace.id, user.id, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::LastOwner));

        let membership = store.find_membership(workspace.id, user.id).await.unwrap();
        assert_eq!(membership.unwrap().role, Role::Owner);
    }

    #[tokio::test]
    async fn deleting_a_project_keeps_its_activity() {
        let (store, user, workspace) = store_with_user().await;
        let project = store
            .create_project(NewProject {
                organization_id: workspace.id,
                title: "Harbor".into(),
                description: None,
                created_by: user.id,
            })
            .await
            .unwrap();
        store
            .insert_activity(NewActivity {
                organization_id: workspace.id,
                project_id: Some(project.id),
                actor_id: user.id,
                entity_type: EntityType::Project,
                entity_id: project.id.to_string(),
                action: ActivityAction::Created,
                message: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(store.delete_project(project.id).await.unwrap());

        let (items, total) = store
            .list_activity(
                workspace.id,
                &ActivityQuery {
                    take: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].project_id, None);
        assert_eq!(items[0].actor_id, user.id);
        assert_eq!(items[0].entity_id, project.id.to_string());
    }

    #[tokio::test]
    async fn expired_invites_are_deleted_when_listed() {
        let (store, user, workspace) = store_with_user().await;
        let now = Utc::now();
        for (email, expires_at) in [
            ("late@example.com", now - chrono::Duration::hours(1)),
            ("soon@example.com", now + chrono::Duration::hours(1)),
        ] {
            store
                .create_invite(NewInvite {
                    organization_id: workspace.id,
                    email: email.into(),
                    role: Role::Member,
                    token_hash: format!("hash-{}", email),
                    invited_by: user.id,
                    expires_at,
                })
                .await
                .unwrap();
        }

        let pending = store.list_pending_invites(workspace.id, now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "soon@example.com");
        assert!(store
            .find_invite_by_token_hash("hash-late@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn activity_for_a_missing_project_has_no_project_link() {
        let (store, user, workspace) = store_with_user().await;
        let gone = Uuid::new_v4();
        let row = store
            .insert_activity(NewActivity {
                organization_id: workspace.id,
                project_id: Some(gone),
                actor_id: user.id,
                entity_type: EntityType::Project,
                entity_id: gone.to_string(),
                action: ActivityAction::Updated,
                message: Some("Updated project".into()),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert_eq!(row.project_id, None);
    }
}
