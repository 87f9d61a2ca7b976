use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::*;
use crate::scene::AssetMetadata;
use crate::types::{Role, SubscriptionStatus};

/// Persistence seam for every entity the API touches.
///
/// Methods that change more than one row (signup, organization creation,
/// invite acceptance, owner-protected membership changes, sync) are atomic:
/// either every row is written or none is.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    // Users

    /// Creates the user, their personal organization and the owner membership
    async fn create_user_with_workspace(
        &self,
        user: NewUser,
        workspace: NewOrganization,
    ) -> Result<(User, Organization), DatabaseError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// `email` must already be normalized
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    // Plans

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), DatabaseError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError>;

    async fn find_plan(&self, code: &str) -> Result<Option<Plan>, DatabaseError>;

    // Organizations

    /// Creates the organization with `owner` as its first owner
    async fn create_organization(
        &self,
        organization: NewOrganization,
        owner: Uuid,
    ) -> Result<Organization, DatabaseError>;

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, DatabaseError>;

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationWithRole>, DatabaseError>;

    async fn rename_organization(&self, id: Uuid, name: &str) -> Result<Organization, DatabaseError>;

    async fn update_license(
        &self,
        id: Uuid,
        plan_code: &str,
        status: SubscriptionStatus,
    ) -> Result<Organization, DatabaseError>;

    /// Removes the organization and everything scoped to it
    async fn delete_organization(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // Membership

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, DatabaseError>;

    async fn list_members(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, DatabaseError>;

    async fn count_members(&self, organization_id: Uuid) -> Result<i64, DatabaseError>;

    /// Fails with `LastOwner` when the change would leave no owner
    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, DatabaseError>;

    /// Fails with `LastOwner` when removing the only owner
    async fn remove_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool, DatabaseError>;

    // Invites

    async fn create_invite(&self, invite: NewInvite) -> Result<OrganizationInvite, DatabaseError>;

    /// Deletes the organization's expired invites, then returns the rest
    async fn list_pending_invites(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrganizationInvite>, DatabaseError>;

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OrganizationInvite>, DatabaseError>;

    async fn delete_invite(&self, organization_id: Uuid, invite_id: Uuid) -> Result<bool, DatabaseError>;

    /// Adds the membership and consumes the invite
    async fn accept_invite(
        &self,
        invite: &OrganizationInvite,
        user_id: Uuid,
    ) -> Result<OrganizationMember, DatabaseError>;

    // Projects

    async fn create_project(&self, project: NewProject) -> Result<Project, DatabaseError>;

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, DatabaseError>;

    async fn list_projects(&self, organization_ids: &[Uuid]) -> Result<Vec<Project>, DatabaseError>;

    async fn count_projects(&self, organization_id: Uuid) -> Result<i64, DatabaseError>;

    async fn update_project(
        &self,
        id: Uuid,
        changes: ProjectChanges,
    ) -> Result<Option<Project>, DatabaseError>;

    async fn set_project_published(
        &self,
        id: Uuid,
        published: bool,
        publish_url: Option<String>,
    ) -> Result<Option<Project>, DatabaseError>;

    /// Hard delete; activity rows keep their entries with no project
    async fn delete_project(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // Assets

    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, DatabaseError>;

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, DatabaseError>;

    async fn list_assets(&self, organization_id: Uuid) -> Result<Vec<Asset>, DatabaseError>;

    async fn storage_used(&self, organization_id: Uuid) -> Result<i64, DatabaseError>;

    async fn update_asset_metadata(
        &self,
        id: Uuid,
        metadata: AssetMetadata,
    ) -> Result<Option<Asset>, DatabaseError>;

    async fn delete_asset(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Additive reconciliation keyed on `(organization_id, ion_asset_id)`;
    /// never deletes local rows. Also stamps the integration's sync time.
    async fn apply_ion_sync(
        &self,
        organization_id: Uuid,
        integration_id: Uuid,
        remote: Vec<IonAssetUpsert>,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncReport, DatabaseError>;

    // Integrations

    async fn create_integration(
        &self,
        integration: NewIntegration,
    ) -> Result<CesiumIonIntegration, DatabaseError>;

    async fn find_integration(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CesiumIonIntegration>, DatabaseError>;

    async fn list_integrations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<CesiumIonIntegration>, DatabaseError>;

    async fn count_integrations(&self, organization_id: Uuid) -> Result<i64, DatabaseError>;

    async fn set_integration_token_valid(&self, id: Uuid, valid: bool) -> Result<(), DatabaseError>;

    async fn delete_integration(&self, organization_id: Uuid, id: Uuid) -> Result<bool, DatabaseError>;

    // Activity

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, DatabaseError>;

    /// Newest first, with the total count of matching rows
    async fn list_activity(
        &self,
        organization_id: Uuid,
        query: &ActivityQuery,
    ) -> Result<(Vec<Activity>, i64), DatabaseError>;
}
