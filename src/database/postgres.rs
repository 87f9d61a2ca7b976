use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::*;
use crate::database::store::Store;
use crate::scene::{AssetMetadata, SceneDocument};
use crate::types::{Role, SubscriptionStatus};

const ORGANIZATION_COLUMNS: &str =
    "id, name, slug, is_personal, plan_code, subscription_status, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, organization_id, title, description, is_published, publish_url, \
     scene_data, created_by, created_at, updated_at";
const ASSET_COLUMNS: &str = "id, organization_id, name, asset_type, storage_key, ion_asset_id, \
     integration_id, file_size, metadata, uploaded_by, created_at, updated_at";
const INVITE_COLUMNS: &str =
    "id, organization_id, email, role, token_hash, invited_by, expires_at, created_at";
const INTEGRATION_COLUMNS: &str = "id, organization_id, name, access_token, token_valid, \
     last_synced_at, created_by, created_at, updated_at";
const ACTIVITY_COLUMNS: &str = "id, organization_id, project_id, actor_id, entity_type, entity_id, \
     action, message, metadata, created_at";

/// Raw `projects` row; `scene_data` is decoded through the scene migrations
#[derive(FromRow)]
struct ProjectRow {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    description: Option<String>,
    is_published: bool,
    publish_url: Option<String>,
    scene_data: Json<Value>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = DatabaseError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let scene_data = SceneDocument::from_value(row.scene_data.0)
            .map_err(|e| DatabaseError::Corrupt(format!("project {}: {}", row.id, e)))?;
        Ok(Project {
            id: row.id,
            organization_id: row.organization_id,
            title: row.title,
            description: row.description,
            is_published: row.is_published,
            publish_url: row.publish_url,
            scene_data,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AssetRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    asset_type: String,
    storage_key: Option<String>,
    ion_asset_id: Option<i64>,
    integration_id: Option<Uuid>,
    file_size: i64,
    metadata: Json<Value>,
    uploaded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = DatabaseError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let metadata = AssetMetadata::from_value(row.metadata.0)
            .map_err(|e| DatabaseError::Corrupt(format!("asset {}: {}", row.id, e)))?;
        Ok(Asset {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            asset_type: row.asset_type,
            storage_key: row.storage_key,
            ion_asset_id: row.ion_asset_id,
            integration_id: row.integration_id,
            file_size: row.file_size,
            metadata,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn projects(rows: Vec<ProjectRow>) -> Result<Vec<Project>, DatabaseError> {
    rows.into_iter().map(Project::try_from).collect()
}

fn assets(rows: Vec<AssetRow>) -> Result<Vec<Asset>, DatabaseError> {
    rows.into_iter().map(Asset::try_from).collect()
}

/// Postgres-backed `Store`. All queries are runtime-checked so the crate
/// builds without a live database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_organization(
        tx: &mut Transaction<'static, Postgres>,
        organization: NewOrganization,
        owner: Uuid,
    ) -> Result<Organization, DatabaseError> {
        let plan_exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM plans WHERE code = $1)")
            .bind(&organization.plan_code)
            .fetch_one(&mut **tx)
            .await?;
        if !plan_exists.0 {
            return Err(DatabaseError::NotFound(format!("Plan '{}'", organization.plan_code)));
        }

        let slug = organization.slug.clone();
        let created: Organization = sqlx::query_as(&format!(
            "INSERT INTO organizations (id, name, slug, is_personal, plan_code)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            ORGANIZATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(organization.is_personal)
        .bind(&organization.plan_code)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| DatabaseError::from_unique(e, format!("Slug '{}' is already taken", slug)))?;

        sqlx::query(
            "INSERT INTO organization_members (organization_id, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(created.id)
        .bind(owner)
        .bind(Role::Owner)
        .execute(&mut **tx)
        .await?;

        Ok(created)
    }

    /// Locks the organization's owner rows and returns how many there are
    async fn lock_owners(
        tx: &mut Transaction<'static, Postgres>,
        organization_id: Uuid,
    ) -> Result<usize, DatabaseError> {
        let owners: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM organization_members
             WHERE organization_id = $1 AND role = 'owner'
             FOR UPDATE",
        )
        .bind(organization_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(owners.len())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user_with_workspace(
        &self,
        user: NewUser,
        workspace: NewOrganization,
    ) -> Result<(User, Organization), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let created: User = sqlx::query_as(
            "INSERT INTO users (id, email, name, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING id, email, name, password_hash, email_verified_at, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_unique(e, "An account with this email already exists"))?;

        let organization = Self::insert_organization(&mut tx, workspace, created.id).await?;
        tx.commit().await?;
        Ok((created, organization))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as(
            "SELECT id, email, name, password_hash, email_verified_at, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as(
            "SELECT id, email, name, password_hash, email_verified_at, created_at, updated_at
             FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO plans (code, name, included_storage_bytes, included_bandwidth_bytes,
                                included_seats, included_processing_jobs, included_projects,
                                included_integrations, monthly_price_cents, yearly_price_cents)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                included_storage_bytes = EXCLUDED.included_storage_bytes,
                included_bandwidth_bytes = EXCLUDED.included_bandwidth_bytes,
                included_seats = EXCLUDED.included_seats,
                included_processing_jobs = EXCLUDED.included_processing_jobs,
                included_projects = EXCLUDED.included_projects,
                included_integrations = EXCLUDED.included_integrations,
                monthly_price_cents = EXCLUDED.monthly_price_cents,
                yearly_price_cents = EXCLUDED.yearly_price_cents",
        )
        .bind(&plan.code)
        .bind(&plan.name)
        .bind(plan.included_storage_bytes)
        .bind(plan.included_bandwidth_bytes)
        .bind(plan.included_seats)
        .bind(plan.included_processing_jobs)
        .bind(plan.included_projects)
        .bind(plan.included_integrations)
        .bind(plan.monthly_price_cents)
        .bind(plan.yearly_price_cents)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError> {
        let plans = sqlx::query_as("SELECT * FROM plans ORDER BY monthly_price_cents, code")
            .fetch_all(&self.pool)
            .await?;
        Ok(plans)
    }

    async fn find_plan(&self, code: &str) -> Result<Option<Plan>, DatabaseError> {
        let plan = sqlx::query_as("SELECT * FROM plans WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    async fn create_organization(
        &self,
        organization: NewOrganization,
        owner: Uuid,
    ) -> Result<Organization, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_organization(&mut tx, organization, owner).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
        let organization = sqlx::query_as(&format!(
            "SELECT {} FROM organizations WHERE id = $1",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(organization)
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrganizationWithRole>, DatabaseError> {
        let list = sqlx::query_as(
            "SELECT o.id, o.name, o.slug, o.is_personal, o.plan_code, o.subscription_status,
                    o.created_at, o.updated_at, m.role
             FROM organizations o
             JOIN organization_members m ON m.organization_id = o.id
             WHERE m.user_id = $1
             ORDER BY o.is_personal DESC, o.created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(list)
    }

    async fn rename_organization(&self, id: Uuid, name: &str) -> Result<Organization, DatabaseError> {
        let organization: Option<Organization> = sqlx::query_as(&format!(
            "UPDATE organizations SET name = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        organization.ok_or_else(|| DatabaseError::NotFound("Organization".into()))
    }

    async fn update_license(
        &self,
        id: Uuid,
        plan_code: &str,
        status: SubscriptionStatus,
    ) -> Result<Organization, DatabaseError> {
        if self.find_plan(plan_code).await?.is_none() {
            return Err(DatabaseError::NotFound(format!("Plan '{}'", plan_code)));
        }
        let organization: Option<Organization> = sqlx::query_as(&format!(
            "UPDATE organizations
             SET plan_code = $2, subscription_status = $3, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .bind(plan_code)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        organization.ok_or_else(|| DatabaseError::NotFound("Organization".into()))
    }

    async fn delete_organization(&self, id: Uuid) -> Result<bool, DatabaseError> {
        // Child rows go with ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrganizationMember>, DatabaseError> {
        let member = sqlx::query_as(
            "SELECT organization_id, user_id, role, created_at
             FROM organization_members
             WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn list_members(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, DatabaseError> {
        let members = sqlx::query_as(
            "SELECT u.id AS user_id, u.email, u.name, m.role, m.created_at
             FROM organization_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.organization_id = $1
             ORDER BY m.role DESC, m.created_at",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn count_members(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM organization_members WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let owners = Self::lock_owners(&mut tx, organization_id).await?;

        let current: Option<(Role,)> = sqlx::query_as(
            "SELECT role FROM organization_members
             WHERE organization_id = $1 AND user_id = $2
             FOR UPDATE",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (current,) = current.ok_or_else(|| DatabaseError::NotFound("Member".into()))?;
        if current == Role::Owner && role != Role::Owner && owners <= 1 {
            return Err(DatabaseError::LastOwner);
        }

        let member = sqlx::query_as(
            "UPDATE organization_members SET role = $3
             WHERE organization_id = $1 AND user_id = $2
             RETURNING organization_id, user_id, role, created_at",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(member)
    }

    async fn remove_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let owners = Self::lock_owners(&mut tx, organization_id).await?;

        let current: Option<(Role,)> = sqlx::query_as(
            "SELECT role FROM organization_members
             WHERE organization_id = $1 AND user_id = $2
             FOR UPDATE",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((current,)) = current else {
            return Ok(false);
        };
        if current == Role::Owner && owners <= 1 {
            return Err(DatabaseError::LastOwner);
        }

        sqlx::query("DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn create_invite(&self, invite: NewInvite) -> Result<OrganizationInvite, DatabaseError> {
        let created = sqlx::query_as(&format!(
            "INSERT INTO organization_invites
                (id, organization_id, email, role, token_hash, invited_by, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            INVITE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(invite.organization_id)
        .bind(&invite.email)
        .bind(invite.role)
        .bind(&invite.token_hash)
        .bind(invite.invited_by)
        .bind(invite.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_unique(e, "Invite token collision, retry"))?;
        Ok(created)
    }

    async fn list_pending_invites(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrganizationInvite>, DatabaseError> {
        let expired = sqlx::query(
            "DELETE FROM organization_invites WHERE organization_id = $1 AND expires_at <= $2",
        )
        .bind(organization_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if expired.rows_affected() > 0 {
            debug!("Deleted {} expired invite(s) for organization {}", expired.rows_affected(), organization_id);
        }

        let invites = sqlx::query_as(&format!(
            "SELECT {} FROM organization_invites
             WHERE organization_id = $1 AND expires_at > $2
             ORDER BY created_at",
            INVITE_COLUMNS
        ))
        .bind(organization_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(invites)
    }

    async fn find_invite_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<OrganizationInvite>, DatabaseError> {
        let invite = sqlx::query_as(&format!(
            "SELECT {} FROM organization_invites WHERE token_hash = $1",
            INVITE_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    async fn delete_invite(&self, organization_id: Uuid, invite_id: Uuid) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM organization_invites WHERE id = $1 AND organization_id = $2")
                .bind(invite_id)
                .bind(organization_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accept_invite(
        &self,
        invite: &OrganizationInvite,
        user_id: Uuid,
    ) -> Result<OrganizationMember, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        // Consuming the invite first makes a concurrent second accept miss it
        let consumed = sqlx::query("DELETE FROM organization_invites WHERE id = $1")
            .bind(invite.id)
            .execute(&mut *tx)
            .await?;
        if consumed.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Invite".into()));
        }

        let member = sqlx::query_as(
            "INSERT INTO organization_members (organization_id, user_id, role)
             VALUES ($1, $2, $3)
             RETURNING organization_id, user_id, role, created_at",
        )
        .bind(invite.organization_id)
        .bind(user_id)
        .bind(invite.role)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_unique(e, "Already a member of this organization"))?;

        tx.commit().await?;
        Ok(member)
    }

    async fn create_project(&self, project: NewProject) -> Result<Project, DatabaseError> {
        let row: ProjectRow = sqlx::query_as(&format!(
            "INSERT INTO projects (id, organization_id, title, description, scene_data, created_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(project.organization_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(Json(SceneDocument::default().to_value()))
        .bind(project.created_by)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, DatabaseError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Project::try_from).transpose()
    }

    async fn list_projects(&self, organization_ids: &[Uuid]) -> Result<Vec<Project>, DatabaseError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE organization_id = ANY($1) ORDER BY updated_at DESC",
            PROJECT_COLUMNS
        ))
        .bind(organization_ids)
        .fetch_all(&self.pool)
        .await?;
        projects(rows)
    }

    async fn count_projects(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn update_project(
        &self,
        id: Uuid,
        changes: ProjectChanges,
    ) -> Result<Option<Project>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE id = $1 FOR UPDATE",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut project = Project::try_from(row)?;
        changes.apply(&mut project);

        let row: ProjectRow = sqlx::query_as(&format!(
            "UPDATE projects
             SET title = $2, description = $3, scene_data = $4, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(Json(project.scene_data.to_value()))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Project::try_from(row).map(Some)
    }

    async fn set_project_published(
        &self,
        id: Uuid,
        published: bool,
        publish_url: Option<String>,
    ) -> Result<Option<Project>, DatabaseError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "UPDATE projects
             SET is_published = $2, publish_url = $3, updated_at = now()
             WHERE id = $1
             RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .bind(published)
        .bind(publish_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Project::try_from).transpose()
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE activities SET project_id = NULL WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, DatabaseError> {
        let row: AssetRow = sqlx::query_as(&format!(
            "INSERT INTO assets
                (id, organization_id, name, asset_type, storage_key, ion_asset_id,
                 file_size, metadata, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            ASSET_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(asset.organization_id)
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(&asset.storage_key)
        .bind(asset.ion_asset_id)
        .bind(asset.file_size)
        .bind(Json(asset.metadata.to_value()))
        .bind(asset.uploaded_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_unique(e, "Asset is already registered"))?;
        row.try_into()
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<Asset>, DatabaseError> {
        let row: Option<AssetRow> =
            sqlx::query_as(&format!("SELECT {} FROM assets WHERE id = $1", ASSET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Asset::try_from).transpose()
    }

    async fn list_assets(&self, organization_id: Uuid) -> Result<Vec<Asset>, DatabaseError> {
        let rows: Vec<AssetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM assets WHERE organization_id = $1 ORDER BY created_at DESC",
            ASSET_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        assets(rows)
    }

    async fn storage_used(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let used: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(file_size)::BIGINT FROM assets
             WHERE organization_id = $1 AND storage_key IS NOT NULL",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(used.0.unwrap_or(0))
    }

    async fn update_asset_metadata(
        &self,
        id: Uuid,
        metadata: AssetMetadata,
    ) -> Result<Option<Asset>, DatabaseError> {
        let row: Option<AssetRow> = sqlx::query_as(&format!(
            "UPDATE assets SET metadata = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(Json(metadata.to_value()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Asset::try_from).transpose()
    }

    async fn delete_asset(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_ion_sync(
        &self,
        organization_id: Uuid,
        integration_id: Uuid,
        remote: Vec<IonAssetUpsert>,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncReport, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut report = SyncReport::default();

        for entry in remote {
            let existing: Option<AssetRow> = sqlx::query_as(&format!(
                "SELECT {} FROM assets
                 WHERE organization_id = $1 AND ion_asset_id = $2
                 FOR UPDATE",
                ASSET_COLUMNS
            ))
            .bind(organization_id)
            .bind(entry.ion_asset_id)
            .fetch_optional(&mut *tx)
            .await?;

            match existing.map(Asset::try_from).transpose()? {
                Some(asset) if asset.differs_from(&entry) => {
                    let mut metadata = asset.metadata;
                    metadata.ion = Some(entry.details);
                    sqlx::query(
                        "UPDATE assets
                         SET name = $2, asset_type = $3, file_size = $4, metadata = $5,
                             integration_id = $6, updated_at = $7
                         WHERE id = $1",
                    )
                    .bind(asset.id)
                    .bind(&entry.name)
                    .bind(&entry.asset_type)
                    .bind(entry.file_size)
                    .bind(Json(metadata.to_value()))
                    .bind(integration_id)
                    .bind(synced_at)
                    .execute(&mut *tx)
                    .await?;
                    report.updated += 1;
                }
                Some(_) => report.unchanged += 1,
                None => {
                    let metadata = AssetMetadata {
                        ion: Some(entry.details),
                        ..AssetMetadata::default()
                    };
                    sqlx::query(
                        "INSERT INTO assets
                            (id, organization_id, name, asset_type, ion_asset_id, integration_id,
                             file_size, metadata, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
                    )
                    .bind(Uuid::new_v4())
                    .bind(organization_id)
                    .bind(&entry.name)
                    .bind(&entry.asset_type)
                    .bind(entry.ion_asset_id)
                    .bind(integration_id)
                    .bind(entry.file_size)
                    .bind(Json(metadata.to_value()))
                    .bind(synced_at)
                    .execute(&mut *tx)
                    .await?;
                    report.created += 1;
                }
            }
        }

        let stamped = sqlx::query(
            "UPDATE cesium_ion_integrations SET last_synced_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(integration_id)
        .bind(synced_at)
        .execute(&mut *tx)
        .await?;
        if stamped.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Integration".into()));
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn create_integration(
        &self,
        integration: NewIntegration,
    ) -> Result<CesiumIonIntegration, DatabaseError> {
        let created = sqlx::query_as(&format!(
            "INSERT INTO cesium_ion_integrations
                (id, organization_id, name, access_token, token_valid, created_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            INTEGRATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(integration.organization_id)
        .bind(&integration.name)
        .bind(&integration.access_token)
        .bind(integration.token_valid)
        .bind(integration.created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_integration(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CesiumIonIntegration>, DatabaseError> {
        let integration = sqlx::query_as(&format!(
            "SELECT {} FROM cesium_ion_integrations WHERE id = $1 AND organization_id = $2",
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(integration)
    }

    async fn list_integrations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<CesiumIonIntegration>, DatabaseError> {
        let integrations = sqlx::query_as(&format!(
            "SELECT {} FROM cesium_ion_integrations WHERE organization_id = $1 ORDER BY created_at",
            INTEGRATION_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(integrations)
    }

    async fn count_integrations(&self, organization_id: Uuid) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cesium_ion_integrations WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn set_integration_token_valid(&self, id: Uuid, valid: bool) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE cesium_ion_integrations SET token_valid = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(valid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_integration(&self, organization_id: Uuid, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM cesium_ion_integrations WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_activity(&self, activity: NewActivity) -> Result<Activity, DatabaseError> {
        let created = sqlx::query_as(&format!(
            "INSERT INTO activities
                (id, organization_id, project_id, actor_id, entity_type, entity_id,
                 action, message, metadata)
             VALUES ($1, $2,
                     CASE WHEN EXISTS (SELECT 1 FROM projects WHERE id = $3) THEN $3 END,
                     $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            ACTIVITY_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(activity.organization_id)
        .bind(activity.project_id)
        .bind(activity.actor_id)
        .bind(activity.entity_type)
        .bind(&activity.entity_id)
        .bind(activity.action)
        .bind(&activity.message)
        .bind(&activity.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_activity(
        &self,
        organization_id: Uuid,
        query: &ActivityQuery,
    ) -> Result<(Vec<Activity>, i64), DatabaseError> {
        const FILTER: &str = "organization_id = $1
             AND ($2::uuid IS NULL OR project_id = $2)
             AND ($3::activity_entity_type IS NULL OR entity_type = $3)
             AND ($4::text IS NULL OR entity_id = $4)";

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM activities WHERE {}", FILTER))
            .bind(organization_id)
            .bind(query.project_id)
            .bind(query.entity_type)
            .bind(&query.entity_id)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as(&format!(
            "SELECT {} FROM activities WHERE {} ORDER BY created_at DESC, id OFFSET $5 LIMIT $6",
            ACTIVITY_COLUMNS, FILTER
        ))
        .bind(organization_id)
        .bind(query.project_id)
        .bind(query.entity_type)
        .bind(&query.entity_id)
        .bind(query.skip.max(0))
        .bind(query.take.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok((items, total.0))
    }
}
