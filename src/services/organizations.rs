//! Organizations, their members and invites.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{self, password::random_suffix};
use crate::database::models::{
    MemberWithUser, NewInvite, NewOrganization, Organization, OrganizationInvite,
    OrganizationMember, OrganizationWithRole,
};
use crate::database::models::user::normalize_email;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::activity::ActivityEvent;
use crate::services::membership;
use crate::services::plan_gate::{self, QuotaDimension};
use crate::types::{ActivityAction, EntityType, Role, SubscriptionStatus};

pub const MAX_NAME_LEN: usize = 120;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganization {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionUsage {
    pub dimension: QuotaDimension,
    pub usage: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub organization_id: Uuid,
    pub plan_code: String,
    pub unlimited: bool,
    pub dimensions: Vec<DimensionUsage>,
}

/// Invite as returned to the inviter. The plain token is only ever in this
/// response; the store keeps its hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInvite {
    #[serde(flatten)]
    pub invite: OrganizationInvite,
    pub token: String,
}

pub fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::invalid_field(
            "name",
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}

/// Slugs are 2-48 characters of `[a-z0-9-]`, not starting or ending with `-`
pub fn validate_slug(slug: &str) -> Result<(), ApiError> {
    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(2..=48).contains(&slug.len()) || !valid_chars || slug.starts_with('-') || slug.ends_with('-') {
        return Err(ApiError::invalid_field(
            "slug",
            "must be 2-48 characters of lowercase letters, digits and hyphens",
        ));
    }
    Ok(())
}

/// Lowercase, hyphen-separated form of arbitrary text
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.truncate(40);
    slug.trim_matches('-').to_string()
}

/// Personal workspace slug: email local part plus a random suffix
pub fn personal_slug(email: &str) -> Result<String, ApiError> {
    let local = email.split('@').next().unwrap_or_default();
    let base = match slugify(local) {
        s if s.is_empty() => "workspace".to_string(),
        s => s,
    };
    Ok(format!("{}-{}", base, random_suffix(6)?))
}

pub async fn list_for_user(state: &AppState, user: &AuthUser) -> Result<Vec<OrganizationWithRole>, ApiError> {
    Ok(state.store.list_organizations_for_user(user.id).await?)
}

/// Team organization with the caller as its first owner
pub async fn create(
    state: &AppState,
    user: &AuthUser,
    input: CreateOrganization,
) -> Result<Organization, ApiError> {
    let name = validate_name(&input.name)?;
    let slug = match input.slug {
        Some(slug) => {
            let slug = slug.trim().to_lowercase();
            validate_slug(&slug)?;
            slug
        }
        None => match slugify(&name) {
            s if s.len() >= 2 => format!("{}-{}", s, random_suffix(4)?),
            _ => format!("org-{}", random_suffix(8)?),
        },
    };

    let organization = state
        .store
        .create_organization(
            NewOrganization {
                name,
                slug,
                is_personal: false,
                plan_code: "free".to_string(),
            },
            user.id,
        )
        .await?;

    state.activity.record(
        ActivityEvent::new(
            organization.id,
            user.id,
            EntityType::Organization,
            organization.id,
            ActivityAction::Created,
        )
        .message(format!("Created organization {}", organization.name)),
    );
    Ok(organization)
}

pub async fn get(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
) -> Result<OrganizationWithRole, ApiError> {
    let membership = membership::require_member(state.store.as_ref(), user.id, organization_id).await?;
    let organization = state
        .store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    Ok(OrganizationWithRole {
        organization,
        role: membership.role,
    })
}

pub async fn rename(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    name: &str,
) -> Result<Organization, ApiError> {
    membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Admin).await?;
    let name = validate_name(name)?;

    let organization = state.store.rename_organization(organization_id, &name).await?;
    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::Organization,
            organization_id,
            ActivityAction::Renamed,
        )
        .message(format!("Renamed organization to {}", organization.name)),
    );
    Ok(organization)
}

/// Owners and operators only; everything scoped to the organization goes with it
pub async fn delete(state: &AppState, user: &AuthUser, organization_id: Uuid) -> Result<(), ApiError> {
    if !state.is_operator(&user.email) {
        membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Owner).await?;
    }
    if !state.store.delete_organization(organization_id).await? {
        return Err(ApiError::not_found("Organization not found"));
    }
    info!("{} deleted organization {}", user.email, organization_id);
    Ok(())
}

pub async fn usage(state: &AppState, user: &AuthUser, organization_id: Uuid) -> Result<UsageSummary, ApiError> {
    let OrganizationWithRole { organization, .. } = get(state, user, organization_id).await?;
    let plan = plan_gate::plan_for(state.store.as_ref(), &organization).await?;

    let mut dimensions = Vec::with_capacity(QuotaDimension::ALL.len());
    for dimension in QuotaDimension::ALL {
        dimensions.push(DimensionUsage {
            dimension,
            usage: plan_gate::current_usage(state.store.as_ref(), organization_id, dimension).await?,
            limit: plan.limit(dimension),
        });
    }

    Ok(UsageSummary {
        organization_id,
        plan_code: plan.code,
        unlimited: plan_gate::has_unlimited_access(&user.email, &state.config.security.privileged_operators),
        dimensions,
    })
}

/// Operator-only plan and subscription change
pub async fn change_license(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    plan_code: &str,
    status: SubscriptionStatus,
) -> Result<Organization, ApiError> {
    if !state.is_operator(&user.email) {
        return Err(ApiError::forbidden("Only platform operators may change licenses"));
    }

    let previous = state
        .store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let plan_code = plan_code.trim();
    if state.store.find_plan(plan_code).await?.is_none() {
        return Err(ApiError::invalid_field("planCode", format!("unknown plan '{}'", plan_code)));
    }
    let organization = state
        .store
        .update_license(organization_id, plan_code, status)
        .await?;

    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::Organization,
            organization_id,
            ActivityAction::Updated,
        )
        .message(format!("License changed to {}", organization.plan_code))
        .metadata(json!({
            "previousPlan": previous.plan_code,
            "plan": organization.plan_code,
            "subscriptionStatus": organization.subscription_status,
        })),
    );
    Ok(organization)
}

// Members

pub async fn list_members(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
) -> Result<Vec<MemberWithUser>, ApiError> {
    membership::require_member(state.store.as_ref(), user.id, organization_id).await?;
    Ok(state.store.list_members(organization_id).await?)
}

/// Admins move people between member and admin; granting or revoking
/// ownership takes an owner.
pub async fn change_role(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    target_user_id: Uuid,
    role: Role,
) -> Result<OrganizationMember, ApiError> {
    let actor = membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Admin).await?;
    let target = state
        .store
        .find_membership(organization_id, target_user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    if (target.role == Role::Owner || role == Role::Owner) && actor.role != Role::Owner {
        return Err(ApiError::forbidden("Only owners may grant or revoke the owner role"));
    }
    if target.role == role {
        return Ok(target);
    }

    let updated = state
        .store
        .update_member_role(organization_id, target_user_id, role)
        .await?;

    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::User,
            target_user_id,
            ActivityAction::Updated,
        )
        .message(format!("Changed role from {} to {}", target.role, role))
        .metadata(json!({ "from": target.role, "to": role })),
    );
    Ok(updated)
}

/// Removing yourself is leaving and needs no role. Removing someone else
/// takes an admin, and removing an owner takes an owner.
pub async fn remove_member(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    target_user_id: Uuid,
) -> Result<(), ApiError> {
    let store = state.store.as_ref();
    let actor = membership::require_member(store, user.id, organization_id).await?;

    if target_user_id != user.id {
        if !actor.role.at_least(Role::Admin) {
            return Err(ApiError::forbidden("Requires the admin role in this organization"));
        }
        let target = store
            .find_membership(organization_id, target_user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Member not found"))?;
        if target.role == Role::Owner && actor.role != Role::Owner {
            return Err(ApiError::forbidden("Admins cannot remove an owner"));
        }
    }

    if !store.remove_member(organization_id, target_user_id).await? {
        return Err(ApiError::not_found("Member not found"));
    }

    let message = if target_user_id == user.id {
        "Left the organization"
    } else {
        "Removed member"
    };
    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::User,
            target_user_id,
            ActivityAction::Removed,
        )
        .message(message),
    );
    Ok(())
}

// Invites

pub async fn create_invite(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    email: &str,
    role: Role,
) -> Result<CreatedInvite, ApiError> {
    let store = state.store.as_ref();
    let actor = membership::require_role(store, user.id, organization_id, Role::Admin).await?;
    if role == Role::Owner && actor.role != Role::Owner {
        return Err(ApiError::forbidden("Only owners may invite owners"));
    }

    let email = normalize_email(email);
    if !is_plausible_email(&email) {
        return Err(ApiError::invalid_field("email", "must be a valid email address"));
    }
    if let Some(existing) = store.find_user_by_email(&email).await? {
        if store.find_membership(organization_id, existing.id).await?.is_some() {
            return Err(ApiError::conflict("Already a member of this organization"));
        }
    }

    let pending = store.list_pending_invites(organization_id, Utc::now()).await?;
    if pending.iter().any(|invite| normalize_email(&invite.email) == email) {
        return Err(ApiError::conflict("An invite for this email is already pending"));
    }

    let organization = store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let plan = plan_gate::plan_for(store, &organization).await?;
    let seats = plan_gate::current_usage(store, organization_id, QuotaDimension::Seats).await?;
    plan_gate::check_quota(
        &user.email,
        &state.config.security.privileged_operators,
        &plan,
        QuotaDimension::Seats,
        seats + 1,
    )?;

    let token = auth::random_token()?;
    let invite = store
        .create_invite(NewInvite {
            organization_id,
            email: email.clone(),
            role,
            token_hash: auth::hash_token(&token),
            invited_by: user.id,
            expires_at: Utc::now() + Duration::hours(state.config.security.invite_expiry_hours as i64),
        })
        .await?;

    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::Organization,
            organization_id,
            ActivityAction::Updated,
        )
        .message(format!("Invited {} as {}", email, role)),
    );
    Ok(CreatedInvite { invite, token })
}

pub async fn list_invites(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
) -> Result<Vec<OrganizationInvite>, ApiError> {
    membership::require_member(state.store.as_ref(), user.id, organization_id).await?;
    Ok(state.store.list_pending_invites(organization_id, Utc::now()).await?)
}

pub async fn revoke_invite(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    invite_id: Uuid,
) -> Result<(), ApiError> {
    membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Admin).await?;
    if !state.store.delete_invite(organization_id, invite_id).await? {
        return Err(ApiError::not_found("Invite not found"));
    }
    Ok(())
}

/// Turns a pending invite addressed to the session user into a membership
pub async fn accept_invite(state: &AppState, user: &AuthUser, token: &str) -> Result<OrganizationMember, ApiError> {
    let store = state.store.as_ref();
    let invite = store
        .find_invite_by_token_hash(&auth::hash_token(token.trim()))
        .await?
        .ok_or_else(|| ApiError::not_found("Invite not found or expired"))?;
    if !invite.is_pending(Utc::now()) {
        store.delete_invite(invite.organization_id, invite.id).await?;
        return Err(ApiError::not_found("Invite not found or expired"));
    }

    if normalize_email(&invite.email) != normalize_email(&user.email) {
        return Err(ApiError::forbidden("This invite was sent to a different email address"));
    }
    if store.find_membership(invite.organization_id, user.id).await?.is_some() {
        return Err(ApiError::conflict("Already a member of this organization"));
    }

    let organization = store
        .find_organization(invite.organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let plan = plan_gate::plan_for(store, &organization).await?;
    let members = store.count_members(invite.organization_id).await?;
    plan_gate::check_quota(
        &user.email,
        &state.config.security.privileged_operators,
        &plan,
        QuotaDimension::Seats,
        members + 1,
    )?;

    let member = store.accept_invite(&invite, user.id).await?;
    state.activity.record(
        ActivityEvent::new(
            invite.organization_id,
            user.id,
            EntityType::User,
            user.id,
            ActivityAction::Added,
        )
        .message(format!("Joined as {}", member.role)),
    );
    Ok(member)
}

pub(crate) fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(validate_slug("acme").is_ok());
        assert!(validate_slug("acme-2").is_ok());
        assert!(validate_slug("a").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("acme_corp").is_err());
        assert!(validate_slug(&"a".repeat(49)).is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Acme  Mapping, Inc."), "acme-mapping-inc");
        assert_eq!(slugify("ada.lovelace"), "ada-lovelace");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn personal_slug_has_random_suffix() {
        let slug = personal_slug("Ada.Lovelace@example.com").unwrap();
        assert!(slug.starts_with("ada-lovelace-"));
        assert_eq!(slug.len(), "ada-lovelace-".len() + 6);
        assert!(validate_slug(&slug).is_ok());

        assert!(personal_slug("+++@example.com").unwrap().starts_with("workspace-"));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Acme ").unwrap(), "Acme");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("nobody"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@localhost"));
    }

    mod invites {
        use super::super::*;
        use crate::config::AppConfig;
        use crate::database::models::{NewUser, Plan};
        use crate::database::{MemoryStore, Store};
        use crate::integrations::IonClient;
        use std::sync::Arc;

        async fn add_user(store: &MemoryStore, email: &str) -> (AuthUser, Uuid) {
            let local = email.split('@').next().unwrap_or_default();
            let (user, org) = store
                .create_user_with_workspace(
                    NewUser {
                        email: email.into(),
                        name: local.into(),
                        password_hash: None,
                    },
                    NewOrganization {
                        name: format!("{}'s Workspace", local),
                        slug: format!("{}-000000", local),
                        is_personal: true,
                        plan_code: "free".into(),
                    },
                )
                .await
                .unwrap();
            let user = AuthUser {
                id: user.id,
                email: user.email,
                name: user.name,
            };
            (user, org.id)
        }

        async fn state_with(store: Arc<MemoryStore>) -> AppState {
            let ion = IonClient::new("http://127.0.0.1:9", 1).unwrap();
            AppState::new(store, AppConfig::from_env(), Arc::new(ion))
        }

        #[tokio::test]
        async fn expired_invite_is_missing_and_deleted_on_accept() {
            let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
            let (owner, org) = add_user(&store, "host@example.com").await;
            let (guest, _) = add_user(&store, "guest@example.com").await;
            let state = state_with(store.clone()).await;

            let token = "expired-token";
            store
                .create_invite(NewInvite {
                    organization_id: org,
                    email: guest.email.clone(),
                    role: Role::Member,
                    token_hash: auth::hash_token(token),
                    invited_by: owner.id,
                    expires_at: Utc::now() - Duration::minutes(5),
                })
                .await
                .unwrap();

            let err = accept_invite(&state, &guest, token).await.unwrap_err();
            assert_eq!(err.status_code(), 404);
            assert!(store
                .find_invite_by_token_hash(&auth::hash_token(token))
                .await
                .unwrap()
                .is_none());
            assert!(store.find_membership(org, guest.id).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn second_pending_invite_to_the_same_email_conflicts() {
            let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
            let (owner, org) = add_user(&store, "lead@example.com").await;
            let state = state_with(store.clone()).await;

            create_invite(&state, &owner, org, "crew@example.com", Role::Member)
                .await
                .unwrap();
            let err = create_invite(&state, &owner, org, "Crew@Example.com", Role::Admin)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 409);
            assert_eq!(store.list_pending_invites(org, Utc::now()).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn owners_delete_but_members_do_not() {
            let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
            let (owner, org) = add_user(&store, "founder@example.com").await;
            let (member, _) = add_user(&store, "staff@example.com").await;
            let invite = store
                .create_invite(NewInvite {
                    organization_id: org,
                    email: member.email.clone(),
                    role: Role::Admin,
                    token_hash: auth::hash_token("staff-token"),
                    invited_by: owner.id,
                    expires_at: Utc::now() + Duration::hours(1),
                })
                .await
                .unwrap();
            store.accept_invite(&invite, member.id).await.unwrap();
            let state = state_with(store.clone()).await;

            let err = delete(&state, &member, org).await.unwrap_err();
            assert_eq!(err.status_code(), 403);
            assert!(store.find_organization(org).await.unwrap().is_some());

            delete(&state, &owner, org).await.unwrap();
            assert!(store.find_organization(org).await.unwrap().is_none());
        }
    }
}
