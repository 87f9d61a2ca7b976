//! Organization membership checks. Every call reads the store; nothing is
//! cached between requests, so a removed member loses access immediately.

use uuid::Uuid;

use crate::database::models::OrganizationMember;
use crate::database::{DatabaseError, Store};
use crate::error::ApiError;
use crate::types::Role;

pub async fn is_member(store: &dyn Store, user_id: Uuid, organization_id: Uuid) -> Result<bool, DatabaseError> {
    Ok(store.find_membership(organization_id, user_id).await?.is_some())
}

pub async fn has_role_at_least(
    store: &dyn Store,
    user_id: Uuid,
    organization_id: Uuid,
    required: Role,
) -> Result<bool, DatabaseError> {
    Ok(store
        .find_membership(organization_id, user_id)
        .await?
        .is_some_and(|m| m.role.at_least(required)))
}

pub async fn require_member(
    store: &dyn Store,
    user_id: Uuid,
    organization_id: Uuid,
) -> Result<OrganizationMember, ApiError> {
    store
        .find_membership(organization_id, user_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("Not a member of this organization"))
}

pub async fn require_role(
    store: &dyn Store,
    user_id: Uuid,
    organization_id: Uuid,
    required: Role,
) -> Result<OrganizationMember, ApiError> {
    let membership = require_member(store, user_id, organization_id).await?;
    if !membership.role.at_least(required) {
        return Err(ApiError::forbidden(format!(
            "Requires the {} role in this organization",
            required
        )));
    }
    Ok(membership)
}
