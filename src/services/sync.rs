//! Cesium ion integrations and catalog sync.
//!
//! A sync reads the whole remote catalog before touching the store, then
//! reconciles it in one store call. Remote failures therefore never leave
//! a partial import behind.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{CesiumIonIntegration, IonAssetUpsert, NewIntegration, SyncReport};
use crate::error::ApiError;
use crate::integrations::ion::IonError;
use crate::middleware::AuthUser;
use crate::services::activity::ActivityEvent;
use crate::services::membership;
use crate::services::plan_gate::{self, QuotaDimension};
use crate::types::{ActivityAction, EntityType, Role};

const DEFAULT_NAME: &str = "Cesium ion";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegration {
    pub name: Option<String>,
    pub access_token: String,
}

/// Stores the credential after probing it. A rejected token is stored as
/// invalid so the integration can be reauthorized later.
pub async fn create_integration(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    input: CreateIntegration,
) -> Result<CesiumIonIntegration, ApiError> {
    let store = state.store.as_ref();
    membership::require_role(store, user.id, organization_id, Role::Admin).await?;

    let access_token = input.access_token.trim().to_string();
    if access_token.is_empty() {
        return Err(ApiError::invalid_field("accessToken", "must not be empty"));
    }
    let name = input
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());

    let organization = store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    let plan = plan_gate::plan_for(store, &organization).await?;
    let count = store.count_integrations(organization_id).await?;
    plan_gate::check_quota(
        &user.email,
        &state.config.security.privileged_operators,
        &plan,
        QuotaDimension::Integrations,
        count + 1,
    )?;

    let token_valid = match state.ion.verify_token(&access_token).await {
        Ok(()) => true,
        Err(IonError::Unauthorized) => false,
        Err(e) => return Err(e.into()),
    };

    let integration = store
        .create_integration(NewIntegration {
            organization_id,
            name,
            access_token,
            token_valid,
            created_by: user.id,
        })
        .await?;

    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::DataSource,
            integration.id,
            ActivityAction::Created,
        )
        .message(format!("Connected {}", integration.name))
        .metadata(json!({ "tokenValid": token_valid })),
    );
    Ok(integration)
}

pub async fn list_integrations(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
) -> Result<Vec<CesiumIonIntegration>, ApiError> {
    membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Admin).await?;
    Ok(state.store.list_integrations(organization_id).await?)
}

/// Synced assets stay; they only lose their integration link
pub async fn delete_integration(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    integration_id: Uuid,
) -> Result<(), ApiError> {
    membership::require_role(state.store.as_ref(), user.id, organization_id, Role::Admin).await?;
    if !state
        .store
        .delete_integration(organization_id, integration_id)
        .await?
    {
        return Err(ApiError::not_found("Integration not found"));
    }

    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::DataSource,
            integration_id,
            ActivityAction::Deleted,
        )
        .message("Disconnected Cesium ion"),
    );
    Ok(())
}

pub async fn sync(
    state: &AppState,
    user: &AuthUser,
    organization_id: Uuid,
    integration_id: Uuid,
) -> Result<SyncReport, ApiError> {
    let store = state.store.as_ref();
    membership::require_role(store, user.id, organization_id, Role::Admin).await?;

    let integration = store
        .find_integration(organization_id, integration_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Integration not found"))?;
    if !integration.token_valid {
        return Err(ApiError::reauthorize(
            "Cesium ion token is invalid, reauthorize the integration",
        ));
    }

    let remote = match state.ion.list_assets(&integration.access_token).await {
        Ok(assets) => assets,
        Err(IonError::Unauthorized) => {
            warn!("Cesium ion rejected the token of integration {}", integration.id);
            store.set_integration_token_valid(integration.id, false).await?;
            return Err(IonError::Unauthorized.into());
        }
        Err(e) => return Err(e.into()),
    };

    let upserts: Vec<IonAssetUpsert> = remote.into_iter().map(IonAssetUpsert::from).collect();
    let fetched = upserts.len();
    let report = store
        .apply_ion_sync(organization_id, integration.id, upserts, Utc::now())
        .await?;

    info!(
        "Synced {} ion assets for organization {} (created={}, updated={}, unchanged={})",
        fetched, organization_id, report.created, report.updated, report.unchanged
    );
    state.activity.record(
        ActivityEvent::new(
            organization_id,
            user.id,
            EntityType::DataSource,
            integration.id,
            ActivityAction::Updated,
        )
        .message(format!("Synced {} assets from Cesium ion", fetched))
        .metadata(json!(report)),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::{NewOrganization, NewUser, Plan};
    use crate::database::{MemoryStore, Store};
    use crate::integrations::ion::{IonAsset, IonCatalog};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeCatalog {
        assets: Vec<IonAsset>,
        reject: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl IonCatalog for FakeCatalog {
        async fn verify_token(&self, _token: &str) -> Result<(), IonError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(IonError::Unauthorized);
            }
            Ok(())
        }

        async fn list_assets(&self, _token: &str) -> Result<Vec<IonAsset>, IonError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(IonError::Unauthorized);
            }
            if self.fail {
                return Err(IonError::Status(503));
            }
            Ok(self.assets.clone())
        }
    }

    fn ion_asset(id: i64, name: &str) -> IonAsset {
        IonAsset {
            id,
            name: name.to_string(),
            asset_type: "3DTILES".into(),
            description: String::new(),
            attribution: String::new(),
            bytes: 1024,
            status: "COMPLETE".into(),
            percent_complete: Some(100),
        }
    }

    async fn setup(catalog: FakeCatalog) -> (AppState, AuthUser, Uuid) {
        let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
        let (user, org) = store
            .create_user_with_workspace(
                NewUser {
                    email: "owner@example.com".into(),
                    name: "Owner".into(),
                    password_hash: None,
                },
                NewOrganization {
                    name: "Owner's Workspace".into(),
                    slug: "owner-000000".into(),
                    is_personal: true,
                    plan_code: "free".into(),
                },
            )
            .await
            .unwrap();
        let state = AppState::new(store, AppConfig::from_env(), Arc::new(catalog));
        let user = AuthUser {
            id: user.id,
            email: user.email,
            name: user.name,
        };
        (state, user, org.id)
    }

    fn catalog(assets: Vec<IonAsset>) -> FakeCatalog {
        FakeCatalog {
            assets,
            reject: AtomicBool::new(false),
            fail: false,
        }
    }

    #[tokio::test]
    async fn second_sync_reports_unchanged() {
        let (state, user, org) = setup(catalog(vec![ion_asset(1, "City"), ion_asset(2, "Terrain")])).await;
        let integration = create_integration(
            &state,
            &user,
            org,
            CreateIntegration {
                name: None,
                access_token: "tok".into(),
            },
        )
        .await
        .unwrap();
        assert!(integration.token_valid);

        let first = sync(&state, &user, org, integration.id).await.unwrap();
        assert_eq!((first.created, first.updated, first.unchanged), (2, 0, 0));

        let second = sync(&state, &user, org, integration.id).await.unwrap();
        assert_eq!((second.created, second.updated, second.unchanged), (0, 0, 2));

        let assets = state.store.list_assets(org).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert!(assets.iter().all(|a| a.storage_key.is_none()));
        assert_eq!(state.store.storage_used(org).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_token_needs_reauthorization_and_writes_nothing() {
        let (state, user, org) = setup(catalog(vec![ion_asset(1, "City")])).await;
        let integration = create_integration(
            &state,
            &user,
            org,
            CreateIntegration {
                name: Some("Main".into()),
                access_token: "tok".into(),
            },
        )
        .await
        .unwrap();

        // Token revoked upstream after it was stored
        let ion = FakeCatalog {
            assets: vec![ion_asset(1, "City")],
            reject: AtomicBool::new(true),
            fail: false,
        };
        let state = AppState {
            ion: Arc::new(ion),
            ..state
        };

        let err = sync(&state, &user, org, integration.id).await.unwrap_err();
        assert_eq!(err.error_code(), "REAUTHORIZE_REQUIRED");
        assert!(state.store.list_assets(org).await.unwrap().is_empty());

        let stored = state.store.find_integration(org, integration.id).await.unwrap().unwrap();
        assert!(!stored.token_valid);
        assert!(stored.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn upstream_outage_is_a_bad_gateway_with_no_writes() {
        let (state, user, org) = setup(FakeCatalog {
            assets: vec![ion_asset(1, "City")],
            reject: AtomicBool::new(false),
            fail: true,
        })
        .await;
        let integration = create_integration(
            &state,
            &user,
            org,
            CreateIntegration {
                name: None,
                access_token: "tok".into(),
            },
        )
        .await
        .unwrap();

        let err = sync(&state, &user, org, integration.id).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(state.store.list_assets(org).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn free_plan_allows_one_integration() {
        let (state, user, org) = setup(catalog(Vec::new())).await;
        let input = || CreateIntegration {
            name: None,
            access_token: "tok".into(),
        };
        create_integration(&state, &user, org, input()).await.unwrap();
        let err = create_integration(&state, &user, org, input()).await.unwrap_err();
        assert_eq!(err.error_code(), "LIMIT_EXCEEDED");
    }
}
