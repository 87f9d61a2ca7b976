// handlers/elevated/operator.rs - Operator-only organization handlers

use axum::extract::{Extension, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiJson, ApiPath};
use crate::app::AppState;
use crate::database::models::Organization;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::organizations;
use crate::types::SubscriptionStatus;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest {
    pub plan_code: String,
    #[serde(default = "default_status")]
    pub subscription_status: SubscriptionStatus,
}

fn default_status() -> SubscriptionStatus {
    SubscriptionStatus::Active
}

/// PATCH /api/organizations/:org_id/license
///
/// ```json
/// { "planCode": "team", "subscriptionStatus": "active" }
/// ```
/// An unknown plan code is a 400.
pub async fn license_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(org_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<LicenseRequest>,
) -> ApiResult<Organization> {
    let organization = organizations::change_license(
        &state,
        &user,
        org_id,
        &payload.plan_code,
        payload.subscription_status,
    )
    .await?;
    Ok(ApiResponse::success(organization))
}
