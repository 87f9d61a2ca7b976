// handlers/public/plans.rs - GET /api/plans handler

use axum::extract::State;

use crate::app::AppState;
use crate::database::models::Plan;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/plans - Plan catalog with per-dimension limits (`null` = unlimited)
pub async fn plans_get(State(state): State<AppState>) -> ApiResult<Vec<Plan>> {
    let plans = state.store.list_plans().await?;
    Ok(ApiResponse::success(plans))
}
