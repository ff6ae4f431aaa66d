/// Subscription endpoints
///
/// # Endpoints
///
/// - `GET /api/v1/subscriptions/usage` - Current-period consumption
/// - `GET /api/v1/subscriptions/plans` - Plan catalog (public)

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Extension, Json};
use lenshot_shared::{
    auth::middleware::Principal,
    models::usage::current_period_start,
    plans::{Plan, PlanLimits},
    quota,
};
use serde::Serialize;

/// Usage response
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// The caller's plan
    pub plan: Plan,

    /// Captures consumed in the current period
    pub used: i32,

    /// Plan allowance for the period
    pub limit: i32,

    /// Remaining headroom
    pub remaining: i32,

    /// First day of the current billing period
    pub period_start: chrono::NaiveDate,
}

/// One catalog entry
#[derive(Debug, Serialize)]
pub struct PlanEntry {
    pub plan: Plan,
    pub monthly_captures: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub price_cents: i64,
}

/// Plan catalog response
#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanEntry>,
}

/// Current usage for the authenticated principal
pub async fn usage(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<UsageResponse>> {
    let (used, limit) = quota::current_usage(&state.db, principal.user_id, principal.plan).await?;

    Ok(Json(UsageResponse {
        plan: principal.plan,
        used,
        limit,
        remaining: (limit - used).max(0),
        period_start: current_period_start(),
    }))
}

/// Plan catalog, no authentication required
pub async fn plans() -> Json<PlansResponse> {
    let plans = Plan::all()
        .into_iter()
        .map(|plan| {
            let limits = PlanLimits::for_plan(plan);
            PlanEntry {
                plan,
                monthly_captures: limits.monthly_captures,
                max_width: limits.max_width,
                max_height: limits.max_height,
                price_cents: limits.price_cents,
            }
        })
        .collect();

    Json(PlansResponse { plans })
}
