/// Capture job endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/screenshots` - Submit a capture job
/// - `GET /api/v1/screenshots` - List jobs (paginated)
/// - `GET /api/v1/screenshots/:id` - Fetch one job
/// - `POST /api/v1/screenshots/:id/retry` - Re-run a finished job as a new job
/// - `DELETE /api/v1/screenshots/:id` - Delete a job that is not running
///
/// Submission order is deliberate: syntactic validation happens before
/// anything else, the webhook receiver is resolved and classified before
/// any quota unit is reserved, and a safety rejection of the capture
/// target after reservation releases the unit. A capture that goes on to
/// fail keeps its unit, the attempt was made.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use lenshot_shared::{
    auth::{
        api_key::{SCOPE_CREATE, SCOPE_DELETE, SCOPE_READ},
        middleware::Principal,
    },
    models::job::{CaptureOptions, ScreenshotJob},
    plans::PlanLimits,
    quota, safety,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Submit request
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Target URL to capture
    pub url: String,

    /// Capture options; omitted fields take defaults
    #[serde(default)]
    pub options: CaptureOptions,

    /// Webhook notified once on the job's terminal transition
    pub webhook_url: Option<String>,
}

/// Job response body
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: ScreenshotJob,
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Paginated job list
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<ScreenshotJob>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

const MAX_PER_PAGE: i64 = 100;
const MAX_URL_LENGTH: usize = 2048;

/// Submit a capture job
///
/// # Errors
///
/// - `400 Bad Request`: Bad options, or the target failed the safety check
/// - `401 Unauthorized`: Bad credential, missing scope, or a key whose
///   domain whitelist excludes the target
/// - `403 Forbidden`: Monthly quota exhausted
pub async fn submit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if !principal.has_scope(SCOPE_CREATE) {
        return Err(ApiError::Unauthenticated);
    }

    if req.url.len() > MAX_URL_LENGTH {
        return Err(ApiError::validation("url", "URL too long"));
    }

    // Syntactic rejection never costs a quota unit or a DNS query.
    let parsed = safety::parse_target(&req.url)?;
    let host = parsed.host_str().unwrap_or_default().to_string();

    if !principal.allows_domain(&host) {
        return Err(ApiError::Unauthenticated);
    }

    // The webhook is an outbound request of our own making, so it gets
    // the same resolve-and-classify treatment as the capture target.
    if let Some(webhook) = &req.webhook_url {
        if webhook.len() > MAX_URL_LENGTH {
            return Err(ApiError::validation("webhook_url", "URL too long"));
        }
        safety::validate_target(webhook)
            .await
            .map_err(|e| ApiError::validation("webhook_url", e.to_string()))?;
    }

    let limits = PlanLimits::for_plan(principal.plan);
    req.options
        .validate(limits.max_width as u32, limits.max_height as u32)
        .map_err(|e| ApiError::validation("options", e))?;

    let reservation = quota::try_reserve(&state.db, principal.user_id, principal.plan).await?;

    // DNS resolution and address classification happen with the unit
    // held; a rejection here hands it back.
    match safety::validate_target(&req.url).await {
        Ok(_) => {}
        Err(e) => {
            if let Err(release_err) = reservation.release(&state.db).await {
                tracing::error!(
                    user_id = %principal.user_id,
                    error = %release_err,
                    "failed to release quota after unsafe target"
                );
            }
            return Err(e.into());
        }
    }

    let job = ScreenshotJob::create(
        &state.db,
        principal.user_id,
        &req.url,
        &req.options,
        req.webhook_url.as_deref(),
        None,
    )
    .await?;
    reservation.commit();

    tracing::info!(job_id = %job.id, user_id = %principal.user_id, "capture job submitted");
    Ok((StatusCode::CREATED, Json(JobResponse { job })))
}

/// Re-run a finished job
///
/// History is immutable: the retry is a brand-new job in `pending` that
/// references its source through `retry_of`, carrying the same target,
/// options, and webhook. The attempt goes through the full admission
/// pipeline again, quota included.
///
/// # Errors
///
/// - `400 Bad Request`: Source job still in flight, or its target no
///   longer passes the safety check
/// - `403 Forbidden`: Monthly quota exhausted
/// - `404 Not Found`: Unknown or not-owned job
pub async fn retry(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if !principal.has_scope(SCOPE_CREATE) {
        return Err(ApiError::Unauthenticated);
    }

    let source = ScreenshotJob::find_for_user(&state.db, id, principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    if !source.status.is_terminal() {
        return Err(ApiError::validation("id", "job is still in flight"));
    }

    let options = source
        .capture_options()
        .map_err(|e| ApiError::validation("options", e.to_string()))?;

    let parsed = safety::parse_target(&source.url)?;
    let host = parsed.host_str().unwrap_or_default().to_string();
    if !principal.allows_domain(&host) {
        return Err(ApiError::Unauthenticated);
    }

    // The plan may have changed since the original submission; the stored
    // options are re-checked against today's ceiling.
    let limits = PlanLimits::for_plan(principal.plan);
    options
        .validate(limits.max_width as u32, limits.max_height as u32)
        .map_err(|e| ApiError::validation("options", e))?;

    let reservation = quota::try_reserve(&state.db, principal.user_id, principal.plan).await?;

    match safety::validate_target(&source.url).await {
        Ok(_) => {}
        Err(e) => {
            if let Err(release_err) = reservation.release(&state.db).await {
                tracing::error!(
                    user_id = %principal.user_id,
                    error = %release_err,
                    "failed to release quota after unsafe target"
                );
            }
            return Err(e.into());
        }
    }

    let job = ScreenshotJob::create(
        &state.db,
        principal.user_id,
        &source.url,
        &options,
        source.webhook_url.as_deref(),
        Some(source.id),
    )
    .await?;
    reservation.commit();

    tracing::info!(job_id = %job.id, retry_of = %source.id, "capture job resubmitted");
    Ok((StatusCode::CREATED, Json(JobResponse { job })))
}

/// List the caller's jobs, newest first
///
/// # Errors
///
/// - `400 Bad Request`: Non-positive page, or per_page out of 1-100
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    if !principal.has_scope(SCOPE_READ) {
        return Err(ApiError::Unauthenticated);
    }

    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(20);

    if page < 1 {
        return Err(ApiError::validation("page", "page must be at least 1"));
    }
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(ApiError::validation(
            "per_page",
            format!("per_page must be between 1 and {}", MAX_PER_PAGE),
        ));
    }

    let offset = (page - 1) * per_page;
    let jobs = ScreenshotJob::list_for_user(&state.db, principal.user_id, per_page, offset).await?;
    let total = ScreenshotJob::count_for_user(&state.db, principal.user_id).await?;

    Ok(Json(ListJobsResponse {
        jobs,
        page,
        per_page,
        total,
    }))
}

/// Fetch one job
///
/// # Errors
///
/// - `404 Not Found`: Unknown or not-owned job
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobResponse>> {
    if !principal.has_scope(SCOPE_READ) {
        return Err(ApiError::Unauthenticated);
    }

    let job = ScreenshotJob::find_for_user(&state.db, id, principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    Ok(Json(JobResponse { job }))
}

/// Delete a job
///
/// Running jobs cannot be deleted out from under the worker; they read
/// as not found until they finish.
///
/// # Errors
///
/// - `404 Not Found`: Unknown, not-owned, or currently running job
pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !principal.has_scope(SCOPE_DELETE) {
        return Err(ApiError::Unauthenticated);
    }

    let deleted = ScreenshotJob::delete_for_user(&state.db, id, principal.user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Job not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
