/// API key management endpoints
///
/// This module provides CRUD endpoints for API key management.
/// All endpoints require session (JWT) authentication: a key cannot be
/// used to mint or revoke keys.
///
/// # Endpoints
///
/// - `POST /api/v1/auth/api-keys` - Create API key
/// - `GET /api/v1/auth/api-keys` - List API keys (masked)
/// - `DELETE /api/v1/auth/api-keys/:id` - Revoke API key

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lenshot_shared::{
    auth::{
        api_key::{SCOPE_CREATE, SCOPE_DELETE, SCOPE_READ},
        middleware::{AuthMethod, Principal},
    },
    models::api_key::{ApiKeyRecord, CreateApiKey},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Create API key request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    /// API key name/description
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Granted scopes
    ///
    /// Available scopes:
    /// - `*`: All permissions
    /// - `screenshots:*`: All screenshot permissions
    /// - `screenshots:create`: Submit capture jobs
    /// - `screenshots:read`: Read jobs and results
    /// - `screenshots:delete`: Delete jobs
    pub scopes: Option<Vec<String>>,

    /// Source IPs the key may be used from
    pub ip_whitelist: Option<Vec<String>>,

    /// Capture-target domains the key is restricted to
    pub domain_whitelist: Option<Vec<String>>,

    /// Per-minute request ceiling override
    pub rate_limit: Option<i32>,

    /// Optional expiration date (ISO 8601)
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Create API key response
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// API key ID
    pub id: String,

    /// The plaintext API key (ONLY returned on creation)
    ///
    /// IMPORTANT: This is the only time the plaintext key is shown.
    /// Store it securely as it cannot be retrieved later.
    pub key: String,

    /// API key name
    pub name: String,

    /// Scopes
    pub scopes: Vec<String>,

    /// Created at
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Expires at
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// API key list item (masked)
#[derive(Debug, Serialize)]
pub struct ApiKeyListItem {
    /// API key ID
    pub id: String,

    /// API key name
    pub name: String,

    /// Masked key, e.g. `lens_a1b2c...9xyz`
    pub masked_key: String,

    /// Scopes
    pub scopes: Vec<String>,

    /// Whether key is revoked
    pub revoked: bool,

    /// Total successful authentications
    pub usage_count: i64,

    /// Created at
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last used at
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Expires at
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// List API keys response
#[derive(Debug, Serialize)]
pub struct ListApiKeysResponse {
    /// API keys
    pub keys: Vec<ApiKeyListItem>,
}

/// Revoke API key response
#[derive(Debug, Serialize)]
pub struct RevokeApiKeyResponse {
    /// Whether the key was revoked
    pub revoked: bool,
}

const KNOWN_SCOPES: &[&str] = &[
    "*",
    "screenshots:*",
    SCOPE_CREATE,
    SCOPE_READ,
    SCOPE_DELETE,
];

/// Only session users manage keys; a key presenting itself here gets the
/// same generic 401 as any other credential fault.
fn require_session(principal: &Principal) -> ApiResult<()> {
    if principal.method != AuthMethod::Jwt {
        return Err(ApiError::Unauthenticated);
    }
    Ok(())
}

/// Create API key
///
/// Returns the plaintext key exactly once.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed or unknown scope
/// - `401 Unauthorized`: Missing or invalid session
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    require_session(&principal)?;
    req.validate()
        .map_err(super::auth::collect_validation_errors)?;

    let scopes = req
        .scopes
        .unwrap_or_else(|| vec![SCOPE_CREATE.to_string(), SCOPE_READ.to_string()]);

    if scopes.is_empty() {
        return Err(ApiError::validation(
            "scopes",
            "At least one scope is required",
        ));
    }
    if let Some(unknown) = scopes.iter().find(|s| !KNOWN_SCOPES.contains(&s.as_str())) {
        return Err(ApiError::validation(
            "scopes",
            format!("Unknown scope: {}", unknown),
        ));
    }

    let created = ApiKeyRecord::create(
        &state.db,
        principal.user_id,
        &CreateApiKey {
            name: req.name,
            scopes,
            ip_whitelist: req.ip_whitelist,
            domain_whitelist: req.domain_whitelist,
            rate_limit: req.rate_limit,
            expires_at: req.expires_at,
        },
    )
    .await?;

    tracing::info!(
        user_id = %principal.user_id,
        api_key_id = %created.record.id,
        "api key created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            id: created.record.id.to_string(),
            key: created.plaintext,
            name: created.record.name,
            scopes: created.record.scopes,
            created_at: created.record.created_at,
            expires_at: created.record.expires_at,
        }),
    ))
}

/// List API keys
///
/// Keys are masked: neither the plaintext nor its hash ever appears in
/// a list response.
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<ListApiKeysResponse>> {
    require_session(&principal)?;

    let keys = ApiKeyRecord::list_by_user(&state.db, principal.user_id)
        .await?
        .into_iter()
        .map(|key| ApiKeyListItem {
            id: key.id.to_string(),
            masked_key: key.masked(),
            name: key.name,
            scopes: key.scopes,
            revoked: key.revoked,
            usage_count: key.usage_count,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
        })
        .collect();

    Ok(Json(ListApiKeysResponse { keys }))
}

/// Revoke API key
///
/// The revocation takes effect on the key's next use. Someone else's
/// key is indistinguishable from a missing one.
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or invalid session
/// - `404 Not Found`: Unknown or not-owned key
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RevokeApiKeyResponse>> {
    require_session(&principal)?;

    let revoked = ApiKeyRecord::revoke(&state.db, id, principal.user_id).await?;
    if !revoked {
        return Err(ApiError::NotFound("API key not found".to_string()));
    }

    tracing::info!(user_id = %principal.user_id, api_key_id = %id, "api key revoked");
    Ok(Json(RevokeApiKeyResponse { revoked }))
}
