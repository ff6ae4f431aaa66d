/// Authentication endpoints
///
/// This module provides user authentication endpoints:
/// - Registration
/// - Login
/// - Refresh-token rotation
/// - Logout
/// - Principal resolution
///
/// # Endpoints
///
/// - `POST /api/v1/auth/register` - Register new user + session
/// - `POST /api/v1/auth/login` - Login and get tokens
/// - `POST /api/v1/auth/refresh` - Rotate the session
/// - `POST /api/v1/auth/logout` - Revoke a refresh token
/// - `GET /api/v1/auth/me` - Resolve the authenticated principal
///
/// Sessions pair a short-lived JWT access token with an opaque refresh
/// token. Refresh tokens rotate on every use; presenting an already
/// rotated token revokes the whole session family.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use lenshot_shared::{
    auth::{jwt, middleware::Principal, password, refresh},
    models::{
        refresh_token::{ConsumeOutcome, RefreshTokenRecord},
        user::{CreateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (will be validated for strength)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Optional display name
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// The opaque refresh token
    pub refresh_token: Option<String>,
}

/// Logout request
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    /// The refresh token to revoke
    pub refresh_token: Option<String>,
}

/// Session response, shared by register, login, and refresh
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// User ID
    pub user_id: String,

    /// JWT access token
    pub access_token: String,

    /// Opaque refresh token (rotates on every refresh)
    pub refresh_token: String,

    /// Access-token lifetime in seconds
    pub expires_in: i64,
}

/// Authenticated user response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
}

/// Maps validator output onto the error envelope
pub(crate) fn collect_validation_errors(e: validator::ValidationErrors) -> ApiError {
    let errors: Vec<ValidationErrorDetail> = e
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| ValidationErrorDetail {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Validation failed".to_string()),
            })
        })
        .collect();
    ApiError::Validation(errors)
}

/// Issues a fresh session for a user within a token family
///
/// Register and login start a new family; refresh reuses the presented
/// token's family so replay detection can revoke the whole session.
async fn issue_session(
    state: &AppState,
    user: &User,
    family_id: Uuid,
) -> ApiResult<SessionResponse> {
    let access_ttl = Duration::minutes(state.config.jwt.access_ttl_minutes);
    let claims = jwt::Claims::new(user.id, user.plan(), access_ttl);
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;

    let (refresh_plaintext, refresh_hash) = refresh::generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(state.config.jwt.refresh_ttl_days);
    RefreshTokenRecord::create(&state.db, user.id, family_id, &refresh_hash, expires_at).await?;

    Ok(SessionResponse {
        user_id: user.id.to_string(),
        access_token,
        refresh_token: refresh_plaintext,
        expires_in: access_ttl.num_seconds(),
    })
}

/// Register a new user
///
/// Creates the account on the free plan and returns an immediately
/// usable session.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    req.validate().map_err(collect_validation_errors)?;

    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::validation("password", e))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            name: req.name,
        },
    )
    .await?;

    let session = issue_session(&state, &user, Uuid::new_v4()).await?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((StatusCode::CREATED, Json(session)))
}

/// Login
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Invalid credentials (email and password faults
///   are indistinguishable)
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    req.validate().map_err(collect_validation_errors)?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    if !password_matches(user.id, &req.password, &user.password_hash) {
        return Err(ApiError::Unauthenticated);
    }

    User::update_last_login(&state.db, user.id).await?;

    let session = issue_session(&state, &user, Uuid::new_v4()).await?;
    Ok(Json(session))
}

/// Checks a password against a stored hash
///
/// A hash that fails to parse is a credential fault, not a server fault:
/// the caller sees the same 401 as for a wrong password, the detail goes
/// to the log.
fn password_matches(user_id: Uuid, candidate: &str, stored_hash: &str) -> bool {
    password::verify_password(candidate, stored_hash).unwrap_or_else(|e| {
        tracing::error!(user_id = %user_id, error = %e, "stored password hash unusable");
        false
    })
}

/// Rotate a session
///
/// The presented refresh token is revoked and replaced within the same
/// family. A token that was already rotated is treated as stolen: the
/// whole family is revoked and the caller gets a generic 401.
///
/// # Errors
///
/// - `400 Bad Request`: Missing token
/// - `401 Unauthorized`: Invalid, expired, or replayed token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let token = req
        .refresh_token
        .ok_or_else(|| ApiError::validation("refresh_token", "refresh_token is required"))?;

    let hash = refresh::hash_refresh_token(&token);
    match RefreshTokenRecord::consume(&state.db, &hash).await? {
        ConsumeOutcome::Rotated(record) => {
            let user = User::find_by_id(&state.db, record.user_id)
                .await?
                .ok_or(ApiError::Unauthenticated)?;

            let session = issue_session(&state, &user, record.family_id).await?;
            Ok(Json(session))
        }
        ConsumeOutcome::ReplayDetected { family_id, user_id } => {
            tracing::warn!(
                user_id = %user_id,
                family_id = %family_id,
                "refresh token replay detected, session family revoked"
            );
            Err(ApiError::Unauthenticated)
        }
        ConsumeOutcome::Unknown => Err(ApiError::Unauthenticated),
    }
}

/// Logout
///
/// Revokes the presented refresh token. Idempotent: an unknown or
/// already-revoked token still returns 200.
///
/// # Errors
///
/// - `400 Bad Request`: Missing token
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = req
        .refresh_token
        .ok_or_else(|| ApiError::validation("refresh_token", "refresh_token is required"))?;

    RefreshTokenRecord::revoke_by_hash(&state.db, &refresh::hash_refresh_token(&token)).await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Resolve the authenticated principal
///
/// Works with either credential kind; the response never includes the
/// password hash.
pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, principal.user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(Json(MeResponse { user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_matches_valid_hash() {
        let hash = password::hash_password("correct horse battery").unwrap();
        let user_id = Uuid::new_v4();
        assert!(password_matches(user_id, "correct horse battery", &hash));
        assert!(!password_matches(user_id, "wrong password", &hash));
    }

    #[test]
    fn test_password_matches_garbage_hash_is_a_mismatch() {
        // A corrupted stored hash must read as bad credentials, never as
        // an internal fault that would bubble up as a 500.
        assert!(!password_matches(
            Uuid::new_v4(),
            "any password",
            "not-a-phc-string"
        ));
    }
}
