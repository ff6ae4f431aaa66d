/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>` which converts to the
/// response envelope automatically:
///
/// ```json
/// {
///   "success": false,
///   "error": { "code": "VALIDATION_ERROR", "message": "...", "details": [...] }
/// }
/// ```
///
/// Credential failures always render the same generic 401 regardless of
/// cause, and internal faults are logged but never echoed to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or out-of-range input (400)
    Validation(Vec<ValidationErrorDetail>),

    /// Capture target blocked by the URL safety check (400)
    UnsafeTarget(String),

    /// Missing, invalid, or revoked credential (401)
    Unauthenticated,

    /// Plan quota exhausted (403)
    QuotaExceeded { limit: i32 },

    /// Unknown or not-owned resource (404)
    NotFound(String),

    /// Duplicate resource, e.g. an email already registered (409)
    Conflict(String),

    /// Unexpected fault (500); the message is logged, not returned
    Internal(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ApiError {
    /// Single-field validation error
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::UnsafeTarget(msg) => write!(f, "Unsafe target: {}", msg),
            ApiError::Unauthenticated => write!(f, "Unauthenticated"),
            ApiError::QuotaExceeded { limit } => write!(f, "Quota exceeded: limit {}", limit),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::UnsafeTarget(msg) => {
                (StatusCode::BAD_REQUEST, "UNSAFE_TARGET", msg, None)
            }
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::QuotaExceeded { limit } => (
                StatusCode::FORBIDDEN,
                "QUOTA_EXCEEDED",
                format!("Monthly capture quota of {} exhausted", limit),
                None,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            ApiError::Internal(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({ "code": code, "message": message });
        if let Some(details) = details {
            error["details"] = json!(details);
        }

        let body = Json(json!({ "success": false, "error": error }));
        (status, body).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict("Email already registered".to_string());
                    }
                    // The constraint name is schema detail; the client
                    // gets a generic conflict.
                    tracing::warn!(constraint, "unique constraint violation");
                    return ApiError::Conflict("Resource already exists".to_string());
                }
                ApiError::Internal(format!("Database error: {}", db_err))
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

/// Credential faults collapse to the generic 401; store faults stay 500
impl From<lenshot_shared::auth::middleware::AuthError> for ApiError {
    fn from(err: lenshot_shared::auth::middleware::AuthError) -> Self {
        match err {
            lenshot_shared::auth::middleware::AuthError::Unauthenticated => {
                ApiError::Unauthenticated
            }
            lenshot_shared::auth::middleware::AuthError::Database(e) => {
                ApiError::Internal(format!("Database error: {}", e))
            }
        }
    }
}

/// Convert password errors to API errors
impl From<lenshot_shared::auth::password::PasswordError> for ApiError {
    fn from(err: lenshot_shared::auth::password::PasswordError) -> Self {
        ApiError::Internal(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
///
/// Token faults of any kind are a generic 401; the distinction only
/// matters server-side.
impl From<lenshot_shared::auth::jwt::JwtError> for ApiError {
    fn from(_err: lenshot_shared::auth::jwt::JwtError) -> Self {
        ApiError::Unauthenticated
    }
}

/// Convert quota errors to API errors
impl From<lenshot_shared::quota::QuotaError> for ApiError {
    fn from(err: lenshot_shared::quota::QuotaError) -> Self {
        match err {
            lenshot_shared::quota::QuotaError::Exceeded { limit } => {
                ApiError::QuotaExceeded { limit }
            }
            lenshot_shared::quota::QuotaError::Database(e) => {
                ApiError::Internal(format!("Database error: {}", e))
            }
        }
    }
}

/// Convert URL safety rejections to API errors
impl From<lenshot_shared::safety::UnsafeUrlError> for ApiError {
    fn from(err: lenshot_shared::safety::UnsafeUrlError) -> Self {
        ApiError::UnsafeTarget(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::NotFound("Job not found".to_string());
        assert_eq!(err.to_string(), "Not found: Job not found");

        let err = ApiError::QuotaExceeded { limit: 100 };
        assert_eq!(err.to_string(), "Quota exceeded: limit 100");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::validation("width", "too small")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnsafeTarget("blocked".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::QuotaExceeded { limit: 100 }
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_conflict_body_carries_no_schema_detail() {
        let response = ApiError::Conflict("Resource already exists".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], "Resource already exists");
    }

    #[test]
    fn test_unsafe_url_maps_to_400() {
        let err: ApiError = lenshot_shared::safety::UnsafeUrlError::PrivateAddress.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
