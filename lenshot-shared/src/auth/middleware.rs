/// Dual-mode authentication middleware for Axum
///
/// One middleware resolves either credential kind into a [`Principal`]
/// placed in request extensions:
///
/// - **Bearer token**: `Authorization: Bearer <jwt>`, verified purely from
///   the signature and claims, no store access.
/// - **API key**: `X-API-Key: lens_...`, resolved through the prefix index
///   and a constant-time hash comparison; revocation, expiry, and the
///   source-IP whitelist are all checked on this path.
///
/// When both headers are present the bearer token wins. Every failure maps
/// to the same generic 401 body: a caller probing credentials learns
/// nothing about *why* a credential failed.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware, Extension};
/// use lenshot_shared::auth::middleware::{create_auth_middleware, Principal};
/// use sqlx::PgPool;
///
/// async fn handler(Extension(principal): Extension<Principal>) -> String {
///     format!("user {}", principal.user_id)
/// }
///
/// fn protected(pool: PgPool) -> Router {
///     Router::new()
///         .route("/me", get(handler))
///         .layer(middleware::from_fn(create_auth_middleware(pool, "secret")))
/// }
/// ```

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::net::SocketAddr;
use uuid::Uuid;

use super::api_key::{display_prefix, validate_api_key_format, verify_api_key};
use super::jwt::validate_access_token;
use crate::models::api_key::ApiKeyRecord;
use crate::models::user::User;
use crate::plans::Plan;

/// How the caller authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
}

/// Resolved caller identity, added to request extensions on success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Authenticated user (API keys resolve to their owner)
    pub user_id: Uuid,

    /// The user's subscription plan
    pub plan: Plan,

    /// Credential kind that was presented
    pub method: AuthMethod,

    /// Granted scopes (API key auth only)
    pub scopes: Option<Vec<String>>,

    /// The authenticating key (API key auth only)
    pub api_key_id: Option<Uuid>,

    /// Capture-target domains the key is restricted to (API key auth only)
    pub domain_whitelist: Option<Vec<String>>,
}

impl Principal {
    /// Checks whether the caller holds a scope
    ///
    /// Session-authenticated users hold every scope; API keys are limited
    /// to their grant.
    pub fn has_scope(&self, required: &str) -> bool {
        match self.method {
            AuthMethod::Jwt => true,
            AuthMethod::ApiKey => self
                .scopes
                .as_deref()
                .map(|scopes| super::api_key::has_scope(scopes, required))
                .unwrap_or(false),
        }
    }

    /// Checks a capture-target host against the key's domain whitelist
    ///
    /// Session users and unrestricted keys may target any host.
    pub fn allows_domain(&self, host: &str) -> bool {
        match &self.domain_whitelist {
            None => true,
            Some(list) if list.is_empty() => true,
            Some(list) => {
                let host = host.to_ascii_lowercase();
                list.iter().any(|entry| {
                    let entry = entry.to_ascii_lowercase();
                    host == entry || host.ends_with(&format!(".{entry}"))
                })
            }
        }
    }
}

/// Authentication failures
///
/// Credential faults all render as the same 401 body. Store faults are the
/// only 500: a broken database must not read as "bad key".
#[derive(Debug)]
pub enum AuthError {
    Unauthenticated,
    Database(sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required",
            ),
            AuthError::Database(ref e) => {
                tracing::error!(error = %e, "authentication store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error",
                )
            }
        };

        let body = json!({
            "success": false,
            "error": { "code": code, "message": message }
        });

        (status, Json(body)).into_response()
    }
}

/// The middleware itself: resolves a [`Principal`] or rejects with 401
pub async fn authenticate(
    pool: PgPool,
    jwt_secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    let principal = if let Some(token) = bearer {
        principal_from_jwt(&token, &jwt_secret)?
    } else {
        let key = req
            .headers()
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(AuthError::Unauthenticated)?;
        let client_ip = client_ip(&req);
        principal_from_api_key(&pool, &key, client_ip.as_deref()).await?
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn principal_from_jwt(token: &str, secret: &str) -> Result<Principal, AuthError> {
    let claims = validate_access_token(token, secret).map_err(|_| AuthError::Unauthenticated)?;

    Ok(Principal {
        user_id: claims.sub,
        plan: claims.plan,
        method: AuthMethod::Jwt,
        scopes: None,
        api_key_id: None,
        domain_whitelist: None,
    })
}

async fn principal_from_api_key(
    pool: &PgPool,
    key: &str,
    client_ip: Option<&str>,
) -> Result<Principal, AuthError> {
    // Malformed keys never reach the database.
    if !validate_api_key_format(key) {
        return Err(AuthError::Unauthenticated);
    }

    // Candidates come off the prefix index; the winner is picked by
    // constant-time comparison of the full hash.
    let record = ApiKeyRecord::find_active_by_prefix(pool, &display_prefix(key))
        .await
        .map_err(AuthError::Database)?
        .into_iter()
        .find(|candidate| verify_api_key(key, &candidate.key_hash))
        .ok_or(AuthError::Unauthenticated)?;

    if let Some(ip) = client_ip {
        if !record.allows_ip(ip) {
            return Err(AuthError::Unauthenticated);
        }
    } else if record.ip_whitelist.as_ref().is_some_and(|l| !l.is_empty()) {
        // A key pinned to source IPs fails closed when the IP is unknown.
        return Err(AuthError::Unauthenticated);
    }

    let user = User::find_by_id(pool, record.user_id)
        .await
        .map_err(AuthError::Database)?
        .ok_or(AuthError::Unauthenticated)?;

    // Usage stats are best-effort and never block the request.
    let stats_pool = pool.clone();
    let key_id = record.id;
    tokio::spawn(async move {
        if let Err(e) = ApiKeyRecord::record_usage(&stats_pool, key_id).await {
            tracing::warn!(api_key_id = %key_id, error = %e, "failed to record key usage");
        }
    });

    Ok(Principal {
        user_id: record.user_id,
        plan: user.plan(),
        method: AuthMethod::ApiKey,
        scopes: Some(record.scopes),
        api_key_id: Some(record.id),
        domain_whitelist: record.domain_whitelist,
    })
}

/// Best-effort client IP: `X-Forwarded-For` (first hop) then the socket peer
fn client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Builds the middleware closure for `axum::middleware::from_fn`
pub fn create_auth_middleware(
    pool: PgPool,
    jwt_secret: impl Into<String>,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>
       + Clone {
    let jwt_secret = jwt_secret.into();
    move |req, next| {
        let pool = pool.clone();
        let jwt_secret = jwt_secret.clone();
        Box::pin(authenticate(pool, jwt_secret, req, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            plan: Plan::Free,
            method: AuthMethod::Jwt,
            scopes: None,
            api_key_id: None,
            domain_whitelist: None,
        }
    }

    #[test]
    fn test_jwt_principal_holds_all_scopes() {
        let principal = jwt_principal();
        assert!(principal.has_scope("screenshots:create"));
        assert!(principal.has_scope("screenshots:delete"));
    }

    #[test]
    fn test_api_key_principal_is_scope_limited() {
        let principal = Principal {
            method: AuthMethod::ApiKey,
            scopes: Some(vec!["screenshots:read".to_string()]),
            api_key_id: Some(Uuid::new_v4()),
            ..jwt_principal()
        };
        assert!(principal.has_scope("screenshots:read"));
        assert!(!principal.has_scope("screenshots:create"));
    }

    #[test]
    fn test_domain_whitelist_matching() {
        let principal = Principal {
            method: AuthMethod::ApiKey,
            domain_whitelist: Some(vec!["example.com".to_string()]),
            ..jwt_principal()
        };
        assert!(principal.allows_domain("example.com"));
        assert!(principal.allows_domain("sub.example.com"));
        assert!(!principal.allows_domain("evil.net"));
    }

    #[test]
    fn test_unauthenticated_response_is_generic_401() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
