/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use lenshot_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = lenshot_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::middleware::{request_id::request_id_middleware, security::SecurityHeadersLayer};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use lenshot_shared::auth::middleware::create_auth_middleware;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                        # Health check (public)
/// └── /api/v1/
///     ├── /auth/
///     │   ├── POST /register         # public
///     │   ├── POST /login            # public
///     │   ├── POST /refresh          # public (token in body)
///     │   ├── POST /logout           # public (token in body)
///     │   ├── GET  /me               # authenticated
///     │   └── /api-keys/             # session-authenticated
///     │       ├── POST   /
///     │       ├── GET    /
///     │       └── DELETE /:id
///     ├── /screenshots/              # authenticated (JWT or API key)
///     │   ├── POST   /
///     │   ├── GET    /
///     │   ├── GET    /:id
///     │   ├── POST   /:id/retry
///     │   └── DELETE /:id
///     └── /subscriptions/
///         ├── GET /usage             # authenticated
///         └── GET /plans             # public
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first): security headers, CORS, request
/// ID, request tracing; authentication is attached per route group.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_layer = axum::middleware::from_fn(create_auth_middleware(
        state.db.clone(),
        state.config.jwt.secret.clone(),
    ));

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Session management (public; the credential travels in the body)
    let auth_public = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout));

    // Principal resolution and key management (authenticated)
    let auth_protected = Router::new()
        .route("/me", get(routes::auth::me))
        .route(
            "/api-keys",
            post(routes::api_keys::create_api_key).get(routes::api_keys::list_api_keys),
        )
        .route("/api-keys/:id", delete(routes::api_keys::revoke_api_key))
        .layer(auth_layer.clone());

    // Capture jobs (authenticated with either credential kind)
    let screenshot_routes = Router::new()
        .route(
            "/",
            post(routes::screenshots::submit).get(routes::screenshots::list),
        )
        .route(
            "/:id",
            get(routes::screenshots::get).delete(routes::screenshots::delete),
        )
        .route("/:id/retry", post(routes::screenshots::retry))
        .layer(auth_layer.clone());

    let subscription_routes = Router::new()
        .route(
            "/usage",
            get(routes::subscriptions::usage).layer(auth_layer),
        )
        .route("/plans", get(routes::subscriptions::plans));

    let v1_routes = Router::new()
        .nest("/auth", auth_public.merge(auth_protected))
        .nest("/screenshots", screenshot_routes)
        .nest("/subscriptions", subscription_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::Service as _;

    /// Router over a lazy pool; tests here only exercise paths that
    /// never reach the database.
    fn test_router() -> Router {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        build_router(AppState::new(pool, config))
    }

    #[tokio::test]
    async fn test_protected_routes_reject_missing_credentials() {
        let mut app = test_router();

        for uri in [
            "/api/v1/auth/me",
            "/api/v1/screenshots",
            "/api/v1/auth/api-keys",
            "/api/v1/subscriptions/usage",
        ] {
            let response = app
                .call(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_garbage_bearer_token_is_401() {
        let mut app = test_router();

        let response = app
            .call(
                Request::builder()
                    .uri("/api/v1/auth/me")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plan_catalog_is_public() {
        let mut app = test_router();

        let response = app
            .call(
                Request::builder()
                    .uri("/api/v1/subscriptions/plans")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["plans"].as_array().unwrap().len(), 4);
        assert_eq!(body["plans"][0]["plan"], "free");
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let mut app = test_router();

        let response = app
            .call(
                Request::builder()
                    .uri("/api/v1/screenshots")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_submit_rejects_internal_webhook_target() {
        use lenshot_shared::{auth::jwt, plans::Plan};

        let config = test_config();
        let claims = jwt::Claims::new(
            uuid::Uuid::new_v4(),
            Plan::Free,
            chrono::Duration::minutes(5),
        );
        let token = jwt::create_token(&claims, &config.jwt.secret).unwrap();
        let mut app = test_router();

        // The webhook address is classified before any quota or database
        // work, so a loopback receiver dies at the validation boundary.
        for webhook in [
            "http://127.0.0.1:9100/metrics",
            "http://169.254.169.254/latest/meta-data/",
        ] {
            let body = serde_json::json!({
                "url": "https://example.com",
                "webhook_url": webhook,
            });
            let response = app
                .call(
                    Request::builder()
                        .method("POST")
                        .uri("/api/v1/screenshots")
                        .header("Authorization", format!("Bearer {token}"))
                        .header("Content-Type", "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{webhook}");

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_security_and_request_id_headers_on_every_response() {
        let mut app = test_router();

        let response = app
            .call(
                Request::builder()
                    .uri("/api/v1/subscriptions/plans")
                    .header("X-Request-ID", "abc-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "SAMEORIGIN");
        assert_eq!(headers.get("X-Request-ID").unwrap(), "abc-42");
    }
}
