//! HTTP API for the warden credential and session authority.
//!
//! # Modules
//!
//! - [`auth`]: register, login, logout, refresh and session self-management
//! - [`verification`]: email verification, email change and password reset
//! - [`oauth`]: identity provider redirects and callbacks
//! - [`middleware`]: session validation for protected endpoints
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                                  - Health check
//! POST   /api/v1/auth/register                    - Register (public)
//! POST   /api/v1/auth/login                       - Login (public)
//! POST   /api/v1/auth/logout                      - Logout (public, clears cookies)
//! POST   /api/v1/auth/refresh                     - Rotate refresh credential (public)
//! GET    /api/v1/auth/verify-email?token=         - Verify email (public)
//! POST   /api/v1/auth/request-password-reset      - Request reset mail (public)
//! POST   /api/v1/auth/reset-password              - Reset password (public)
//! GET    /api/v1/auth/providers                   - Configured providers (public)
//! GET    /api/v1/auth/{provider}                  - Provider redirect (public)
//! GET    /api/v1/auth/{provider}/callback         - Provider callback (public)
//! GET    /api/v1/auth/me                          - Current account (session)
//! POST   /api/v1/auth/send-verification           - Resend verification (session)
//! POST   /api/v1/auth/change-email                - Change email (session)
//! GET    /api/v1/auth/users/{user_id}             - Account by id (owner or admin)
//! GET    /api/v1/auth/sessions                    - List sessions (session)
//! DELETE /api/v1/auth/sessions/{session_id}       - Revoke a session (session)
//! POST   /api/v1/auth/logout-all                  - Revoke all sessions (session)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden::db::InMemoryStore;
//! use warden::identity::ProviderRegistry;
//! use warden::mail::LogMailQueue;
//! use warden::risk::DisabledLocator;
//! use warden::{Stores, Warden, WardenConfig};
//! use warden_server::api::{AppState, create_router};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WardenConfig::new("a".repeat(32), "b".repeat(32), "p".repeat(16));
//! let warden = Warden::new(
//!     &config,
//!     Stores::memory(Arc::new(InMemoryStore::new())),
//!     Arc::new(DisabledLocator),
//!     Arc::new(LogMailQueue),
//!     ProviderRegistry::new(),
//! );
//! let app = create_router(AppState::new(warden, None, config.frontend_url.clone(), false));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod request_id;
pub mod verification;

use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use serde_json::json;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use warden::Warden;
use warden::db::Database;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub warden: Arc<Warden>,
    /// `None` when serving from the in-memory store
    pub database: Option<Arc<Database>>,
    /// Where provider logins land after the callback
    pub frontend_url: String,
    pub cookie_secure: bool,
    /// Peers allowed to report the client address through forwarding headers
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    pub fn new(
        warden: Warden,
        database: Option<Database>,
        frontend_url: String,
        cookie_secure: bool,
    ) -> Self {
        Self {
            warden: Arc::new(warden),
            database: database.map(Arc::new),
            frontend_url,
            cookie_secure,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API v1 router with all versioned endpoints.
fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify-email", get(verification::verify_email))
        .route(
            "/auth/request-password-reset",
            post(verification::request_password_reset),
        )
        .route("/auth/reset-password", post(verification::reset_password))
        .route("/auth/providers", get(oauth::list_providers))
        .route("/auth/{provider}", get(oauth::authorize))
        .route("/auth/{provider}/callback", get(oauth::callback));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/auth/send-verification",
            post(verification::send_verification),
        )
        .route("/auth/change-email", post(verification::change_email))
        .route("/auth/users/{user_id}", get(auth::get_account))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/auth/sessions/{session_id}", delete(auth::revoke_session))
        .route("/auth/logout-all", post(auth::logout_all))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store is reachable, `503 Service Unavailable` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, store_healthy) = match &state.database {
        Some(db) => ("postgres", db.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": {
            "kind": store,
            "healthy": store_healthy,
        },
        "providers": state.warden.identity.providers().kinds(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
