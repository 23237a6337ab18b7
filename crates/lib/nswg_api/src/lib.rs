//! # nswg_api
//!
//! HTTP API library for the NSWG1 portal.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use nswg_core::auth::directory::UserDirectory;
use nswg_core::auth::jwt::SessionCodec;
use nswg_core::auth::login_state::LoginStateStore;
use nswg_core::auth::provider::IdentityProvider;
use nswg_core::auth::session::SessionManager;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, health, portal};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    /// Identity provider used for login.
    pub provider: Arc<dyn IdentityProvider>,
    /// Session issue/refresh/revoke.
    pub sessions: Arc<SessionManager>,
    /// Local users and roles.
    pub users: Arc<dyn UserDirectory>,
    /// Session cookie signer.
    pub codec: SessionCodec,
    /// Pending logins keyed by OAuth state.
    pub login_states: Arc<LoginStateStore>,
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (no role required)
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/login", get(auth::login_handler))
        .route("/auth/callback", get(auth::callback_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/api/session", get(portal::session_handler))
        .route("/api/nav", get(portal::nav_handler));

    let roster = Router::new()
        .route("/api/roster", get(portal::roster_handler))
        .layer(axum::middleware::from_fn_with_state(
            portal::roster_roles(),
            middleware::auth::require_roles,
        ));

    let admin = Router::new()
        .route("/api/admin/users", get(admin::list_users_handler))
        .route("/api/admin/users/{user_id}/roles", put(admin::set_roles_handler))
        .layer(axum::middleware::from_fn_with_state(
            portal::admin_roles(),
            middleware::auth::require_roles,
        ));

    Router::new()
        .merge(public)
        .merge(roster)
        .merge(admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::load_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
