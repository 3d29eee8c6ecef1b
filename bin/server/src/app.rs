//! HTTP routing for the odin server.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState, middleware::gate};
use crate::{health, rbac, triggers};

/// Builds the application router. Every route sits behind the request gate.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", get(auth::logout).post(auth::logout))
        .route("/auth/csrf", get(auth::csrf_token))
        .route("/api/auth/me", get(auth::me))
        .route("/api/health", get(health::health))
        .route(
            "/api/triggers",
            get(triggers::list_or_get)
                .post(triggers::create)
                .put(triggers::update)
                .delete(triggers::delete),
        )
        .route(
            "/api/auth/roles",
            get(rbac::list_or_get_roles)
                .post(rbac::create_role)
                .put(rbac::update_role)
                .delete(rbac::delete_role),
        )
        .route(
            "/api/auth/permissions",
            get(rbac::list_or_get_permissions)
                .post(rbac::create_permission)
                .put(rbac::update_permission)
                .delete(rbac::delete_permission),
        )
        .route("/api/auth/rbac", post(rbac::assign))
        .layer(middleware::from_fn_with_state(state.clone(), gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
