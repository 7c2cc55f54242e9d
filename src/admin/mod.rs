//! Bearer-authenticated admin API, served on its own listener.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub proxy: AppState,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(proxy: AppState, api_key: &str) -> Router {
    let state = AdminState {
        proxy,
        api_key: api_key.into(),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/servers", get(get_servers))
        .route("/admin/servers/{name}/health", put(set_server_health))
        .route("/admin/cache", get(get_cache).delete(clear_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
