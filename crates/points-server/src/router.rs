//! Axum router construction for the control API.

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

use crate::auth::require_secret;
use crate::handlers;
use crate::state::AppState;

/// Build the complete router.
///
/// The credential check wraps every route and both fallbacks, so an
/// unauthenticated request gets 401 whatever path it names. Unknown paths
/// and unsupported methods on known paths answer 404.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/points", get(handlers::list_points))
        .route("/points/add", post(handlers::add_point))
        .route(
            "/point/{id}",
            get(handlers::get_point).delete(handlers::delete_point),
        )
        .route("/point/{id}/{command}", put(handlers::run_command))
        .route(
            "/point/{id}/{command}/{arg}",
            put(handlers::run_command_with_arg),
        )
        .route("/server/info", get(handlers::server_info))
        .route("/server/backups", get(handlers::list_backups))
        .route("/server/backup", put(handlers::backup))
        .route("/server/restore/{backup_id}", put(handlers::restore))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .layer(from_fn_with_state(Arc::clone(&state), require_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
