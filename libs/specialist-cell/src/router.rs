// libs/specialist-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn specialist_routes(state: Arc<AppConfig>) -> Router {
    // Profile reads and slot computation are public; everything that edits
    // availability requires the authenticated owning specialist.
    let public_routes = Router::new()
        .route("/", get(handlers::list_specialists))
        .route("/{specialist_id}", get(handlers::get_specialist))
        .route("/{specialist_id}/availability", get(handlers::get_specialist_windows))
        .route("/{specialist_id}/slots", get(handlers::get_open_slots));

    let protected_routes = Router::new()
        .route("/availability", post(handlers::create_window))
        .route("/availability", delete(handlers::clear_windows))
        .route("/availability/bulk", post(handlers::bulk_create_windows))
        .route("/availability/me", get(handlers::get_my_windows))
        .route("/availability/{window_id}", put(handlers::update_window))
        .route("/availability/{window_id}", delete(handlers::delete_window))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
