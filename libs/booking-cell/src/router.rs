// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    // Every booking operation involves one of the two parties, so the whole
    // cell sits behind authentication.
    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/my-bookings", get(handlers::get_my_bookings))
        .route("/specialist", get(handlers::get_specialist_bookings))
        .route("/{booking_id}", get(handlers::get_booking))
        .route("/{booking_id}", put(handlers::update_booking))
        .route("/{booking_id}/confirm", post(handlers::confirm_booking))
        .route("/{booking_id}/cancel", post(handlers::cancel_booking))
        .route("/{booking_id}/complete", post(handlers::complete_booking))
        .route("/{booking_id}/no-show", post(handlers::mark_no_show))
        .route("/{booking_id}/session", post(handlers::create_session))
        .route("/{booking_id}/session", get(handlers::get_booking_session))
        .route("/sessions/{session_id}", put(handlers::update_session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
