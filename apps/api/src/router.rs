use std::sync::Arc;

use axum::{routing::get, Router};

use booking_cell::router::booking_routes;
use shared_config::AppConfig;
use specialist_cell::router::specialist_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Solace booking API is running!" }))
        .nest("/specialists", specialist_routes(state.clone()))
        .nest("/bookings", booking_routes(state.clone()))
}
