use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::app_state::AppState;

use super::handlers;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/start", post(handlers::start))
        .route("/stop", post(handlers::stop))
        .route("/frame", get(handlers::frame))
        .route("/status", get(handlers::status))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}
