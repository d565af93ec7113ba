//! Axum Router Configuration

use crate::{handlers, state::AppState};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Creates the main Axum router for the relay.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rtc-connect", post(handlers::rtc_connect))
        .route("/health", get(handlers::health))
        .with_state(app_state)
}
