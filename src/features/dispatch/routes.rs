use std::sync::Arc;

use axum::{routing::get, Router};

use crate::features::dispatch::handlers::{self, DispatchSocketState};
use crate::features::dispatch::services::{DispatchSessionService, ZoneDirectory};

/// Real-time channel for drivers (socket auth middleware applied by caller)
pub fn socket_routes(session_service: Arc<DispatchSessionService>, outbox_capacity: usize) -> Router {
    let state = DispatchSocketState {
        session_service,
        outbox_capacity,
    };

    Router::new()
        .route("/ws/dispatch", get(handlers::dispatch_socket))
        .with_state(state)
}

/// Operator routes (auth middleware applied by caller)
pub fn admin_routes(directory: Arc<ZoneDirectory>) -> Router {
    Router::new()
        .route("/api/v1/dispatch/zones", get(handlers::list_zones))
        .with_state(directory)
}
