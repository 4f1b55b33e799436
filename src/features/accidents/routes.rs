use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::features::accidents::handlers::{self, AccidentState};

/// Intake route; optional auth middleware applied by caller
pub fn public_routes(state: AccidentState) -> Router {
    Router::new()
        .route("/api/v1/accident/report", post(handlers::report_accident))
        .with_state(state)
}

/// Operator routes (require auth middleware to be applied by caller)
pub fn admin_routes(state: AccidentState) -> Router {
    Router::new()
        .route("/api/v1/accident/accidents", get(handlers::list_accidents))
        .route("/api/v1/accident/accidents/{id}", get(handlers::get_accident))
        .route(
            "/api/v1/accident/accidents/{id}/status",
            patch(handlers::update_accident_status),
        )
        .route(
            "/api/v1/accident/accidents/{id}/classify",
            post(handlers::classify_accident),
        )
        .with_state(state)
}
