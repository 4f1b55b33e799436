use std::sync::Arc;

use axum::{extract::State, Json};

use crate::core::error::Result;
use crate::features::auth::guards::RequireAdmin;
use crate::features::dispatch::services::{PresenceSnapshot, ZoneDirectory};
use crate::shared::types::ApiResponse;

/// Count connected responders per zone
#[utoipa::path(
    get,
    path = "/api/v1/dispatch/zones",
    responses(
        (status = 200, description = "Responder presence per zone", body = ApiResponse<PresenceSnapshot>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = [])),
    tag = "dispatch"
)]
pub async fn list_zones(
    RequireAdmin(_user): RequireAdmin,
    State(directory): State<Arc<ZoneDirectory>>,
) -> Result<Json<ApiResponse<PresenceSnapshot>>> {
    let snapshot = directory.snapshot().await;
    Ok(Json(ApiResponse::success(Some(snapshot), None, None)))
}
