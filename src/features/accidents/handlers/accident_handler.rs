use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, MaybeUser};
use crate::features::accidents::dtos::{
    AccidentCreatedDto, AccidentResponseDto, ClassificationResultDto, CreateAccidentDto,
    ListAccidentsQuery, StatusQuery, UpdateAccidentStatusDto,
};
use crate::features::accidents::services::{AccidentService, DecisionEngine, DecisionOutcome};
use crate::features::auth::guards::RequireAdmin;
use crate::shared::types::{ApiResponse, Meta, PaginationQuery};

/// State for accident handlers
#[derive(Clone)]
pub struct AccidentState {
    pub accident_service: Arc<AccidentService>,
    pub decision_engine: Arc<DecisionEngine>,
}

/// Submit an accident report
///
/// Authentication is optional; when a valid token is sent the report is
/// linked to its subject. Classification runs in the background.
#[utoipa::path(
    post,
    path = "/api/v1/accident/report",
    request_body = CreateAccidentDto,
    responses(
        (status = 201, description = "Report accepted", body = ApiResponse<AccidentCreatedDto>),
        (status = 400, description = "Validation error")
    ),
    tag = "accidents"
)]
pub async fn report_accident(
    MaybeUser(user): MaybeUser,
    State(state): State<AccidentState>,
    AppJson(dto): AppJson<CreateAccidentDto>,
) -> Result<(StatusCode, Json<ApiResponse<AccidentCreatedDto>>)> {
    let dto = dto.normalized();
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let report = state.accident_service.submit(dto, user.as_ref()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(report.into()),
            Some("Accident reported successfully".to_string()),
            None,
        )),
    ))
}

/// List accident reports (paginated)
#[utoipa::path(
    get,
    path = "/api/v1/accident/accidents",
    params(PaginationQuery, ListAccidentsQuery),
    responses(
        (status = 200, description = "List of accident reports", body = ApiResponse<Vec<AccidentResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = [])),
    tag = "accidents"
)]
pub async fn list_accidents(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AccidentState>,
    Query(params): Query<PaginationQuery>,
    Query(filter): Query<ListAccidentsQuery>,
) -> Result<Json<ApiResponse<Vec<AccidentResponseDto>>>> {
    let (reports, total) = state
        .accident_service
        .list(filter.status, params.offset(), params.limit())
        .await?;

    let dtos: Vec<AccidentResponseDto> = reports.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(
        Some(dtos),
        None,
        Some(Meta { total }),
    )))
}

/// Get an accident report by ID
#[utoipa::path(
    get,
    path = "/api/v1/accident/accidents/{id}",
    params(
        ("id" = Uuid, Path, description = "Accident ID")
    ),
    responses(
        (status = 200, description = "Accident found", body = ApiResponse<AccidentResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Accident not found")
    ),
    security(("bearer_auth" = [])),
    tag = "accidents"
)]
pub async fn get_accident(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AccidentState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccidentResponseDto>>> {
    let report = state.accident_service.get(id).await?;
    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}

/// Verify or reject a report
///
/// The status comes from the JSON body or the `status` query parameter.
/// A report that is already decided is returned unchanged.
#[utoipa::path(
    patch,
    path = "/api/v1/accident/accidents/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Accident ID"),
        StatusQuery
    ),
    request_body(content = UpdateAccidentStatusDto, description = "Optional when `status` is in the query"),
    responses(
        (status = 200, description = "Decision applied or report already decided", body = ApiResponse<AccidentResponseDto>),
        (status = 400, description = "Invalid status value"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Accident not found")
    ),
    security(("bearer_auth" = [])),
    tag = "accidents"
)]
pub async fn update_accident_status(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AccidentState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
    body: Bytes,
) -> Result<Json<ApiResponse<AccidentResponseDto>>> {
    let dto: UpdateAccidentStatusDto = if body.iter().all(u8::is_ascii_whitespace) {
        UpdateAccidentStatusDto::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON data: {}", e)))?
    };

    let status = dto
        .status
        .or(query.status)
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;

    let outcome = state
        .decision_engine
        .decide_manual(id, &status, &user.sub)
        .await?;

    let status = outcome.report().status;
    let message = match outcome {
        DecisionOutcome::Applied(_) => format!("Accident marked {}", status),
        DecisionOutcome::AlreadyDecided(_) => format!("Accident already {}", status),
    };

    Ok(Json(ApiResponse::success(
        Some(outcome.into_report().into()),
        Some(message),
        None,
    )))
}

/// Run automated classification for a report now
#[utoipa::path(
    post,
    path = "/api/v1/accident/accidents/{id}/classify",
    params(
        ("id" = Uuid, Path, description = "Accident ID")
    ),
    responses(
        (status = 200, description = "Classification attempted", body = ApiResponse<ClassificationResultDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Accident not found")
    ),
    security(("bearer_auth" = [])),
    tag = "accidents"
)]
pub async fn classify_accident(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<AccidentState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ClassificationResultDto>>> {
    let outcome = state.decision_engine.classify(id).await?;

    let result = ClassificationResultDto {
        outcome: outcome.label().to_string(),
        report: outcome.into_report().into(),
    };
    Ok(Json(ApiResponse::success(Some(result), None, None)))
}

#[cfg(test)]
mod tests {
    use crate::features::accidents::routes;
    use crate::features::accidents::services::{
        AccidentService, DecisionEngine, DecisionPolicy,
    };
    use crate::features::accidents::stores::{AccidentStore, InMemoryAccidentStore};
    use crate::features::dispatch::{DispatchBroadcaster, ZoneDirectory};
    use crate::shared::test_helpers::{
        create_driver_user, sample_accident, with_admin_auth, with_user_auth,
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::sync::Arc;

    use super::AccidentState;

    fn state() -> (Arc<InMemoryAccidentStore>, AccidentState) {
        let store = Arc::new(InMemoryAccidentStore::new());
        let broadcaster = Arc::new(DispatchBroadcaster::new(Arc::new(ZoneDirectory::new())));
        let engine = Arc::new(DecisionEngine::new(
            store.clone(),
            None,
            broadcaster,
            DecisionPolicy::default(),
        ));
        let accident_service = Arc::new(AccidentService::new(
            store.clone(),
            Arc::clone(&engine),
            "default".to_string(),
        ));
        (
            store,
            AccidentState {
                accident_service,
                decision_engine: engine,
            },
        )
    }

    #[tokio::test]
    async fn test_report_accident_returns_created() {
        let (_, state) = state();
        let server = TestServer::new(routes::public_routes(state)).unwrap();

        let response = server
            .post("/api/v1/accident/report")
            .json(&json!({
                "phoneNumber": "+62 812-3456-7890",
                "description": "Truck overturned near the toll gate",
                "location": { "latitude": -6.2, "longitude": 106.8, "source": "manual" },
                "images": [{ "url": "https://cdn.example.org/a.jpg", "publicId": "reports/a", "format": "jpg" }]
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "reported");
        assert_eq!(body["data"]["reportedBy"], Value::Null);
    }

    #[tokio::test]
    async fn test_report_accident_rejects_invalid_payload() {
        let (_, state) = state();
        let server = TestServer::new(routes::public_routes(state)).unwrap();

        let response = server
            .post("/api/v1/accident/report")
            .json(&json!({
                "phoneNumber": "call me",
                "location": { "latitude": 120.0, "longitude": 106.8 }
            }))
            .expect_failure()
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_status_update_via_body_and_query() {
        let (store, state) = state();
        let server = TestServer::new(with_admin_auth(routes::admin_routes(state))).unwrap();
        let first = store.create(sample_accident("default", 0)).await.unwrap();
        let second = store.create(sample_accident("default", 0)).await.unwrap();

        let response = server
            .patch(&format!("/api/v1/accident/accidents/{}/status", first.id))
            .json(&json!({ "status": "verified" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["status"], "verified");
        assert_eq!(body["data"]["decidedBy"], "test-admin");
        assert_eq!(body["data"]["dispatchState"], "pending");

        let response = server
            .patch(&format!("/api/v1/accident/accidents/{}/status", second.id))
            .add_query_param("status", "rejected")
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["status"], "rejected");
    }

    #[tokio::test]
    async fn test_invalid_status_is_rejected_without_change() {
        let (store, state) = state();
        let server = TestServer::new(with_admin_auth(routes::admin_routes(state))).unwrap();
        let report = store.create(sample_accident("default", 0)).await.unwrap();

        server
            .patch(&format!("/api/v1/accident/accidents/{}/status", report.id))
            .json(&json!({ "status": "in-progress" }))
            .expect_failure()
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let stored = store.get(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status.to_string(), "reported");
    }

    #[tokio::test]
    async fn test_unknown_accident_is_not_found() {
        let (_, state) = state();
        let server = TestServer::new(with_admin_auth(routes::admin_routes(state))).unwrap();

        server
            .get(&format!("/api/v1/accident/accidents/{}", uuid::Uuid::now_v7()))
            .expect_failure()
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let (_, state) = state();
        let server = TestServer::new(with_user_auth(
            routes::admin_routes(state),
            create_driver_user("amb-1"),
        ))
        .unwrap();

        server
            .get("/api/v1/accident/accidents")
            .expect_failure()
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (store, state) = state();
        let server = TestServer::new(with_admin_auth(routes::admin_routes(state))).unwrap();
        for _ in 0..3 {
            store.create(sample_accident("default", 0)).await.unwrap();
        }

        let response = server
            .get("/api/v1/accident/accidents")
            .add_query_param("status", "reported")
            .add_query_param("page_size", 2)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["meta"]["total"], 3);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_classify_without_classifier_is_skipped() {
        let (store, state) = state();
        let server = TestServer::new(with_admin_auth(routes::admin_routes(state))).unwrap();
        let report = store.create(sample_accident("default", 1)).await.unwrap();

        let response = server
            .post(&format!("/api/v1/accident/accidents/{}/classify", report.id))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["outcome"], "skipped");
        assert_eq!(body["data"]["report"]["status"], "reported");
    }
}
