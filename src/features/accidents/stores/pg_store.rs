use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{AccidentStore, ClaimResult};
use crate::core::error::{AppError, Result};
use crate::features::accidents::models::{
    AccidentImage, AccidentLocation, AccidentReport, AccidentStatus, ApplyDecision,
    CreateAccident, DecisionSource, LocationSource,
};

const ACCIDENT_COLUMNS: &str = r#"
    id, phone_number, description,
    latitude, longitude, location_source, zone_id,
    images, status, ml_confidence,
    decision_source, decided_by, decided_at,
    reported_by, assigned_to, assigned_at,
    classification_attempts, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct AccidentRow {
    id: Uuid,
    phone_number: String,
    description: Option<String>,
    latitude: f64,
    longitude: f64,
    location_source: LocationSource,
    zone_id: String,
    images: Json<Vec<AccidentImage>>,
    status: AccidentStatus,
    ml_confidence: Option<f64>,
    decision_source: Option<DecisionSource>,
    decided_by: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    reported_by: Option<String>,
    assigned_to: Option<String>,
    assigned_at: Option<DateTime<Utc>>,
    classification_attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccidentRow> for AccidentReport {
    fn from(row: AccidentRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            description: row.description,
            location: AccidentLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                source: row.location_source,
                zone_id: row.zone_id,
            },
            images: row.images.0,
            status: row.status,
            ml_confidence: row.ml_confidence,
            decision_source: row.decision_source,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            reported_by: row.reported_by,
            assigned_to: row.assigned_to,
            assigned_at: row.assigned_at,
            classification_attempts: row.classification_attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed report store
pub struct PgAccidentStore {
    pool: PgPool,
}

impl PgAccidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccidentStore for PgAccidentStore {
    async fn create(&self, data: CreateAccident) -> Result<AccidentReport> {
        let sql = format!(
            r#"
            INSERT INTO accidents (
                id, phone_number, description,
                latitude, longitude, location_source, zone_id,
                images, reported_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ACCIDENT_COLUMNS
        );

        let row = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(&data.phone_number)
            .bind(&data.description)
            .bind(data.location.latitude)
            .bind(data.location.longitude)
            .bind(data.location.source)
            .bind(&data.location.zone_id)
            .bind(Json(&data.images))
            .bind(&data.reported_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create accident report: {:?}", e);
                AppError::Database(e)
            })?;

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AccidentReport>> {
        let sql = format!("SELECT {} FROM accidents WHERE id = $1", ACCIDENT_COLUMNS);

        let row = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch accident {}: {:?}", id, e);
                AppError::Database(e)
            })?;

        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        status: Option<AccidentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AccidentReport>, i64)> {
        let sql = format!(
            r#"
            SELECT {}
            FROM accidents
            WHERE ($1::accident_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            ACCIDENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list accidents: {:?}", e);
                AppError::Database(e)
            })?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accidents WHERE ($1::accident_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count accidents: {:?}", e);
            AppError::Database(e)
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn apply_decision(
        &self,
        id: Uuid,
        decision: &ApplyDecision,
    ) -> Result<Option<AccidentReport>> {
        let sql = format!(
            r#"
            UPDATE accidents
            SET status = $2,
                decision_source = $3,
                ml_confidence = COALESCE($4, ml_confidence),
                decided_by = $5,
                decided_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'reported'
            RETURNING {}
            "#,
            ACCIDENT_COLUMNS
        );

        let row = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(id)
            .bind(decision.status)
            .bind(decision.source)
            .bind(decision.ml_confidence)
            .bind(&decision.decided_by)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to apply decision to accident {}: {:?}", id, e);
                AppError::Database(e)
            })?;

        Ok(row.map(Into::into))
    }

    async fn claim(&self, id: Uuid, responder_id: &str) -> Result<ClaimResult> {
        let sql = format!(
            r#"
            UPDATE accidents
            SET assigned_to = $2,
                assigned_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'verified' AND assigned_to IS NULL
            RETURNING {}
            "#,
            ACCIDENT_COLUMNS
        );

        let claimed = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(id)
            .bind(responder_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to claim accident {}: {:?}", id, e);
                AppError::Database(e)
            })?;

        if let Some(row) = claimed {
            return Ok(ClaimResult::Claimed(row.into()));
        }

        // Lost the conditional update; report why
        Ok(match self.get(id).await? {
            None => ClaimResult::NotFound,
            Some(report) => match report.assigned_to {
                Some(by) => ClaimResult::AlreadyClaimed { by },
                None => ClaimResult::NotDispatchable(report.status),
            },
        })
    }

    async fn record_classification_attempt(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accidents
            SET classification_attempts = classification_attempts + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to record classification attempt for {}: {:?}", id, e);
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn list_awaiting_classification(
        &self,
        created_before: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AccidentReport>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM accidents
            WHERE status = 'reported'
              AND jsonb_array_length(images) > 0
              AND classification_attempts < $1
              AND created_at < $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
            ACCIDENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, AccidentRow>(&sql)
            .bind(max_attempts)
            .bind(created_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list accidents awaiting classification: {:?}", e);
                AppError::Database(e)
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
