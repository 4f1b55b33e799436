mod memory_store;
mod pg_store;

pub use memory_store::InMemoryAccidentStore;
pub use pg_store::PgAccidentStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::accidents::models::{
    AccidentReport, AccidentStatus, ApplyDecision, CreateAccident,
};

/// Outcome of a responder trying to take a verified case
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// This call assigned the responder
    Claimed(AccidentReport),
    /// The case was already assigned, possibly to the same responder
    AlreadyClaimed { by: String },
    /// The report is not verified
    NotDispatchable(AccidentStatus),
    NotFound,
}

/// Persistent record of accident reports.
///
/// Every status write is conditional on the report still being `reported`,
/// and a claim is conditional on the report being verified and unassigned,
/// so concurrent callers can never both succeed.
#[async_trait]
pub trait AccidentStore: Send + Sync {
    async fn create(&self, data: CreateAccident) -> Result<AccidentReport>;

    async fn get(&self, id: Uuid) -> Result<Option<AccidentReport>>;

    /// Newest first, with the total count for the filter
    async fn list(
        &self,
        status: Option<AccidentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AccidentReport>, i64)>;

    /// Returns the updated report, or `None` when nothing was written
    /// (missing, or already decided).
    async fn apply_decision(
        &self,
        id: Uuid,
        decision: &ApplyDecision,
    ) -> Result<Option<AccidentReport>>;

    async fn claim(&self, id: Uuid, responder_id: &str) -> Result<ClaimResult>;

    async fn record_classification_attempt(&self, id: Uuid) -> Result<()>;

    /// Reports still `reported` with at least one image, created before the
    /// cutoff and attempted fewer than `max_attempts` times, oldest first.
    async fn list_awaiting_classification(
        &self,
        created_before: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AccidentReport>>;
}
