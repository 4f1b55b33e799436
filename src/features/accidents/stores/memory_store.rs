use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccidentStore, ClaimResult};
use crate::core::error::Result;
use crate::features::accidents::models::{
    AccidentReport, AccidentStatus, ApplyDecision, CreateAccident,
};

/// Process-local report store used when no database is configured, and in tests.
/// Each operation runs under one write lock, which gives the same
/// conditional-update guarantees as the SQL store.
#[derive(Default)]
pub struct InMemoryAccidentStore {
    reports: RwLock<HashMap<Uuid, AccidentReport>>,
}

impl InMemoryAccidentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccidentStore for InMemoryAccidentStore {
    async fn create(&self, data: CreateAccident) -> Result<AccidentReport> {
        let now = Utc::now();
        let report = AccidentReport {
            id: Uuid::now_v7(),
            phone_number: data.phone_number,
            description: data.description,
            location: data.location,
            images: data.images,
            status: AccidentStatus::Reported,
            ml_confidence: None,
            decision_source: None,
            decided_by: None,
            decided_at: None,
            reported_by: data.reported_by,
            assigned_to: None,
            assigned_at: None,
            classification_attempts: 0,
            created_at: now,
            updated_at: now,
        };

        self.reports
            .write()
            .await
            .insert(report.id, report.clone());

        Ok(report)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AccidentReport>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<AccidentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AccidentReport>, i64)> {
        let reports = self.reports.read().await;
        let mut matching: Vec<&AccidentReport> = reports
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn apply_decision(
        &self,
        id: Uuid,
        decision: &ApplyDecision,
    ) -> Result<Option<AccidentReport>> {
        let mut reports = self.reports.write().await;
        let Some(report) = reports.get_mut(&id) else {
            return Ok(None);
        };
        if report.status.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now();
        report.status = decision.status;
        report.decision_source = Some(decision.source);
        if decision.ml_confidence.is_some() {
            report.ml_confidence = decision.ml_confidence;
        }
        report.decided_by = decision.decided_by.clone();
        report.decided_at = Some(now);
        report.updated_at = now;

        Ok(Some(report.clone()))
    }

    async fn claim(&self, id: Uuid, responder_id: &str) -> Result<ClaimResult> {
        let mut reports = self.reports.write().await;
        let Some(report) = reports.get_mut(&id) else {
            return Ok(ClaimResult::NotFound);
        };

        if let Some(by) = &report.assigned_to {
            return Ok(ClaimResult::AlreadyClaimed { by: by.clone() });
        }
        if report.status != AccidentStatus::Verified {
            return Ok(ClaimResult::NotDispatchable(report.status));
        }

        let now = Utc::now();
        report.assigned_to = Some(responder_id.to_string());
        report.assigned_at = Some(now);
        report.updated_at = now;

        Ok(ClaimResult::Claimed(report.clone()))
    }

    async fn record_classification_attempt(&self, id: Uuid) -> Result<()> {
        if let Some(report) = self.reports.write().await.get_mut(&id) {
            report.classification_attempts += 1;
            report.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_awaiting_classification(
        &self,
        created_before: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<AccidentReport>> {
        let reports = self.reports.read().await;
        let mut pending: Vec<AccidentReport> = reports
            .values()
            .filter(|r| {
                r.status == AccidentStatus::Reported
                    && !r.images.is_empty()
                    && r.classification_attempts < max_attempts
                    && r.created_at < created_before
            })
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit.max(0) as usize);

        Ok(pending)
    }
}
