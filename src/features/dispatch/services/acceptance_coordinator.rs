use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::accidents::models::AccidentStatus;
use crate::features::accidents::stores::{AccidentStore, ClaimResult};
use crate::features::dispatch::services::broadcaster::DispatchBroadcaster;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// This responder won the claim; `notified` other responders were told to withdraw
    Claimed { notified: usize },
    /// Repeat accept by the current holder
    AlreadyClaimedBySelf,
    AlreadyClaimed,
    NotDispatchable(AccidentStatus),
}

/// Resolves accept/reject decisions from responders
pub struct AcceptanceCoordinator {
    store: Arc<dyn AccidentStore>,
    broadcaster: Arc<DispatchBroadcaster>,
}

impl AcceptanceCoordinator {
    pub fn new(store: Arc<dyn AccidentStore>, broadcaster: Arc<DispatchBroadcaster>) -> Self {
        Self { store, broadcaster }
    }

    pub async fn accept(&self, accident_id: Uuid, responder_id: &str) -> Result<AcceptOutcome> {
        match self.store.claim(accident_id, responder_id).await? {
            ClaimResult::Claimed(report) => {
                tracing::info!("Accident {} claimed by responder {}", accident_id, responder_id);
                let notified = self.broadcaster.withdraw(&report, responder_id).await;
                Ok(AcceptOutcome::Claimed { notified })
            }
            ClaimResult::AlreadyClaimed { by } if by == responder_id => {
                Ok(AcceptOutcome::AlreadyClaimedBySelf)
            }
            ClaimResult::AlreadyClaimed { by } => {
                tracing::info!(
                    "Responder {} lost claim on accident {} to {}",
                    responder_id,
                    accident_id,
                    by
                );
                Ok(AcceptOutcome::AlreadyClaimed)
            }
            ClaimResult::NotDispatchable(status) => {
                tracing::info!(
                    "Responder {} tried to accept accident {} in status {}",
                    responder_id,
                    accident_id,
                    status
                );
                Ok(AcceptOutcome::NotDispatchable(status))
            }
            ClaimResult::NotFound => Err(AppError::NotFound(format!(
                "Accident {} not found",
                accident_id
            ))),
        }
    }

    /// Declining is local to the responder; the report is untouched
    pub async fn reject(&self, accident_id: Uuid, responder_id: &str) -> Result<()> {
        if self.store.get(accident_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Accident {} not found",
                accident_id
            )));
        }

        tracing::info!("Responder {} dismissed accident {}", responder_id, accident_id);
        Ok(())
    }
}
