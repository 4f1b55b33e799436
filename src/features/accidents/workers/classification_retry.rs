use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;

use crate::core::config::ClassifierConfig;
use crate::core::error::Result;
use crate::features::accidents::services::{ClassificationOutcome, DecisionEngine};
use crate::features::accidents::stores::AccidentStore;

/// Background worker that retries classification for reports the intake
/// task could not decide (classifier down, timeout, malformed reply).
pub struct ClassificationRetryWorker {
    store: Arc<dyn AccidentStore>,
    engine: Arc<DecisionEngine>,
    config: ClassifierConfig,
}

impl ClassificationRetryWorker {
    pub fn new(
        store: Arc<dyn AccidentStore>,
        engine: Arc<DecisionEngine>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Run the worker in a background loop
    pub async fn run(&self) {
        tracing::info!(
            "Starting classification retry worker (every {:?}, max {} attempts)",
            self.config.retry_interval,
            self.config.max_attempts
        );

        let mut interval = interval(self.config.retry_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_batch().await {
                tracing::error!("Error processing classification batch: {:?}", e);
            }
        }
    }

    /// Returns how many reports reached a decision
    async fn process_batch(&self) -> Result<usize> {
        let min_age = chrono::Duration::from_std(self.config.retry_min_age)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let pending = self
            .store
            .list_awaiting_classification(
                Utc::now() - min_age,
                self.config.max_attempts,
                self.config.retry_batch_size,
            )
            .await?;

        if pending.is_empty() {
            return Ok(0);
        }

        tracing::info!("Retrying classification for {} report(s)", pending.len());

        let mut decided = 0;
        for report in pending {
            match self.engine.classify(report.id).await {
                Ok(ClassificationOutcome::Decided(_)) => decided += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("Failed to classify accident {}: {:?}", report.id, e);
                }
            }
        }

        Ok(decided)
    }
}
