use std::sync::Arc;

use uuid::Uuid;

use crate::core::config::ClassifierConfig;
use crate::core::error::{AppError, Result};
use crate::features::accidents::models::{
    AccidentReport, AccidentStatus, ApplyDecision, Decision, DecisionSource,
};
use crate::features::accidents::services::classifier_client::{Classifier, Prediction};
use crate::features::accidents::stores::AccidentStore;
use crate::features::dispatch::DispatchBroadcaster;

/// Maps a classifier prediction to a decision
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// Confidence must be strictly greater than this to verify
    pub threshold: f64,
    pub positive_label: String,
}

impl DecisionPolicy {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            positive_label: config.positive_label.clone(),
        }
    }

    pub fn evaluate(&self, prediction: &Prediction) -> Decision {
        if prediction.label == self.positive_label && prediction.confidence > self.threshold {
            Decision::Verified
        } else {
            Decision::Rejected
        }
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

/// Who is deciding
#[derive(Debug, Clone)]
pub enum DecisionInput {
    Manual { actor: String },
    Automated { confidence: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// The report moved out of `reported` with this call
    Applied(AccidentReport),
    /// Nothing written; the report was already terminal
    AlreadyDecided(AccidentReport),
}

impl DecisionOutcome {
    pub fn report(&self) -> &AccidentReport {
        match self {
            DecisionOutcome::Applied(r) | DecisionOutcome::AlreadyDecided(r) => r,
        }
    }

    pub fn into_report(self) -> AccidentReport {
        match self {
            DecisionOutcome::Applied(r) | DecisionOutcome::AlreadyDecided(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Decided(DecisionOutcome),
    /// The classifier could not answer; the report stays `reported`
    Deferred(AccidentReport),
    /// Nothing to classify (decided already, no image, or classifier disabled)
    Skipped(AccidentReport),
}

impl ClassificationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationOutcome::Decided(_) => "decided",
            ClassificationOutcome::Deferred(_) => "deferred",
            ClassificationOutcome::Skipped(_) => "skipped",
        }
    }

    pub fn into_report(self) -> AccidentReport {
        match self {
            ClassificationOutcome::Decided(outcome) => outcome.into_report(),
            ClassificationOutcome::Deferred(r) | ClassificationOutcome::Skipped(r) => r,
        }
    }
}

/// Resolves the terminal status of a report, manually or through the classifier.
/// A report is decided at most once; a verification is dispatched to its zone.
pub struct DecisionEngine {
    store: Arc<dyn AccidentStore>,
    classifier: Option<Arc<dyn Classifier>>,
    broadcaster: Arc<DispatchBroadcaster>,
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(
        store: Arc<dyn AccidentStore>,
        classifier: Option<Arc<dyn Classifier>>,
        broadcaster: Arc<DispatchBroadcaster>,
        policy: DecisionPolicy,
    ) -> Self {
        Self {
            store,
            classifier,
            broadcaster,
            policy,
        }
    }

    pub fn classification_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn decide(
        &self,
        id: Uuid,
        decision: Decision,
        input: DecisionInput,
    ) -> Result<DecisionOutcome> {
        let apply = match &input {
            DecisionInput::Manual { actor } => ApplyDecision {
                status: decision.status(),
                source: DecisionSource::Manual,
                ml_confidence: None,
                decided_by: Some(actor.clone()),
            },
            DecisionInput::Automated { confidence } => ApplyDecision {
                status: decision.status(),
                source: DecisionSource::Automated,
                ml_confidence: Some(*confidence),
                decided_by: None,
            },
        };

        let Some(updated) = self.store.apply_decision(id, &apply).await? else {
            let current = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Accident {} not found", id)))?;
            tracing::info!(
                "Accident {} already {}, ignoring {:?} decision",
                id,
                current.status,
                apply.source
            );
            return Ok(DecisionOutcome::AlreadyDecided(current));
        };

        tracing::info!(
            "Accident {} marked {} ({:?})",
            updated.id,
            updated.status,
            apply.source
        );

        if updated.status == AccidentStatus::Verified {
            self.broadcaster.broadcast(&updated).await;
        }

        Ok(DecisionOutcome::Applied(updated))
    }

    /// Admin decision from a raw status value; anything but
    /// `verified`/`rejected` is refused without writing.
    pub async fn decide_manual(
        &self,
        id: Uuid,
        status: &str,
        actor: &str,
    ) -> Result<DecisionOutcome> {
        let decision: Decision = status.parse().map_err(AppError::Validation)?;
        self.decide(
            id,
            decision,
            DecisionInput::Manual {
                actor: actor.to_string(),
            },
        )
        .await
    }

    /// Automated path. Classifier failures are logged and leave the report
    /// `reported`; they never surface as a decision or an error.
    pub async fn classify(&self, id: Uuid) -> Result<ClassificationOutcome> {
        let report = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Accident {} not found", id)))?;

        let Some(classifier) = &self.classifier else {
            return Ok(ClassificationOutcome::Skipped(report));
        };
        if report.status != AccidentStatus::Reported {
            return Ok(ClassificationOutcome::Skipped(report));
        }
        let Some(image_url) = report.primary_image_url().map(str::to_string) else {
            tracing::debug!("Accident {} has no image, leaving for manual review", id);
            return Ok(ClassificationOutcome::Skipped(report));
        };

        let result = classifier.classify(&image_url).await;
        self.store.record_classification_attempt(id).await?;

        match result {
            Ok(prediction) => {
                let decision = self.policy.evaluate(&prediction);
                tracing::info!(
                    "Classifier labelled accident {} as {} ({:.3}) -> {:?}",
                    id,
                    prediction.label,
                    prediction.confidence,
                    decision
                );
                let outcome = self
                    .decide(
                        id,
                        decision,
                        DecisionInput::Automated {
                            confidence: prediction.confidence,
                        },
                    )
                    .await?;
                Ok(ClassificationOutcome::Decided(outcome))
            }
            Err(e) => {
                tracing::warn!("Classification of accident {} deferred: {}", id, e);
                let current = self.store.get(id).await?.unwrap_or(report);
                Ok(ClassificationOutcome::Deferred(current))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::accidents::services::classifier_client::ClassifierError;
    use crate::features::accidents::stores::InMemoryAccidentStore;
    use crate::features::dispatch::models::ServerMessage;
    use crate::features::dispatch::ZoneDirectory;
    use crate::shared::test_helpers::sample_accident;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FixedClassifier {
        label: &'static str,
        confidence: f64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _image_url: &str) -> std::result::Result<Prediction, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Prediction {
                label: self.label.to_string(),
                confidence: self.confidence,
            })
        }
    }

    struct TimingOutClassifier;

    #[async_trait]
    impl Classifier for TimingOutClassifier {
        async fn classify(&self, _image_url: &str) -> std::result::Result<Prediction, ClassifierError> {
            Err(ClassifierError::Timeout)
        }
    }

    fn fixed(label: &'static str, confidence: f64) -> Arc<FixedClassifier> {
        Arc::new(FixedClassifier {
            label,
            confidence,
            calls: AtomicUsize::new(0),
        })
    }

    struct Fixture {
        store: Arc<InMemoryAccidentStore>,
        directory: Arc<ZoneDirectory>,
        engine: DecisionEngine,
    }

    fn fixture(classifier: Option<Arc<dyn Classifier>>) -> Fixture {
        let store = Arc::new(InMemoryAccidentStore::new());
        let directory = Arc::new(ZoneDirectory::new());
        let broadcaster = Arc::new(DispatchBroadcaster::new(Arc::clone(&directory)));
        let engine = DecisionEngine::new(
            store.clone(),
            classifier,
            broadcaster,
            DecisionPolicy::default(),
        );
        Fixture {
            store,
            directory,
            engine,
        }
    }

    async fn subscribe(directory: &ZoneDirectory, responder: &str, zone: &str) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(8);
        let conn = directory.connect(responder, tx).await;
        directory.join(responder, conn, zone).await.unwrap();
        rx
    }

    #[test]
    fn test_policy_threshold_is_strict() {
        let policy = DecisionPolicy::default();
        let at = |label: &str, confidence| {
            policy.evaluate(&Prediction {
                label: label.to_string(),
                confidence,
            })
        };
        assert_eq!(at("accident", 0.81), Decision::Verified);
        assert_eq!(at("accident", 0.8), Decision::Rejected);
        assert_eq!(at("normal", 0.99), Decision::Rejected);
    }

    #[tokio::test]
    async fn test_confident_accident_is_verified_and_dispatched() {
        let classifier = fixed("accident", 0.93);
        let f = fixture(Some(classifier.clone()));
        let mut north = subscribe(&f.directory, "amb-n", "north").await;
        let mut south = subscribe(&f.directory, "amb-s", "south").await;
        let report = f.store.create(sample_accident("north", 1)).await.unwrap();

        let outcome = f.engine.classify(report.id).await.unwrap();

        let report = outcome.clone().into_report();
        assert_eq!(outcome.label(), "decided");
        assert_eq!(report.status, AccidentStatus::Verified);
        assert_eq!(report.ml_confidence, Some(0.93));
        assert_eq!(report.decision_source, Some(DecisionSource::Automated));
        assert!(matches!(north.try_recv(), Ok(ServerMessage::NewEmergency(e)) if e.accident_id == report.id));
        assert!(south.try_recv().is_err());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_label_is_rejected_without_dispatch() {
        let f = fixture(Some(fixed("normal", 0.97)));
        let mut rx = subscribe(&f.directory, "amb-1", "default").await;
        let report = f.store.create(sample_accident("default", 1)).await.unwrap();

        let report = f.engine.classify(report.id).await.unwrap().into_report();

        assert_eq!(report.status, AccidentStatus::Rejected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_classifier_timeout_defers_decision() {
        let f = fixture(Some(Arc::new(TimingOutClassifier)));
        let report = f.store.create(sample_accident("default", 1)).await.unwrap();

        let outcome = f.engine.classify(report.id).await.unwrap();

        assert_eq!(outcome.label(), "deferred");
        let stored = f.store.get(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccidentStatus::Reported);
        assert_eq!(stored.classification_attempts, 1);
    }

    #[tokio::test]
    async fn test_manual_decision_is_final() {
        let classifier = fixed("accident", 0.99);
        let f = fixture(Some(classifier.clone()));
        let mut rx = subscribe(&f.directory, "amb-1", "default").await;
        let report = f.store.create(sample_accident("default", 1)).await.unwrap();

        let first = f
            .engine
            .decide_manual(report.id, "verified", "ops-1")
            .await
            .unwrap();
        assert!(matches!(first, DecisionOutcome::Applied(_)));
        assert_eq!(first.report().decided_by.as_deref(), Some("ops-1"));

        let second = f
            .engine
            .decide_manual(report.id, "rejected", "ops-2")
            .await
            .unwrap();
        assert!(matches!(second, DecisionOutcome::AlreadyDecided(ref r) if r.status == AccidentStatus::Verified));

        // Automated path no longer consults the classifier
        let skipped = f.engine.classify(report.id).await.unwrap();
        assert_eq!(skipped.label(), "skipped");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);

        // Exactly one dispatch
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_manual_status_writes_nothing() {
        let f = fixture(None);
        let report = f.store.create(sample_accident("default", 0)).await.unwrap();

        for bad in ["reported", "in-progress", ""] {
            assert!(matches!(
                f.engine.decide_manual(report.id, bad, "ops-1").await,
                Err(AppError::Validation(_))
            ));
        }
        let stored = f.store.get(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccidentStatus::Reported);
        assert!(stored.decided_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let f = fixture(None);
        assert!(matches!(
            f.engine.decide_manual(Uuid::now_v7(), "verified", "ops-1").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.classify(Uuid::now_v7()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_report_without_images_is_skipped() {
        let classifier = fixed("accident", 0.99);
        let f = fixture(Some(classifier.clone()));
        let report = f.store.create(sample_accident("default", 0)).await.unwrap();

        let outcome = f.engine.classify(report.id).await.unwrap();
        assert_eq!(outcome.label(), "skipped");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }
}
