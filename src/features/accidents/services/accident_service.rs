use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::accidents::dtos::CreateAccidentDto;
use crate::features::accidents::models::{
    AccidentLocation, AccidentReport, AccidentStatus, CreateAccident,
};
use crate::features::accidents::services::decision_service::DecisionEngine;
use crate::features::accidents::stores::AccidentStore;
use crate::features::auth::model::AuthenticatedUser;

/// Report intake and lookup
pub struct AccidentService {
    store: Arc<dyn AccidentStore>,
    engine: Arc<DecisionEngine>,
    default_zone_id: String,
}

impl AccidentService {
    pub fn new(
        store: Arc<dyn AccidentStore>,
        engine: Arc<DecisionEngine>,
        default_zone_id: String,
    ) -> Self {
        Self {
            store,
            engine,
            default_zone_id,
        }
    }

    /// Stores the report and schedules automated classification in the
    /// background. The caller never waits on the classifier.
    pub async fn submit(
        &self,
        dto: CreateAccidentDto,
        reporter: Option<&AuthenticatedUser>,
    ) -> Result<AccidentReport> {
        let data = CreateAccident {
            phone_number: dto.phone_number,
            description: dto.description,
            location: AccidentLocation {
                latitude: dto.location.latitude,
                longitude: dto.location.longitude,
                source: dto.location.source.unwrap_or_default(),
                zone_id: dto
                    .location
                    .zone_id
                    .unwrap_or_else(|| self.default_zone_id.clone()),
            },
            images: dto.images.into_iter().map(Into::into).collect(),
            reported_by: reporter.map(|u| u.sub.clone()),
        };

        let report = self.store.create(data).await?;
        tracing::info!(
            "Accident {} reported in zone {} with {} image(s)",
            report.id,
            report.location.zone_id,
            report.images.len()
        );

        if self.engine.classification_enabled() && report.primary_image_url().is_some() {
            let engine = Arc::clone(&self.engine);
            let id = report.id;
            tokio::spawn(async move {
                if let Err(e) = engine.classify(id).await {
                    tracing::error!("Background classification of accident {} failed: {}", id, e);
                }
            });
        }

        Ok(report)
    }

    pub async fn get(&self, id: Uuid) -> Result<AccidentReport> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Accident {} not found", id)))
    }

    pub async fn list(
        &self,
        status: Option<AccidentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AccidentReport>, i64)> {
        self.store.list(status, offset, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::accidents::dtos::{AccidentImageDto, AccidentLocationDto};
    use crate::features::accidents::models::LocationSource;
    use crate::features::accidents::services::classifier_client::{
        Classifier, ClassifierError, Prediction,
    };
    use crate::features::accidents::services::decision_service::DecisionPolicy;
    use crate::features::accidents::stores::InMemoryAccidentStore;
    use crate::features::dispatch::{DispatchBroadcaster, ZoneDirectory};
    use crate::shared::test_helpers::create_driver_user;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Never answers within the test
    struct HangingClassifier;

    #[async_trait]
    impl Classifier for HangingClassifier {
        async fn classify(&self, _image_url: &str) -> std::result::Result<Prediction, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ClassifierError::Timeout)
        }
    }

    struct ConfidentClassifier;

    #[async_trait]
    impl Classifier for ConfidentClassifier {
        async fn classify(&self, _image_url: &str) -> std::result::Result<Prediction, ClassifierError> {
            Ok(Prediction {
                label: "accident".to_string(),
                confidence: 0.95,
            })
        }
    }

    fn service(classifier: Option<Arc<dyn Classifier>>) -> (Arc<InMemoryAccidentStore>, AccidentService) {
        let store = Arc::new(InMemoryAccidentStore::new());
        let broadcaster = Arc::new(DispatchBroadcaster::new(Arc::new(ZoneDirectory::new())));
        let engine = Arc::new(DecisionEngine::new(
            store.clone(),
            classifier,
            broadcaster,
            DecisionPolicy::default(),
        ));
        let service = AccidentService::new(store.clone(), engine, "default".to_string());
        (store, service)
    }

    fn dto(zone_id: Option<&str>, images: usize) -> CreateAccidentDto {
        CreateAccidentDto {
            phone_number: "+62 812-3456-7890".to_string(),
            description: Some("Motorbike skidded on the flyover".to_string()),
            location: AccidentLocationDto {
                latitude: -6.2,
                longitude: 106.8,
                source: None,
                zone_id: zone_id.map(String::from),
            },
            images: (0..images)
                .map(|i| AccidentImageDto {
                    url: format!("https://cdn.example.org/{}.jpg", i),
                    public_id: format!("reports/{}", i),
                    format: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_submit_defaults_zone_and_source() {
        let (_, service) = service(None);
        let reporter = create_driver_user("citizen-9");

        let report = service.submit(dto(None, 0), Some(&reporter)).await.unwrap();

        assert_eq!(report.status, AccidentStatus::Reported);
        assert_eq!(report.location.zone_id, "default");
        assert_eq!(report.location.source, LocationSource::Gps);
        assert_eq!(report.reported_by.as_deref(), Some("citizen-9"));
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_classifier() {
        let (_, service) = service(Some(Arc::new(HangingClassifier)));

        let report = tokio::time::timeout(
            Duration::from_secs(1),
            service.submit(dto(Some("north"), 1), None),
        )
        .await
        .expect("submission must not block on classification")
        .unwrap();

        assert_eq!(report.status, AccidentStatus::Reported);
        assert_eq!(report.location.zone_id, "north");
    }

    #[tokio::test]
    async fn test_background_classification_verifies_report() {
        let (store, service) = service(Some(Arc::new(ConfidentClassifier)));
        let report = service.submit(dto(None, 2), None).await.unwrap();

        let mut status = AccidentStatus::Reported;
        for _ in 0..50 {
            status = store.get(report.id).await.unwrap().unwrap().status;
            if status != AccidentStatus::Reported {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, AccidentStatus::Verified);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (_, service) = service(None);
        assert!(matches!(
            service.get(Uuid::now_v7()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
