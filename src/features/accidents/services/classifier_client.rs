use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::config::ClassifierConfig;

/// A usable classifier answer
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier timed out")]
    Timeout,

    #[error("classifier unreachable: {0}")]
    Connection(String),

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("classifier reported an error: {0}")]
    Remote(String),

    #[error("malformed classifier reply: {0}")]
    InvalidResponse(String),
}

/// Opaque image classifier consulted by the automated decision path
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_url: &str) -> Result<Prediction, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    image_url: &'a str,
}

/// Reply body of `POST /predict`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierReply {
    Prediction {
        prediction: String,
        confidence: f64,
        #[serde(default)]
        #[allow(dead_code)]
        probabilities: Option<HashMap<String, f64>>,
    },
    Error {
        error: String,
    },
}

impl ClassifierReply {
    fn into_prediction(self) -> Result<Prediction, ClassifierError> {
        match self {
            ClassifierReply::Prediction {
                prediction,
                confidence,
                ..
            } => {
                if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                    return Err(ClassifierError::InvalidResponse(format!(
                        "confidence out of range: {}",
                        confidence
                    )));
                }
                if prediction.trim().is_empty() {
                    return Err(ClassifierError::InvalidResponse(
                        "empty prediction label".to_string(),
                    ));
                }
                Ok(Prediction {
                    label: prediction,
                    confidence,
                })
            }
            ClassifierReply::Error { error } => Err(ClassifierError::Remote(error)),
        }
    }
}

/// HTTP client for the ML server
pub struct HttpClassifier {
    client: reqwest::Client,
    predict_url: String,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("AccidentDispatchCore/0.1 (classifier-client)")
            .build()
            .map_err(|e| ClassifierError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            predict_url: config.predict_url(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image_url: &str) -> Result<Prediction, ClassifierError> {
        tracing::debug!("Classifying image {} via {}", image_url, self.predict_url);

        let response = self
            .client
            .post(&self.predict_url)
            .json(&PredictRequest { image_url })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Connection(e.to_string())
            }
        })?;

        let reply = serde_json::from_str::<ClassifierReply>(&body);
        if !status.is_success() {
            // Prefer the server's own error message when it sent one
            return match reply {
                Ok(ClassifierReply::Error { error }) => Err(ClassifierError::Remote(error)),
                _ => Err(ClassifierError::Status(status.as_u16())),
            };
        }

        reply
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?
            .into_prediction()
    }
}
