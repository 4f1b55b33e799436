mod accident_service;
pub mod classifier_client;
mod decision_service;

pub use accident_service::AccidentService;
pub use classifier_client::{Classifier, HttpClassifier};
pub use decision_service::{ClassificationOutcome, DecisionEngine, DecisionOutcome, DecisionPolicy};
