use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Verification status of a report.
/// `Reported` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "accident_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccidentStatus {
    Reported,
    Verified,
    Rejected,
}

impl AccidentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AccidentStatus::Reported)
    }
}

impl std::fmt::Display for AccidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccidentStatus::Reported => write!(f, "reported"),
            AccidentStatus::Verified => write!(f, "verified"),
            AccidentStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for AccidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reported" => Ok(AccidentStatus::Reported),
            "verified" => Ok(AccidentStatus::Verified),
            "rejected" => Ok(AccidentStatus::Rejected),
            other => Err(format!("Unknown accident status: {}", other)),
        }
    }
}

/// Terminal outcome a decision can move a report to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Verified,
    Rejected,
}

impl Decision {
    pub fn status(self) -> AccidentStatus {
        match self {
            Decision::Verified => AccidentStatus::Verified,
            Decision::Rejected => AccidentStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "verified" => Ok(Decision::Verified),
            "rejected" => Ok(Decision::Rejected),
            other => Err(format!(
                "Invalid status value '{}': expected 'verified' or 'rejected'",
                other
            )),
        }
    }
}

/// Who made the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "decision_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Manual,
    Automated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "location_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    #[default]
    Gps,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
    pub zone_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Mp4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentImage {
    pub url: String,
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
}

/// Dispatch lifecycle of a verified report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    /// Broadcast sent, nobody has accepted yet
    Pending,
    /// A responder holds the case
    Claimed,
}

/// Domain model for an accident report
#[derive(Debug, Clone, PartialEq)]
pub struct AccidentReport {
    pub id: Uuid,
    pub phone_number: String,
    pub description: Option<String>,
    pub location: AccidentLocation,
    pub images: Vec<AccidentImage>,
    pub status: AccidentStatus,
    pub ml_confidence: Option<f64>,
    pub decision_source: Option<DecisionSource>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reported_by: Option<String>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub classification_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccidentReport {
    /// URL the classifier is consulted with
    pub fn primary_image_url(&self) -> Option<&str> {
        self.images
            .first()
            .map(|image| image.url.as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn dispatch_state(&self) -> Option<DispatchState> {
        match (self.status, &self.assigned_to) {
            (AccidentStatus::Verified, None) => Some(DispatchState::Pending),
            (AccidentStatus::Verified, Some(_)) => Some(DispatchState::Claimed),
            _ => None,
        }
    }
}

/// Data for creating a new report
#[derive(Debug, Clone)]
pub struct CreateAccident {
    pub phone_number: String,
    pub description: Option<String>,
    pub location: AccidentLocation,
    pub images: Vec<AccidentImage>,
    pub reported_by: Option<String>,
}

/// A decision ready to be written to the store
#[derive(Debug, Clone)]
pub struct ApplyDecision {
    pub status: AccidentStatus,
    pub source: DecisionSource,
    pub ml_confidence: Option<f64>,
    pub decided_by: Option<String>,
}
