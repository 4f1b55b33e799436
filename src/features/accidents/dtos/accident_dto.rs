use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::accidents::models::{
    AccidentImage, AccidentLocation, AccidentReport, AccidentStatus, DecisionSource,
    DispatchState, ImageFormat, LocationSource,
};

// =============================================================================
// INTAKE DTOs
// =============================================================================

/// Request DTO for submitting an accident report
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccidentDto {
    #[validate(regex(
        path = "*crate::shared::validation::PHONE_REGEX",
        message = "Phone number must contain 7-20 digits, optionally prefixed with '+'"
    ))]
    pub phone_number: String,

    #[validate(length(
        min = 10,
        max = 1000,
        message = "Description must be 10-1000 characters"
    ))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[validate(nested)]
    pub location: AccidentLocationDto,

    #[validate(
        length(max = 5, message = "At most 5 images can be attached"),
        nested
    )]
    #[serde(default)]
    pub images: Vec<AccidentImageDto>,
}

impl CreateAccidentDto {
    /// Trims free-text fields and drops a blank description
    pub fn normalized(mut self) -> Self {
        self.phone_number = self.phone_number.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.location.zone_id = self
            .location
            .zone_id
            .map(|z| z.trim().to_string())
            .filter(|z| !z.is_empty());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentLocationDto {
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub latitude: f64,

    #[validate(range(
        min = -180.0,
        max = 180.0,
        message = "Longitude must be between -180 and 180"
    ))]
    pub longitude: f64,

    /// Defaults to `gps`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LocationSource>,

    /// Dispatch zone; the configured default zone when absent
    #[validate(regex(
        path = "*crate::shared::validation::ZONE_ID_REGEX",
        message = "Zone id must be 1-64 letters, digits, '-' or '_'"
    ))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentImageDto {
    #[validate(length(min = 1, max = 2048, message = "Image url is required"))]
    pub url: String,

    #[validate(length(min = 1, max = 512, message = "Image publicId is required"))]
    pub public_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
}

impl From<AccidentImageDto> for AccidentImage {
    fn from(dto: AccidentImageDto) -> Self {
        Self {
            url: dto.url.trim().to_string(),
            public_id: dto.public_id.trim().to_string(),
            format: dto.format,
        }
    }
}

/// Response DTO returned by intake
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentCreatedDto {
    pub id: Uuid,
    pub status: AccidentStatus,
    pub reported_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AccidentReport> for AccidentCreatedDto {
    fn from(r: AccidentReport) -> Self {
        Self {
            id: r.id,
            status: r.status,
            reported_by: r.reported_by,
            created_at: r.created_at,
        }
    }
}

// =============================================================================
// ADMIN DTOs
// =============================================================================

/// Response DTO for a full accident report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentResponseDto {
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
    pub dispatch_state: Option<DispatchState>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub classification_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccidentReport> for AccidentResponseDto {
    fn from(r: AccidentReport) -> Self {
        let dispatch_state = r.dispatch_state();
        Self {
            id: r.id,
            phone_number: r.phone_number,
            description: r.description,
            location: r.location,
            images: r.images,
            status: r.status,
            ml_confidence: r.ml_confidence,
            decision_source: r.decision_source,
            decided_by: r.decided_by,
            decided_at: r.decided_at,
            reported_by: r.reported_by,
            dispatch_state,
            assigned_to: r.assigned_to,
            assigned_at: r.assigned_at,
            classification_attempts: r.classification_attempts,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Request DTO for a manual decision.
/// The status may also be sent as the `status` query parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateAccidentStatusDto {
    /// `verified` or `rejected`
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// `verified` or `rejected`
    pub status: Option<String>,
}

/// Filters for listing reports, combined with `PaginationQuery`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListAccidentsQuery {
    /// Filter by verification status
    pub status: Option<AccidentStatus>,
}

/// Result of an automated classification run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResultDto {
    /// `decided`, `deferred` or `skipped`
    pub outcome: String,
    pub report: AccidentResponseDto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> serde_json::Value {
        json!({
            "phoneNumber": "  +62 812-3456-7890 ",
            "description": "Two cars collided at the junction",
            "location": { "latitude": -6.2, "longitude": 106.8 },
            "images": [{ "url": "https://cdn.example.org/a.jpg", "publicId": "reports/a" }]
        })
    }

    #[test]
    fn test_valid_payload_passes_after_normalizing() {
        let dto: CreateAccidentDto = serde_json::from_value(valid_payload()).unwrap();
        let dto = dto.normalized();
        assert_eq!(dto.phone_number, "+62 812-3456-7890");
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_longest_accepted_phone_fits_column() {
        // 20 digits with a separator between each pair
        let longest = format!("+1{}", " 2".repeat(19));
        assert_eq!(longest.len(), 40);

        let mut payload = valid_payload();
        payload["phoneNumber"] = json!(longest);
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_ok());

        let mut payload = valid_payload();
        payload["phoneNumber"] = json!(format!("{} 3", longest));
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_latitude() {
        let mut payload = valid_payload();
        payload["location"]["latitude"] = json!(91.0);
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_err());
    }

    #[test]
    fn test_rejects_short_description_and_too_many_images() {
        let mut payload = valid_payload();
        payload["description"] = json!("crash");
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_err());

        let mut payload = valid_payload();
        let image = json!({ "url": "https://cdn.example.org/a.jpg", "publicId": "reports/a" });
        payload["images"] = json!(vec![image; 6]);
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_err());
    }

    #[test]
    fn test_rejects_invalid_zone_id() {
        let mut payload = valid_payload();
        payload["location"]["zoneId"] = json!("north zone");
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        assert!(dto.normalized().validate().is_err());
    }

    #[test]
    fn test_blank_description_is_dropped() {
        let mut payload = valid_payload();
        payload["description"] = json!("   ");
        let dto: CreateAccidentDto = serde_json::from_value(payload).unwrap();
        let dto = dto.normalized();
        assert!(dto.description.is_none());
        assert!(dto.validate().is_ok());
    }
}
