use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::accidents::models::{AccidentLocation, AccidentReport};
use crate::shared::constants::DISPATCH_TITLE;
use crate::shared::validation::ZONE_ID_REGEX;

/// Notification pushed to every subscriber of a zone when a report is verified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    pub accident_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: AccidentLocation,
    /// When the report was submitted
    pub time: DateTime<Utc>,
}

impl From<&AccidentReport> for DispatchEvent {
    fn from(report: &AccidentReport) -> Self {
        Self {
            accident_id: report.id,
            title: DISPATCH_TITLE.to_string(),
            description: report.description.clone(),
            location: report.location.clone(),
            time: report.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccidentRef {
    pub accident_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DeclineReason {
    AlreadyClaimed,
    NotDispatchable,
}

/// Frames sent to a responder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ZoneJoined { zone_id: String },
    #[serde(rename_all = "camelCase")]
    Presence {
        online: bool,
        zone_id: Option<String>,
    },
    NewEmergency(DispatchEvent),
    /// Withdrawal: someone else took the case
    RemoveAccident(AccidentRef),
    AcceptConfirmed(AccidentRef),
    #[serde(rename_all = "camelCase")]
    AcceptDeclined {
        accident_id: Uuid,
        reason: DeclineReason,
    },
    AccidentDismissed(AccidentRef),
    /// A newer connection for the same responder took over this one
    SessionReplaced,
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these plain enums cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","data":{"message":"Failed to encode message"}}"#.to_string()
        })
    }
}

/// Frames received from a responder
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    JoinZone { zone_id: String },
    GoOnline,
    GoOffline,
    LeaveZone,
    Accept { accident_id: Uuid },
    Reject { accident_id: Uuid },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinZonePayload {
    zone_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccidentPayload {
    accident_id: Uuid,
}

impl ClientMessage {
    /// Parses one text frame `{ "event": ..., "data": ... }`.
    /// The online/offline frames may carry an `ambulanceId`; it is ignored in
    /// favour of the authenticated identity.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("Malformed frame: {}", e)))?;

        match envelope.event.as_str() {
            "join-ambulance-zone" => {
                let payload: JoinZonePayload = payload(envelope.data, &envelope.event)?;
                let zone_id = payload.zone_id.trim().to_string();
                if !ZONE_ID_REGEX.is_match(&zone_id) {
                    return Err(AppError::Validation(format!(
                        "Invalid zone id: {}",
                        payload.zone_id
                    )));
                }
                Ok(ClientMessage::JoinZone { zone_id })
            }
            "ambulance-online" => Ok(ClientMessage::GoOnline),
            "ambulance-offline" => Ok(ClientMessage::GoOffline),
            "leave-zone" => Ok(ClientMessage::LeaveZone),
            "accept-accident" => {
                let payload: AccidentPayload = payload(envelope.data, &envelope.event)?;
                Ok(ClientMessage::Accept {
                    accident_id: payload.accident_id,
                })
            }
            "reject-accident" => {
                let payload: AccidentPayload = payload(envelope.data, &envelope.event)?;
                Ok(ClientMessage::Reject {
                    accident_id: payload.accident_id,
                })
            }
            other => Err(AppError::Validation(format!("Unknown event: {}", other))),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(data: Value, event: &str) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|e| AppError::Validation(format!("Invalid payload for {}: {}", event, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_trims_zone() {
        let msg = ClientMessage::parse(r#"{"event":"join-ambulance-zone","data":{"zoneId":" north "}}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinZone {
                zone_id: "north".to_string()
            }
        );
    }

    #[test]
    fn test_parse_online_ignores_ambulance_id() {
        let msg =
            ClientMessage::parse(r#"{"event":"ambulance-online","data":{"ambulanceId":"spoofed"}}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::GoOnline);
        assert_eq!(
            ClientMessage::parse(r#"{"event":"ambulance-offline"}"#).unwrap(),
            ClientMessage::GoOffline
        );
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(ClientMessage::parse("hello").is_err());
        assert!(ClientMessage::parse(r#"{"event":"self-destruct"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"event":"accept-accident","data":{"accidentId":"nope"}}"#).is_err());
        assert!(ClientMessage::parse(r#"{"event":"join-ambulance-zone","data":{"zoneId":"a b"}}"#).is_err());
        assert!(ClientMessage::parse(r#"{"event":"join-ambulance-zone"}"#).is_err());
    }

    #[test]
    fn test_server_messages_use_event_envelope() {
        let id = Uuid::now_v7();
        let declined = serde_json::to_value(ServerMessage::AcceptDeclined {
            accident_id: id,
            reason: DeclineReason::AlreadyClaimed,
        })
        .unwrap();
        assert_eq!(
            declined,
            json!({
                "event": "accept-declined",
                "data": { "accidentId": id, "reason": "already-claimed" }
            })
        );

        let removed = serde_json::to_value(ServerMessage::RemoveAccident(AccidentRef {
            accident_id: id,
        }))
        .unwrap();
        assert_eq!(
            removed,
            json!({ "event": "remove-accident", "data": { "accidentId": id } })
        );

        let replaced = serde_json::to_value(ServerMessage::SessionReplaced).unwrap();
        assert_eq!(replaced["event"], "session-replaced");
    }
}
