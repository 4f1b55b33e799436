use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::dispatch::models::ServerMessage;

/// Sending half of a connection's outbound queue
pub type Outbox = mpsc::Sender<ServerMessage>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("responder {0} has no open session")]
    NotConnected(String),

    #[error("connection for responder {0} was replaced")]
    Replaced(String),
}

impl From<DirectoryError> for AppError {
    fn from(e: DirectoryError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

struct Session {
    connection_id: Uuid,
    zone_id: Option<String>,
    online: bool,
    outbox: Outbox,
}

/// Presence of one responder after a directory change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceState {
    pub online: bool,
    pub zone_id: Option<String>,
}

/// A session that should receive zone traffic
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub responder_id: String,
    pub outbox: Outbox,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZonePresence {
    pub zone_id: String,
    /// Online sessions subscribed to the zone
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub connected: usize,
    pub online: usize,
    pub zones: Vec<ZonePresence>,
}

/// In-memory map of responder sessions to their zone and presence.
///
/// A responder has at most one live session and at most one zone.
/// Nothing here survives a restart; responders re-join after reconnecting.
#[derive(Default)]
pub struct ZoneDirectory {
    sessions: RwLock<HashMap<String, Session>>,
}

impl ZoneDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection for the responder, online with no zone.
    /// An existing session is replaced and told so.
    pub async fn connect(&self, responder_id: &str, outbox: Outbox) -> Uuid {
        let connection_id = Uuid::now_v7();
        let previous = self.sessions.write().await.insert(
            responder_id.to_string(),
            Session {
                connection_id,
                zone_id: None,
                online: true,
                outbox,
            },
        );

        if let Some(old) = previous {
            tracing::info!(
                "Responder {} reconnected, replacing connection {}",
                responder_id,
                old.connection_id
            );
            if old.outbox.try_send(ServerMessage::SessionReplaced).is_err() {
                tracing::debug!("Replaced connection {} already gone", old.connection_id);
            }
        }

        connection_id
    }

    /// Subscribes to exactly one zone, dropping any previous subscription
    pub async fn join(
        &self,
        responder_id: &str,
        connection_id: Uuid,
        zone_id: &str,
    ) -> Result<PresenceState, DirectoryError> {
        self.update(responder_id, connection_id, |session| {
            session.zone_id = Some(zone_id.to_string());
            session.online = true;
        })
        .await
    }

    /// Marks online without subscribing to a zone
    pub async fn go_online(
        &self,
        responder_id: &str,
        connection_id: Uuid,
    ) -> Result<PresenceState, DirectoryError> {
        self.update(responder_id, connection_id, |session| session.online = true)
            .await
    }

    pub async fn go_offline(
        &self,
        responder_id: &str,
        connection_id: Uuid,
    ) -> Result<PresenceState, DirectoryError> {
        self.update(responder_id, connection_id, |session| {
            session.zone_id = None;
            session.online = false;
        })
        .await
    }

    pub async fn leave(
        &self,
        responder_id: &str,
        connection_id: Uuid,
    ) -> Result<PresenceState, DirectoryError> {
        self.update(responder_id, connection_id, |session| session.zone_id = None)
            .await
    }

    /// True while `connection_id` is the responder's current connection
    pub async fn is_live(&self, responder_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .read()
            .await
            .get(responder_id)
            .is_some_and(|s| s.connection_id == connection_id)
    }

    /// Drops the session only if `connection_id` is still the live one
    pub async fn disconnect(&self, responder_id: &str, connection_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(responder_id) {
            Some(session) if session.connection_id == connection_id => {
                sessions.remove(responder_id);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of online sessions subscribed to the zone
    pub async fn list_subscribers(&self, zone_id: &str) -> Vec<Subscriber> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.online && s.zone_id.as_deref() == Some(zone_id))
            .map(|(responder_id, s)| Subscriber {
                responder_id: responder_id.clone(),
                outbox: s.outbox.clone(),
            })
            .collect()
    }

    pub async fn zone_of(&self, responder_id: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(responder_id)
            .and_then(|s| s.zone_id.clone())
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        let sessions = self.sessions.read().await;
        let mut zones: BTreeMap<&str, usize> = BTreeMap::new();
        let mut online = 0;

        for session in sessions.values().filter(|s| s.online) {
            online += 1;
            if let Some(zone_id) = session.zone_id.as_deref() {
                *zones.entry(zone_id).or_default() += 1;
            }
        }

        PresenceSnapshot {
            connected: sessions.len(),
            online,
            zones: zones
                .into_iter()
                .map(|(zone_id, subscribers)| ZonePresence {
                    zone_id: zone_id.to_string(),
                    subscribers,
                })
                .collect(),
        }
    }

    /// Forgets every session; outboxes close once their writers see it
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    /// Applies a presence change on behalf of one connection. A replaced
    /// connection cannot touch its successor's session.
    async fn update<F>(
        &self,
        responder_id: &str,
        connection_id: Uuid,
        apply: F,
    ) -> Result<PresenceState, DirectoryError>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(responder_id)
            .ok_or_else(|| DirectoryError::NotConnected(responder_id.to_string()))?;
        if session.connection_id != connection_id {
            return Err(DirectoryError::Replaced(responder_id.to_string()));
        }

        apply(session);

        Ok(PresenceState {
            online: session.online,
            zone_id: session.zone_id.clone(),
        })
    }
}
