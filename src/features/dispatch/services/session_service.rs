use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::dispatch::models::{AccidentRef, ClientMessage, DeclineReason, ServerMessage};
use crate::features::dispatch::services::acceptance_coordinator::{
    AcceptOutcome, AcceptanceCoordinator,
};
use crate::features::dispatch::services::zone_directory::{PresenceState, ZoneDirectory};

/// Turns responder frames into directory and coordinator calls
pub struct DispatchSessionService {
    directory: Arc<ZoneDirectory>,
    coordinator: Arc<AcceptanceCoordinator>,
}

impl DispatchSessionService {
    pub fn new(directory: Arc<ZoneDirectory>, coordinator: Arc<AcceptanceCoordinator>) -> Self {
        Self {
            directory,
            coordinator,
        }
    }

    pub fn directory(&self) -> &Arc<ZoneDirectory> {
        &self.directory
    }

    /// Parses and handles one text frame, returning the reply for the sender.
    /// Failures become an `error` frame; the connection stays open.
    /// Frames from a connection that is no longer the responder's live one
    /// are dropped without a reply.
    pub async fn handle_frame(
        &self,
        responder_id: &str,
        connection_id: Uuid,
        raw: &str,
    ) -> Option<ServerMessage> {
        if !self.directory.is_live(responder_id, connection_id).await {
            tracing::debug!(
                "Ignoring frame from stale connection {} of {}",
                connection_id,
                responder_id
            );
            return None;
        }

        let result = match ClientMessage::parse(raw) {
            Ok(message) => self.handle(responder_id, connection_id, message).await,
            Err(e) => Err(e),
        };

        let reply = result.unwrap_or_else(|e| {
            match &e {
                AppError::Database(_) | AppError::Internal(_) => {
                    tracing::error!("Dispatch frame from {} failed: {}", responder_id, e)
                }
                _ => tracing::debug!("Dispatch frame from {} rejected: {}", responder_id, e),
            }
            ServerMessage::error(e.public_message())
        });
        Some(reply)
    }

    pub async fn handle(
        &self,
        responder_id: &str,
        connection_id: Uuid,
        message: ClientMessage,
    ) -> Result<ServerMessage> {
        match message {
            ClientMessage::JoinZone { zone_id } => {
                self.directory.join(responder_id, connection_id, &zone_id).await?;
                tracing::info!("Responder {} joined zone {}", responder_id, zone_id);
                Ok(ServerMessage::ZoneJoined { zone_id })
            }
            ClientMessage::GoOnline => {
                let state = self.directory.go_online(responder_id, connection_id).await?;
                tracing::info!("Responder {} is online", responder_id);
                Ok(presence(state))
            }
            ClientMessage::GoOffline => {
                let state = self.directory.go_offline(responder_id, connection_id).await?;
                tracing::info!("Responder {} is offline", responder_id);
                Ok(presence(state))
            }
            ClientMessage::LeaveZone => {
                let previous = self.directory.zone_of(responder_id).await;
                let state = self.directory.leave(responder_id, connection_id).await?;
                tracing::info!(
                    "Responder {} left zone {}",
                    responder_id,
                    previous.as_deref().unwrap_or("-")
                );
                Ok(presence(state))
            }
            ClientMessage::Accept { accident_id } => {
                let reply = match self.coordinator.accept(accident_id, responder_id).await? {
                    AcceptOutcome::Claimed { .. } | AcceptOutcome::AlreadyClaimedBySelf => {
                        ServerMessage::AcceptConfirmed(AccidentRef { accident_id })
                    }
                    AcceptOutcome::AlreadyClaimed => ServerMessage::AcceptDeclined {
                        accident_id,
                        reason: DeclineReason::AlreadyClaimed,
                    },
                    AcceptOutcome::NotDispatchable(_) => ServerMessage::AcceptDeclined {
                        accident_id,
                        reason: DeclineReason::NotDispatchable,
                    },
                };
                Ok(reply)
            }
            ClientMessage::Reject { accident_id } => {
                self.coordinator.reject(accident_id, responder_id).await?;
                Ok(ServerMessage::AccidentDismissed(AccidentRef { accident_id }))
            }
        }
    }
}

fn presence(state: PresenceState) -> ServerMessage {
    ServerMessage::Presence {
        online: state.online,
        zone_id: state.zone_id,
    }
}
