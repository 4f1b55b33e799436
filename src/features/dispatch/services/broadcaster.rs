use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use crate::features::accidents::models::AccidentReport;
use crate::features::dispatch::models::{AccidentRef, DispatchEvent, ServerMessage};
use crate::features::dispatch::services::zone_directory::{Subscriber, ZoneDirectory};

/// Pushes zone-scoped events to connected responders.
/// Delivery is best effort: a full or closed outbox drops the event.
pub struct DispatchBroadcaster {
    directory: Arc<ZoneDirectory>,
}

impl DispatchBroadcaster {
    pub fn new(directory: Arc<ZoneDirectory>) -> Self {
        Self { directory }
    }

    /// Announces a verified report to its zone.
    /// Returns how many sessions the event was queued for.
    pub async fn broadcast(&self, report: &AccidentReport) -> usize {
        let zone_id = report.location.zone_id.as_str();
        let subscribers = self.directory.list_subscribers(zone_id).await;
        let message = ServerMessage::NewEmergency(DispatchEvent::from(report));

        let delivered = fan_out(&subscribers, &message, None);
        tracing::info!(
            "Dispatched accident {} to {}/{} responders in zone {}",
            report.id,
            delivered,
            subscribers.len(),
            zone_id
        );

        delivered
    }

    /// Tells the other subscribers of the report's zone that the case is taken
    pub async fn withdraw(&self, report: &AccidentReport, claimed_by: &str) -> usize {
        let zone_id = report.location.zone_id.as_str();
        let subscribers = self.directory.list_subscribers(zone_id).await;
        let message = ServerMessage::RemoveAccident(AccidentRef {
            accident_id: report.id,
        });

        let delivered = fan_out(&subscribers, &message, Some(claimed_by));
        tracing::info!(
            "Withdrew accident {} from {} responders in zone {} (claimed by {})",
            report.id,
            delivered,
            zone_id,
            claimed_by
        );

        delivered
    }
}

fn fan_out(subscribers: &[Subscriber], message: &ServerMessage, except: Option<&str>) -> usize {
    let mut delivered = 0;

    for subscriber in subscribers {
        if except == Some(subscriber.responder_id.as_str()) {
            continue;
        }
        match subscriber.outbox.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Outbox full for responder {}, dropping event", subscriber.responder_id)
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Outbox closed for responder {}, dropping event", subscriber.responder_id)
            }
        }
    }

    delivered
}
