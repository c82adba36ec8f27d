use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::events::EventNotification;
use super::queue::{Delivery, EventSource, QueueError};
use super::registry::ConnectionRegistry;
use crate::analytics;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

// -----------------------------------------------------------------------------
// ----- FanoutBridge ----------------------------------------------------------

/// Moves backend events from the queue onto matching live sockets.
#[derive(Debug, Clone)]
pub struct FanoutBridge {
    registry: Arc<ConnectionRegistry>,
    retry_backoff: Duration,
}

impl FanoutBridge {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            retry_backoff: RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- FanoutBridge: Public --------------------------------------------------

impl FanoutBridge {
    /// Drain `source` until it finishes. Transient queue errors are logged
    /// and retried; they never end the loop.
    pub async fn run<S: EventSource>(&self, mut source: S) {
        info!("event fanout started");

        loop {
            let delivery = match source.next().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    warn!("event queue read failed; retrying: {e}");
                    tokio::time::sleep(self.retry_backoff).await;
                    continue;
                }
            };

            let decoded = decode(&delivery);

            // Acked before fanout, whether or not it decoded.
            if let Err(e) = source.ack(&delivery).await {
                warn!(id = %delivery.id, "event ack failed: {e}");
            }

            match decoded {
                Ok(notification) => {
                    let delivered = self.deliver(&notification);
                    debug!(id = %delivery.id, kind = ?notification.kind, delivered, "event fanned out");
                }
                Err(e) => {
                    analytics::inc_event_malformed();
                    warn!("dropping event: {e}");
                }
            }
        }

        info!("event fanout stopped");
    }

    /// Write `notification` to every registered recipient. Returns how many
    /// sockets accepted it.
    pub fn deliver(&self, notification: &EventNotification) -> usize {
        let payload = notification.render();

        let delivered = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|(principal, _)| notification.is_recipient(*principal))
            .filter(|(_, handle)| handle.send_text(payload.as_str()))
            .count();

        analytics::add_events_delivered(delivered as u64);
        delivered
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn decode(delivery: &Delivery) -> Result<EventNotification, QueueError> {
    EventNotification::decode(&delivery.body).map_err(|e| QueueError::MalformedMessage {
        id: delivery.id.clone(),
        reason: e.to_string(),
    })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
