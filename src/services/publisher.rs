//! Domain event fan-out: every event is logged, and published to NATS when a
//! connection is configured. Publishing never fails the caller.

use async_nats::Client;

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<Client>) -> Self { Self { nats } }

    /// Logs events without publishing them anywhere.
    pub fn log_only() -> Self { Self { nats: None } }

    pub async fn publish(&self, event: &DomainEvent) {
        tracing::info!(subject = event.subject(), event = ?event, "domain event");
        let Some(client) = &self.nats else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(subject = event.subject(), error = %e, "could not serialize domain event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(subject = event.subject(), error = %e, "could not publish domain event");
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events {
            self.publish(event).await;
        }
    }
}
