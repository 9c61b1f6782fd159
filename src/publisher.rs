//! Outbound domain events.
//!
//! Delivery is best-effort: a failed publish is logged and the business
//! operation that produced the event still succeeds.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

pub const SUBJECT_PREFIX: &str = "storefront";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent);

    async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }
}

/// Publishes JSON payloads on `storefront.<subject>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(async_nats::connect(url).await?))
    }

    /// Waits until buffered publishes have been written to the server.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.client.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) {
        let subject = format!("{SUBJECT_PREFIX}.{}", event.subject());
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => { warn!(%subject, error = %e, "failed to encode event"); return; }
        };
        match self.client.publish(subject.clone(), payload.into()).await {
            Ok(()) => debug!(%subject, "event published"),
            Err(e) => warn!(%subject, error = %e, "failed to publish event"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &DomainEvent) {
        debug!(subject = event.subject(), "event dropped (no publisher configured)");
    }
}

/// Keeps every event in memory. Used by tests and local demos.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    pub async fn events(&self) -> Vec<DomainEvent> { self.events.lock().await.clone() }

    pub async fn subjects(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(DomainEvent::subject).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) {
        self.events.lock().await.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;

    #[tokio::test]
    async fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publisher.publish_all(&[
            DomainEvent::Order(OrderEvent::Cancelled { order_id: "o1".into() }),
            DomainEvent::Order(OrderEvent::Refunded { order_id: "o1".into() }),
        ]).await;
        assert_eq!(publisher.subjects().await, vec!["order.cancelled", "order.refunded"]);
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let json = serde_json::to_value(DomainEvent::Order(OrderEvent::Cancelled { order_id: "o9".into() })).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["event"], "cancelled");
        assert_eq!(json["order_id"], "o9");
    }
}
