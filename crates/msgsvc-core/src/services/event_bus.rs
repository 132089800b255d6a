use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{BusRecord, OutboundEvent};
use crate::error::ChatError;
use crate::repositories::EventPublisher;

/// In-process outbound bus. Events are serialized to [`BusRecord`]s on publish.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<BusRecord>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusRecord> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish(&self, event: OutboundEvent) -> Result<(), ChatError> {
        let record = event.to_record()?;
        debug!("Publishing {}", record.topic);
        if let Err(e) = self.tx.send(record) {
            warn!("Failed to publish event (maybe no subscribers): {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DestroyedPartition;

    #[tokio::test]
    async fn test_subscribers_receive_records() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(OutboundEvent::PartitionDestroyed(DestroyedPartition {
            partition_key: "group:g1".into(),
            messages_removed: 3,
            requested_by: "admin".into(),
        }))
        .await
        .unwrap();

        let record = rx.recv().await.unwrap();
        assert_eq!(record.topic, "partition.destroyed");
        assert_eq!(record.key.as_deref(), Some("group:g1"));
        assert_eq!(record.payload["messages_removed"], 3);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(8);
        let event = OutboundEvent::PartitionDestroyed(DestroyedPartition {
            partition_key: "group:g1".into(),
            messages_removed: 0,
            requested_by: "admin".into(),
        });
        assert!(bus.publish(event).await.is_ok());
    }
}
