//! Durable message store port

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{HistoryFilter, Message, PartitionKey};
use crate::error::ChatError;

/// Per-partition append-only message log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, key: &PartitionKey, message: &Message) -> Result<(), ChatError>;

    /// Non-deleted messages matching `filter`, newest first, at most `limit`.
    async fn find(
        &self,
        key: &PartitionKey,
        filter: &HistoryFilter,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError>;

    async fn count(&self, key: &PartitionKey, filter: &HistoryFilter) -> Result<u64, ChatError>;

    /// Flag a message deleted. `None` when the partition holds no such message.
    async fn soft_delete(
        &self,
        key: &PartitionKey,
        message_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, ChatError>;

    /// Drop every message of the partition. Returns how many were removed.
    async fn purge(&self, key: &PartitionKey) -> Result<u64, ChatError>;
}
