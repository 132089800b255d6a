use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{HistoryFilter, Message, PartitionKey};
use crate::error::ChatError;
use crate::repositories::MessageStore;

type Log = Arc<RwLock<BTreeMap<u64, Message>>>;

/// One ordered log per partition, keyed by sequence number.
#[derive(Default)]
pub struct InMemoryMessageStore {
    partitions: DashMap<PartitionKey, Log>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, key: &PartitionKey) -> Option<Log> {
        self.partitions.get(key).map(|log| log.value().clone())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, key: &PartitionKey, message: &Message) -> Result<(), ChatError> {
        let log = self.partitions.entry(key.clone()).or_default().value().clone();
        let mut log = log.write();
        if log.contains_key(&message.sequence_number) {
            return Err(ChatError::Conflict(format!(
                "sequence {} already stored in {}",
                message.sequence_number, key
            )));
        }
        log.insert(message.sequence_number, message.clone());
        Ok(())
    }

    async fn find(
        &self,
        key: &PartitionKey,
        filter: &HistoryFilter,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let Some(log) = self.log(key) else {
            return Ok(Vec::new());
        };
        let log = log.read();
        Ok(log
            .values()
            .rev()
            .filter(|m| filter.matches(m))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, key: &PartitionKey, filter: &HistoryFilter) -> Result<u64, ChatError> {
        let Some(log) = self.log(key) else {
            return Ok(0);
        };
        let log = log.read();
        Ok(log.values().filter(|m| filter.matches(m)).count() as u64)
    }

    async fn soft_delete(
        &self,
        key: &PartitionKey,
        message_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, ChatError> {
        let Some(log) = self.log(key) else {
            return Ok(None);
        };
        let mut log = log.write();
        let Some(message) = log.values_mut().find(|m| m.message_id == message_id) else {
            return Ok(None);
        };
        if !message.deleted {
            message.mark_deleted(deleted_by, at);
        }
        Ok(Some(message.clone()))
    }

    async fn purge(&self, key: &PartitionKey) -> Result<u64, ChatError> {
        Ok(self
            .partitions
            .remove(key)
            .map(|(_, log)| log.read().len() as u64)
            .unwrap_or(0))
    }
}
