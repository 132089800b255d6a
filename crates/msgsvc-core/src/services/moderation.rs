//! Soft delete

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use super::deadline::bounded;
use super::recency_cache::RecencyCache;
use super::router::ConversationRouter;
use crate::domain::{now_millis, DeleteMessageCommand, DeletedMessage, PartitionKey};
use crate::error::{Backend, ChatError};
use crate::repositories::MessageStore;

/// Flags messages deleted. The record stays in the store; history stops returning it.
pub struct MessageModeration {
    router: ConversationRouter,
    store: Arc<dyn MessageStore>,
    cache: RecencyCache,
    timeout: Duration,
}

impl MessageModeration {
    pub fn new(store: Arc<dyn MessageStore>, cache: RecencyCache, timeout: Duration) -> Self {
        Self {
            router: ConversationRouter::new(),
            store,
            cache,
            timeout,
        }
    }

    pub async fn handle(&self, command: &DeleteMessageCommand) -> Result<DeletedMessage, ChatError> {
        command.validate()?;
        let key = self
            .router
            .route(&command.chat_type, &command.conversation_ids())?;
        self.soft_delete(&key, command.message_id, &command.deleted_by).await
    }

    /// Idempotent: deleting an already deleted message reports the original deletion.
    pub async fn soft_delete(
        &self,
        key: &PartitionKey,
        message_id: Uuid,
        deleted_by: &str,
    ) -> Result<DeletedMessage, ChatError> {
        let flagged = bounded(
            Backend::Store,
            self.timeout,
            self.store.soft_delete(key, message_id, deleted_by, now_millis()),
        )
        .await?
        .ok_or_else(|| ChatError::MessageNotFound {
            partition: key.to_string(),
            message_id,
        })?;

        // Drop the whole window: an unflagged copy would keep serving the message, and a
        // flagged copy written into a cold cache would sit at its top.
        self.cache.evict(key).await.map_err(|e| {
            error!("Could not drop cached window of {} after deleting {}: {}", key, message_id, e);
            e
        })?;

        info!("Message {} in {} deleted by {}", message_id, key, deleted_by);
        Ok(DeletedMessage {
            message_id,
            channel_id: flagged.channel_id.clone(),
            sequence_number: flagged.sequence_number,
            deleted_by: flagged.deleted_by.clone().unwrap_or_else(|| deleted_by.to_string()),
            deleted_at: flagged.deleted_at.unwrap_or_else(now_millis),
        })
    }
}
