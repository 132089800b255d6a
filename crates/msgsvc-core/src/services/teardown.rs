//! Whole-partition teardown

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use validator::Validate;

use super::deadline::bounded;
use super::recency_cache::RecencyCache;
use super::router::ConversationRouter;
use super::sequence::SequenceAuthority;
use crate::domain::{DestroyConversationCommand, DestroyedPartition, PartitionKey};
use crate::error::{Backend, ChatError};
use crate::repositories::MessageStore;

/// Removes a partition's cached window, stored history and sequence counter, in that order.
///
/// Runs with the partition gate held exclusively, so no ingestion holds a number and no
/// history read is mid-backfill while the partition is taken apart. The counter goes last:
/// if anything before it fails the call aborts and numbering continues where it was.
/// Safe to retry.
pub struct PartitionTeardown {
    router: ConversationRouter,
    store: Arc<dyn MessageStore>,
    cache: RecencyCache,
    sequences: SequenceAuthority,
    timeout: Duration,
}

impl PartitionTeardown {
    pub fn new(
        store: Arc<dyn MessageStore>,
        cache: RecencyCache,
        sequences: SequenceAuthority,
        timeout: Duration,
    ) -> Self {
        Self {
            router: ConversationRouter::new(),
            store,
            cache,
            sequences,
            timeout,
        }
    }

    pub async fn handle(
        &self,
        command: &DestroyConversationCommand,
    ) -> Result<DestroyedPartition, ChatError> {
        command.validate()?;
        let key = self
            .router
            .route(&command.chat_type, &command.conversation_ids())?;
        let removed = self.destroy(&key).await?;
        Ok(DestroyedPartition {
            partition_key: key.to_string(),
            messages_removed: removed,
            requested_by: command.requested_by.clone(),
        })
    }

    /// Returns how many stored messages were removed.
    pub async fn destroy(&self, key: &PartitionKey) -> Result<u64, ChatError> {
        let _exclusive = self.sequences.gate().exclusive(key).await;

        self.cache.evict(key).await.map_err(|e| abort(key, e))?;

        let removed = bounded(Backend::Store, self.timeout, self.store.purge(key))
            .await
            .map_err(|e| abort(key, e))?;

        self.sequences.reset(key).await.map_err(|e| abort(key, e))?;

        info!("Partition {} destroyed, {} message(s) removed", key, removed);
        Ok(removed)
    }
}

fn abort(key: &PartitionKey, err: ChatError) -> ChatError {
    error!("Teardown of {} aborted: {}", key, err);
    err
}
