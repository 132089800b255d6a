//! Bounded recency window per partition

use std::sync::Arc;
use std::time::Duration;

use msgsvc_shared::constants::{
    DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECS,
};
use tracing::{debug, warn};

use super::deadline::bounded;
use crate::domain::{Message, PartitionKey};
use crate::error::{Backend, ChatError};
use crate::repositories::{CacheBackend, ScoredValue};

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub max_size: usize,
    pub ttl: Duration,
    pub timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }
}

/// Most recent messages of each partition, scored by sequence number.
///
/// Never authoritative. Losing any part of it only costs a store round trip.
#[derive(Clone)]
pub struct RecencyCache {
    backend: Arc<dyn CacheBackend>,
    options: CacheOptions,
}

impl RecencyCache {
    pub fn new(backend: Arc<dyn CacheBackend>, options: CacheOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn cache_key(key: &PartitionKey) -> String {
        format!("messages:{}", key)
    }

    /// Upsert by sequence number, keep the newest `max_size`, refresh the TTL.
    pub async fn put(&self, key: &PartitionKey, messages: &[Message]) -> Result<(), ChatError> {
        if messages.is_empty() {
            return Ok(());
        }

        let entries = messages
            .iter()
            .map(|m| {
                Ok(ScoredValue {
                    score: m.sequence_number,
                    value: serde_json::to_string(m)?,
                })
            })
            .collect::<Result<Vec<_>, ChatError>>()?;

        let cache_key = Self::cache_key(key);
        let keep = self.options.max_size.max(1) as i64;
        let timeout = self.options.timeout;

        bounded(Backend::Cache, timeout, self.backend.upsert(&cache_key, &entries)).await?;
        bounded(
            Backend::Cache,
            timeout,
            self.backend.trim_by_rank(&cache_key, 0, -(keep + 1)),
        )
        .await?;
        bounded(
            Backend::Cache,
            timeout,
            self.backend.expire(&cache_key, self.options.ttl),
        )
        .await?;

        debug!("Cached {} message(s) for {}", entries.len(), key);
        Ok(())
    }

    /// Raw cached entries below `before`, newest first, deleted ones included.
    ///
    /// Entries that no longer deserialize are dropped with a warning, which leaves a gap
    /// in the returned sequence numbers.
    pub async fn window_before(
        &self,
        key: &PartitionKey,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let max = match before {
            Some(b) if b <= 1 => return Ok(Vec::new()),
            Some(b) => Some(b - 1),
            None => None,
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let cache_key = Self::cache_key(key);
        let raw = bounded(
            Backend::Cache,
            self.options.timeout,
            self.backend.range_by_score(&cache_key, max, 1, limit),
        )
        .await?;

        let messages = raw
            .into_iter()
            .filter_map(|entry| match serde_json::from_str::<Message>(&entry.value) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Dropping undecodable cache entry {} in {}: {}", entry.score, key, e);
                    None
                }
            })
            .collect();
        Ok(messages)
    }

    /// Up to `limit` cached, non-deleted messages below `before`, newest first.
    pub async fn range_before(
        &self,
        key: &PartitionKey,
        before: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let mut messages = self.window_before(key, before, limit).await?;
        messages.retain(|m| !m.deleted);
        Ok(messages)
    }

    /// Drop the partition's whole window.
    pub async fn evict(&self, key: &PartitionKey) -> Result<(), ChatError> {
        let cache_key = Self::cache_key(key);
        bounded(Backend::Cache, self.options.timeout, self.backend.delete(&cache_key)).await
    }
}
