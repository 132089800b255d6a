//! Sorted-set cache port

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredValue {
    pub score: u64,
    pub value: String,
}

/// Sorted set keyed by score, with Redis rank and expiry semantics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Insert entries, replacing whatever member already holds each score.
    async fn upsert(&self, key: &str, entries: &[ScoredValue]) -> Result<(), ChatError>;

    /// Members with `min <= score <= max` (no upper bound when `max` is `None`),
    /// highest score first, at most `limit`.
    async fn range_by_score(
        &self,
        key: &str,
        max: Option<u64>,
        min: u64,
        limit: usize,
    ) -> Result<Vec<ScoredValue>, ChatError>;

    /// Remove members ranked `start..=stop` in ascending score order.
    /// Negative ranks count from the highest score (`-1` is the top member).
    async fn trim_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<(), ChatError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ChatError>;

    async fn delete(&self, key: &str) -> Result<(), ChatError>;
}
