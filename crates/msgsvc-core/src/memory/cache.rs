use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::ChatError;
use crate::repositories::{CacheBackend, ScoredValue};

#[derive(Default)]
struct SortedSet {
    members: BTreeMap<u64, String>,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Sorted sets with one member per score and lazy expiry, mirroring the Redis commands
/// the cache adapter issues.
#[derive(Default)]
pub struct InMemorySortedSetCache {
    sets: DashMap<String, SortedSet>,
}

impl InMemorySortedSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.sets.remove_if(key, |_, set| set.is_expired(now));
    }
}

#[async_trait]
impl CacheBackend for InMemorySortedSetCache {
    async fn upsert(&self, key: &str, entries: &[ScoredValue]) -> Result<(), ChatError> {
        self.purge_expired(key);
        let mut set = self.sets.entry(key.to_string()).or_default();
        for entry in entries {
            set.members.insert(entry.score, entry.value.clone());
        }
        Ok(())
    }

    async fn range_by_score(
        &self,
        key: &str,
        max: Option<u64>,
        min: u64,
        limit: usize,
    ) -> Result<Vec<ScoredValue>, ChatError> {
        self.purge_expired(key);
        let max = max.unwrap_or(u64::MAX);
        if max < min {
            return Ok(Vec::new());
        }
        let Some(set) = self.sets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .members
            .range(min..=max)
            .rev()
            .take(limit)
            .map(|(score, value)| ScoredValue {
                score: *score,
                value: value.clone(),
            })
            .collect())
    }

    async fn trim_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<(), ChatError> {
        self.purge_expired(key);
        let Some(mut set) = self.sets.get_mut(key) else {
            return Ok(());
        };

        let len = set.members.len() as i64;
        let from = if start < 0 { len + start } else { start }.max(0);
        let to = if stop < 0 { len + stop } else { stop }.min(len - 1);
        if from > to {
            return Ok(());
        }

        let doomed: Vec<u64> = set
            .members
            .keys()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .copied()
            .collect();
        for score in doomed {
            set.members.remove(&score);
        }

        let empty = set.members.is_empty();
        drop(set);
        if empty {
            self.sets.remove(key);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ChatError> {
        self.purge_expired(key);
        if let Some(mut set) = self.sets.get_mut(key) {
            set.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        self.sets.remove(key);
        Ok(())
    }
}
