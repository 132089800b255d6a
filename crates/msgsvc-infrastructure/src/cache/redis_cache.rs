// ============================================================================
// Message Service Infrastructure - Redis Sorted-Set Cache
// File: crates/msgsvc-infrastructure/src/cache/redis_cache.rs
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, pipe};
use deadpool_redis::Pool;

use msgsvc_core::error::{Backend, ChatError};
use msgsvc_core::repositories::{CacheBackend, ScoredValue};

use super::pool::{connection, redis_error};

pub struct RedisSortedSetCache {
    pool: Pool,
}

impl RedisSortedSetCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for RedisSortedSetCache {
    async fn upsert(&self, key: &str, entries: &[ScoredValue]) -> Result<(), ChatError> {
        if entries.is_empty() {
            return Ok(());
        }
        // drop whatever holds each score first so one sequence number maps to one member
        let mut pipeline = pipe();
        pipeline.atomic();
        for entry in entries {
            pipeline
                .cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(entry.score)
                .arg(entry.score)
                .ignore()
                .cmd("ZADD")
                .arg(key)
                .arg(entry.score)
                .arg(&entry.value)
                .ignore();
        }

        let mut conn = connection(&self.pool, Backend::Cache).await?;
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Cache, "upserting entries", e))
    }

    async fn range_by_score(
        &self,
        key: &str,
        max: Option<u64>,
        min: u64,
        limit: usize,
    ) -> Result<Vec<ScoredValue>, ChatError> {
        let max = max.map_or_else(|| "+inf".to_string(), |m| m.to_string());
        let mut conn = connection(&self.pool, Backend::Cache).await?;
        let members: Vec<(String, u64)> = cmd("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg(min)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Cache, "reading range", e))?;

        Ok(members
            .into_iter()
            .map(|(value, score)| ScoredValue { score, value })
            .collect())
    }

    async fn trim_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<(), ChatError> {
        let mut conn = connection(&self.pool, Backend::Cache).await?;
        cmd("ZREMRANGEBYRANK")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Cache, "trimming", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ChatError> {
        let mut conn = connection(&self.pool, Backend::Cache).await?;
        cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Cache, "setting expiry", e))
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        let mut conn = connection(&self.pool, Backend::Cache).await?;
        cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Cache, "evicting", e))
    }
}
