// ============================================================================
// Message Service Infrastructure - Redis Sequence Counter
// File: crates/msgsvc-infrastructure/src/cache/redis_counter.rs
// ============================================================================

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::Pool;

use msgsvc_core::error::{Backend, ChatError};
use msgsvc_core::repositories::CounterBackend;

use super::pool::{connection, redis_error};

/// `INCR`/`DEL` on one key per partition. Redis executes `INCR` atomically.
pub struct RedisCounter {
    pool: Pool,
}

impl RedisCounter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterBackend for RedisCounter {
    async fn increment(&self, key: &str) -> Result<u64, ChatError> {
        let mut conn = connection(&self.pool, Backend::Counter).await?;
        cmd("INCR")
            .arg(key)
            .query_async::<u64>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Counter, "incrementing counter", e))
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        let mut conn = connection(&self.pool, Backend::Counter).await?;
        cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| redis_error(Backend::Counter, "deleting counter", e))
    }
}
