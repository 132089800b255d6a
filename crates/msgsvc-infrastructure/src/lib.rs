//! # Message Service Infrastructure
//!
//! PostgreSQL and Redis implementations of the core backend ports.

pub mod cache;
pub mod database;

pub use cache::{create_redis_pool, RedisCounter, RedisSortedSetCache};
pub use database::{create_pool, PartitionRegistry, PgMessageStore};
