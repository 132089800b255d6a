//! Cache module (Redis adapters)

pub mod pool;
pub mod redis_cache;
pub mod redis_counter;

pub use pool::create_redis_pool;
pub use redis_cache::RedisSortedSetCache;
pub use redis_counter::RedisCounter;
