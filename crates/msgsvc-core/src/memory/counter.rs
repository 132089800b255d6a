use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ChatError;
use crate::repositories::CounterBackend;

#[derive(Default)]
pub struct InMemoryCounter {
    counters: DashMap<String, u64>,
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterBackend for InMemoryCounter {
    async fn increment(&self, key: &str) -> Result<u64, ChatError> {
        // the entry guard holds the shard lock for the whole read-modify-write
        let mut value = self.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        self.counters.remove(key);
        Ok(())
    }
}
