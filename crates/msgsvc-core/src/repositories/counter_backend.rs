//! Atomic counter port

use async_trait::async_trait;

use crate::error::ChatError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Atomically add one and return the new value. Missing keys start from zero.
    async fn increment(&self, key: &str) -> Result<u64, ChatError>;

    async fn delete(&self, key: &str) -> Result<(), ChatError>;
}
