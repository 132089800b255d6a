//! Per-partition admission, exclusive for teardown

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::domain::PartitionKey;

const STRIPES: usize = 64;

/// Ingestion and history reads enter a partition shared; teardown enters it alone.
///
/// Locks are striped, so partitions hashing to one stripe also wait out each other's
/// teardown. The gate is process-local: instances sharing the same backends must send
/// all commands for a partition to one instance.
#[derive(Clone)]
pub struct PartitionGate {
    stripes: Arc<[Arc<RwLock<()>>]>,
}

impl Default for PartitionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionGate {
    pub fn new() -> Self {
        let stripes: Vec<_> = (0..STRIPES).map(|_| Arc::new(RwLock::new(()))).collect();
        Self {
            stripes: stripes.into(),
        }
    }

    pub async fn shared(&self, key: &PartitionKey) -> OwnedRwLockReadGuard<()> {
        self.stripe(key).read_owned().await
    }

    /// Waits for every shared holder of the stripe to leave, then keeps new ones out
    /// until the guard is dropped.
    pub async fn exclusive(&self, key: &PartitionKey) -> OwnedRwLockWriteGuard<()> {
        self.stripe(key).write_owned().await
    }

    fn stripe(&self, key: &PartitionKey) -> Arc<RwLock<()>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].clone()
    }
}
