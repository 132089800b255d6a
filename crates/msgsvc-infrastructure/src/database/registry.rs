//! Bounded registry of lazily created per-partition handles

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

/// Share of the capacity dropped per eviction pass, as a divisor.
const EVICTION_DIVISOR: usize = 16;

struct Slot<H> {
    cell: Arc<OnceCell<H>>,
    touched: AtomicU64,
}

/// Maps a partition key to a handle that is created at most once per residency.
///
/// Holds at most `capacity` handles. Inserting into a full registry drops the least
/// recently used sixteenth of them (at least one) in a single scan. A dropped handle is
/// simply recreated on next use, so `init` must be idempotent.
pub struct PartitionRegistry<H> {
    slots: DashMap<String, Slot<H>>,
    capacity: usize,
    batch: usize,
    clock: AtomicU64,
}

impl<H: Clone> PartitionRegistry<H> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: DashMap::new(),
            capacity,
            batch: (capacity / EVICTION_DIVISOR).max(1),
            clock: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ready handle for `key`, if one is resident.
    pub fn get(&self, key: &str) -> Option<H> {
        let slot = self.slots.get(key)?;
        let handle = slot.cell.get()?.clone();
        slot.touched.store(self.tick(), Ordering::Relaxed);
        Some(handle)
    }

    /// Resident handle for `key`, running `init` to create it when absent.
    ///
    /// Concurrent callers for one key share a single `init`. A failed `init` leaves
    /// nothing behind and the next caller tries again.
    pub async fn get_or_init<F, Fut, E>(&self, key: &str, init: F) -> Result<H, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, E>>,
    {
        let cell = self.cell(key);
        let handle = cell.get_or_try_init(init).await?;
        Ok(handle.clone())
    }

    pub fn remove(&self, key: &str) {
        self.slots.remove(key);
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<H>> {
        let now = self.tick();
        if let Some(slot) = self.slots.get(key) {
            slot.touched.store(now, Ordering::Relaxed);
            return slot.cell.clone();
        }
        if self.slots.len() >= self.capacity {
            self.evict_oldest();
        }
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Slot {
                cell: Arc::new(OnceCell::new()),
                touched: AtomicU64::new(now),
            })
            .cell
            .clone()
    }

    fn evict_oldest(&self) {
        let mut ages: Vec<(u64, String)> = self
            .slots
            .iter()
            .map(|slot| (slot.touched.load(Ordering::Relaxed), slot.key().clone()))
            .collect();
        let batch = self.batch.min(ages.len());
        if batch == 0 {
            return;
        }
        if batch < ages.len() {
            ages.select_nth_unstable(batch - 1);
        }
        for (_, key) in ages.into_iter().take(batch) {
            self.slots.remove(&key);
        }
        debug!("Partition registry full, dropped {} handle(s)", batch);
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}
