//! Per-partition sequence numbers

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedRwLockReadGuard;
use tracing::{debug, error};

use super::deadline::bounded;
use super::gate::PartitionGate;
use crate::domain::PartitionKey;
use crate::error::{Backend, ChatError};
use crate::repositories::CounterBackend;

/// Hands out strictly increasing sequence numbers, one counter per partition.
///
/// Linearizability comes from the backend's atomic increment. Fails closed: a counter
/// that cannot be reached never yields a guessed number.
///
/// Clones share one [`PartitionGate`], so leases taken through any clone hold off a
/// teardown run through another.
#[derive(Clone)]
pub struct SequenceAuthority {
    counter: Arc<dyn CounterBackend>,
    gate: PartitionGate,
    timeout: Duration,
}

/// A sequence number together with shared admission to its partition.
///
/// While it is alive the partition cannot be torn down, so the number is either
/// persisted before a teardown starts or never handed out until it has finished.
pub struct SequenceLease {
    pub number: u64,
    _admission: OwnedRwLockReadGuard<()>,
}

impl SequenceAuthority {
    pub fn new(counter: Arc<dyn CounterBackend>, timeout: Duration) -> Self {
        Self {
            counter,
            gate: PartitionGate::new(),
            timeout,
        }
    }

    pub fn gate(&self) -> &PartitionGate {
        &self.gate
    }

    pub fn counter_key(key: &PartitionKey) -> String {
        format!("chat:{}:seq", key)
    }

    /// Next number for `key`. An unseen partition starts at 1.
    pub async fn next(&self, key: &PartitionKey) -> Result<u64, ChatError> {
        let counter_key = Self::counter_key(key);
        let seq = bounded(Backend::Counter, self.timeout, self.counter.increment(&counter_key))
            .await
            .map_err(unavailable)?;
        debug!("Assigned sequence {} in {}", seq, key);
        Ok(seq)
    }

    /// [`Self::next`] under shared admission; hold the lease until the message is stored.
    pub async fn lease(&self, key: &PartitionKey) -> Result<SequenceLease, ChatError> {
        let admission = self.gate.shared(key).await;
        let number = self.next(key).await?;
        Ok(SequenceLease {
            number,
            _admission: admission,
        })
    }

    /// Forget the counter so numbering restarts at 1.
    ///
    /// Only safe once the partition's store and cache are gone as well and the gate is held
    /// exclusively; [`super::teardown::PartitionTeardown`] is the caller that guarantees it.
    pub(crate) async fn reset(&self, key: &PartitionKey) -> Result<(), ChatError> {
        let counter_key = Self::counter_key(key);
        bounded(Backend::Counter, self.timeout, self.counter.delete(&counter_key))
            .await
            .map_err(unavailable)
    }
}

fn unavailable(err: ChatError) -> ChatError {
    match err {
        ChatError::BackendUnavailable { message, .. } => {
            error!("Sequence counter unavailable: {}", message);
            ChatError::CounterUnavailable(message)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConversationDescriptor;
    use crate::memory::InMemoryCounter;
    use crate::repositories::MockCounterBackend;

    fn group(id: &str) -> PartitionKey {
        ConversationDescriptor::Group { group_id: id.into() }.partition_key()
    }

    fn authority(counter: Arc<dyn CounterBackend>) -> SequenceAuthority {
        SequenceAuthority::new(counter, Duration::from_millis(200))
    }

    #[test]
    fn test_counter_key_format() {
        assert_eq!(SequenceAuthority::counter_key(&group("g1")), "chat:group:g1:seq");
    }

    #[tokio::test]
    async fn test_unseen_partition_starts_at_one() {
        let seq = authority(Arc::new(InMemoryCounter::new()));
        assert_eq!(seq.next(&group("a")).await.unwrap(), 1);
        assert_eq!(seq.next(&group("a")).await.unwrap(), 2);
        assert_eq!(seq.next(&group("b")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_distinct_numbers() {
        let seq = Arc::new(authority(Arc::new(InMemoryCounter::new())));
        let key = group("busy");

        let tasks = (0..200).map(|_| {
            let seq = seq.clone();
            let key = key.clone();
            tokio::spawn(async move { seq.next(&key).await.unwrap() })
        });
        let mut numbers: Vec<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        numbers.sort_unstable();

        assert_eq!(numbers, (1..=200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reset_restarts_numbering() {
        let seq = authority(Arc::new(InMemoryCounter::new()));
        let key = group("g");
        seq.next(&key).await.unwrap();
        seq.next(&key).await.unwrap();
        seq.reset(&key).await.unwrap();
        assert_eq!(seq.next(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lease_holds_off_exclusive_entry() {
        let seq = authority(Arc::new(InMemoryCounter::new()));
        let key = group("g");
        let lease = seq.lease(&key).await.unwrap();
        assert_eq!(lease.number, 1);

        let clone = seq.clone();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), clone.gate().exclusive(&key)).await;
        assert!(blocked.is_err());

        drop(lease);
        let _exclusive = clone.gate().exclusive(&key).await;
    }

    #[tokio::test]
    async fn test_backend_error_is_counter_unavailable() {
        let mut counter = MockCounterBackend::new();
        counter
            .expect_increment()
            .returning(|_| Err(ChatError::backend(Backend::Counter, "connection refused")));

        let err = authority(Arc::new(counter)).next(&group("g")).await.unwrap_err();
        assert!(matches!(err, ChatError::CounterUnavailable(ref m) if m == "connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_counter_unavailable() {
        struct Stalled;

        #[async_trait::async_trait]
        impl CounterBackend for Stalled {
            async fn increment(&self, _key: &str) -> Result<u64, ChatError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(1)
            }
            async fn delete(&self, _key: &str) -> Result<(), ChatError> {
                Ok(())
            }
        }

        let err = authority(Arc::new(Stalled)).next(&group("g")).await.unwrap_err();
        assert!(matches!(err, ChatError::CounterUnavailable(_)));
    }
}
