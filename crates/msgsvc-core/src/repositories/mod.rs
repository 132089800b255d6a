//! Backend ports

pub mod cache_backend;
pub mod counter_backend;
pub mod event_publisher;
pub mod message_store;

pub use cache_backend::{CacheBackend, ScoredValue};
pub use counter_backend::CounterBackend;
pub use event_publisher::EventPublisher;
pub use message_store::MessageStore;

#[cfg(test)]
pub use cache_backend::MockCacheBackend;
#[cfg(test)]
pub use counter_backend::MockCounterBackend;
#[cfg(test)]
pub use event_publisher::MockEventPublisher;
#[cfg(test)]
pub use message_store::MockMessageStore;
