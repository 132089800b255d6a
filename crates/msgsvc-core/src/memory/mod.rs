//! In-process implementations of the backend ports.
//!
//! Used by tests and by the server when no Postgres/Redis is configured.

pub mod cache;
pub mod counter;
pub mod store;

pub use cache::InMemorySortedSetCache;
pub use counter::InMemoryCounter;
pub use store::InMemoryMessageStore;
