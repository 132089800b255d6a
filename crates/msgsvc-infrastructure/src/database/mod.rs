//! Database module (PostgreSQL adapters)

pub mod connection;
pub mod pg_message_store;
pub mod registry;

pub use connection::create_pool;
pub use pg_message_store::PgMessageStore;
pub use registry::PartitionRegistry;
