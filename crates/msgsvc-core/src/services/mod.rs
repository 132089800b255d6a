//! Core services

pub mod deadline;
pub mod dispatcher;
pub mod event_bus;
pub mod gate;
pub mod history;
pub mod ingestion;
pub mod moderation;
pub mod recency_cache;
pub mod router;
pub mod sequence;
pub mod teardown;

pub use dispatcher::CommandDispatcher;
pub use event_bus::BroadcastEventBus;
pub use gate::PartitionGate;
pub use history::{HistoryOptions, HistoryService};
pub use ingestion::IngestionPipeline;
pub use moderation::MessageModeration;
pub use recency_cache::{CacheOptions, RecencyCache};
pub use router::ConversationRouter;
pub use sequence::{SequenceAuthority, SequenceLease};
pub use teardown::PartitionTeardown;
