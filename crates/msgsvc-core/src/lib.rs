//! # Message Service Core
//!
//! Domain model, backend ports, and the ingestion and history services.

pub mod domain;
pub mod error;
pub mod memory;
pub mod repositories;
pub mod services;

pub use domain::*;
pub use error::{Backend, ChatError, IngestionStage, RoutingError};
