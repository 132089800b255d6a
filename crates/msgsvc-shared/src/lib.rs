//! # Message Service Shared
//!
//! Configuration, telemetry, and constants shared by the message service crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod telemetry;

pub use config::{AppConfig, StorageMode};
pub use error::AppError;
