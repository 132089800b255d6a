//! Domain errors

use msgsvc_security::CipherError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Missing identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("Invalid identifier {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    #[error("Unsupported chat_type: {0}")]
    UnsupportedKind(String),
}

/// External collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Store,
    Cache,
    Counter,
    Bus,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Backend::Store => "store",
            Backend::Cache => "cache",
            Backend::Counter => "counter",
            Backend::Bus => "bus",
        };
        f.write_str(name)
    }
}

/// Step of the ingestion pipeline an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Validation,
    Routing,
    Sequencing,
    Encryption,
    Persistence,
    Publish,
}

impl std::fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IngestionStage::Validation => "validation",
            IngestionStage::Routing => "routing",
            IngestionStage::Sequencing => "sequencing",
            IngestionStage::Encryption => "encryption",
            IngestionStage::Persistence => "persistence",
            IngestionStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Sequence counter unavailable: {0}")]
    CounterUnavailable(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: Backend, message: String },

    #[error("History retrieval failed: {0}")]
    HistoryRetrievalFailed(#[source] Box<ChatError>),

    #[error("Ingestion failed at {stage}: {source}")]
    Ingestion {
        stage: IngestionStage,
        #[source]
        source: Box<ChatError>,
    },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Message {message_id} not found in {partition}")]
    MessageNotFound { partition: String, message_id: uuid::Uuid },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    pub fn backend(backend: Backend, message: impl Into<String>) -> Self {
        ChatError::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    pub fn at_stage(self, stage: IngestionStage) -> Self {
        ChatError::Ingestion {
            stage,
            source: Box::new(self),
        }
    }

    pub fn history(self) -> Self {
        match self {
            e @ ChatError::HistoryRetrievalFailed(_) => e,
            other => ChatError::HistoryRetrievalFailed(Box::new(other)),
        }
    }

    /// Ingestion stage, when the error came out of the pipeline.
    pub fn stage(&self) -> Option<IngestionStage> {
        match self {
            ChatError::Ingestion { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ChatError {
    fn from(err: validator::ValidationErrors) -> Self {
        ChatError::InvalidPayload(err.to_string())
    }
}
