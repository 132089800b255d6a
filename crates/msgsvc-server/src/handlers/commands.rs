// ============================================================================
// Message Service Server - Command Handlers
// File: crates/msgsvc-server/src/handlers/commands.rs
// ============================================================================
//! Bridges inbound bus commands posted over HTTP onto the dispatcher

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::error;

use msgsvc_core::{BusRecord, ChatError, IngestionStage};

use crate::response::ApiResponse;
use crate::state::AppState;

type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

/// Dispatch a command - POST /api/v1/commands/{topic}
///
/// Responds with the outbound records the command produced.
pub async fn dispatch_command(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<Vec<BusRecord>>>, ErrorResponse> {
    let events = state
        .dispatcher
        .dispatch(&topic, payload)
        .await
        .map_err(|e| {
            let (status, code) = classify(&e);
            (status, Json(ApiResponse::error(code, &e.to_string())))
        })?;

    let records = events
        .iter()
        .map(|event| event.to_record())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            error!("Failed to serialize outbound events: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("SERIALIZATION_ERROR", &e.to_string())),
            )
        })?;

    Ok(Json(ApiResponse::success(records)))
}

fn classify(err: &ChatError) -> (StatusCode, &'static str) {
    match err {
        ChatError::UnknownCommand(_) => (StatusCode::NOT_FOUND, "UNKNOWN_COMMAND"),
        ChatError::MessageNotFound { .. } => (StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND"),
        ChatError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        ChatError::Routing(_) => (StatusCode::BAD_REQUEST, "ROUTING_ERROR"),
        ChatError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        ChatError::CounterUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "COUNTER_UNAVAILABLE"),
        ChatError::BackendUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE"),
        ChatError::HistoryRetrievalFailed(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "HISTORY_RETRIEVAL_FAILED")
        }
        ChatError::Ingestion { stage, source } => match stage {
            IngestionStage::Validation | IngestionStage::Routing => {
                (StatusCode::BAD_REQUEST, "INGESTION_REJECTED")
            }
            _ => match classify(source).0 {
                StatusCode::CONFLICT => (StatusCode::CONFLICT, "INGESTION_FAILED"),
                StatusCode::SERVICE_UNAVAILABLE => {
                    (StatusCode::SERVICE_UNAVAILABLE, "INGESTION_FAILED")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INGESTION_FAILED"),
            },
        },
        ChatError::Cipher(_) | ChatError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}
