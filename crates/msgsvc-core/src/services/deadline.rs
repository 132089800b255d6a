//! Bounded backend calls

use std::future::Future;
use std::time::Duration;

use crate::error::{Backend, ChatError};

/// Run one backend round trip under `limit`. Elapsing is reported as `BackendUnavailable`.
/// No retry here; retry policy belongs to the caller.
pub async fn bounded<T, F>(backend: Backend, limit: Duration, fut: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::backend(
            backend,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}
