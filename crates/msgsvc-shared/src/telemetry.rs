//! Telemetry setup

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::AppError;

/// Install the global subscriber.
///
/// `RUST_LOG` drives the filter (default `info`), `LOG_FORMAT=json` switches stdout from
/// pretty to JSON and `LOG_DIR`, when set, adds a daily-rolling file layer. Keep the
/// returned guard alive for the life of the process or buffered file output is lost.
pub fn init_telemetry() -> Result<Option<WorkerGuard>, AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = wants_json(std::env::var("LOG_FORMAT").ok().as_deref());

    let stdout_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().pretty().with_target(true).boxed()
    };

    let (file_layer, guard) = match std::env::var("LOG_DIR") {
        Ok(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("message-svc")
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| AppError::TelemetryError(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::TelemetryError(e.to_string()))?;

    Ok(guard)
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_unless_json_is_asked_for() {
        assert!(!wants_json(None));
        assert!(!wants_json(Some("pretty")));
        assert!(!wants_json(Some("")));
        assert!(wants_json(Some("json")));
        assert!(wants_json(Some("JSON")));
    }
}
