use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use msgsvc_core::services::{BroadcastEventBus, CommandDispatcher};
use msgsvc_server::{bootstrap, router, state::AppState};
use msgsvc_shared::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize telemetry
    let _log_guard = msgsvc_shared::telemetry::init_telemetry()?;

    info!("Message service starting...");

    // Load configuration
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Backends and services
    let backends = bootstrap::connect_backends(&config).await?;
    let bus = Arc::new(BroadcastEventBus::new(config.app.event_buffer));
    let event_logger = bootstrap::spawn_event_logger(&bus);
    let dispatcher = bootstrap::build_dispatcher(&config, backends, bus)?;
    info!("Accepting commands: {}", CommandDispatcher::topics().join(", "));

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        service_name: config.app.name.clone(),
    };

    // Bind address
    let host: std::net::IpAddr = config.app.host.parse()?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    event_logger.abort();
    info!("Message service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
