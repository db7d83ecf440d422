use anyhow::Result;
use tokio::signal;

use chat_relay::config::Settings;
use chat_relay::server::Relay;
use chat_relay::shutdown::GracefulShutdown;
use chat_relay::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_telemetry(&settings.log);
    tracing::info!("Configuration loaded");

    // Bind the relay; a bind failure aborts startup
    let relay = Relay::bind(&settings).await?;
    let registry = relay.registry();
    let shutdown_tx = relay.shutdown_handle();

    // Run the accept loop in the background
    let relay_handle = tokio::spawn(async move {
        if let Err(e) = relay.run().await {
            tracing::error!(error = %e, "Relay accept loop failed");
        }
    });

    // Block until the operator asks us to stop
    shutdown_signal().await;

    // Close the listener and every registered connection
    let shutdown = GracefulShutdown::new(registry, shutdown_tx);
    shutdown.execute("operator signal").await;

    let _ = relay_handle.await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
