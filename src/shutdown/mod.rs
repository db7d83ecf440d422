//! Graceful shutdown handling for the relay.
//!
//! Shutdown runs in phases:
//! 1. Signal the accept loop and every connection handler to stop
//! 2. Wait for handlers to deregister their connections
//! 3. Force-close whatever is still registered

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::registry::Registry;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for handlers to deregister on their own (default: 5 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Handles graceful shutdown of the relay
pub struct GracefulShutdown {
    registry: Arc<Registry>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<Registry>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            registry,
            shutdown_tx,
            config: ShutdownConfig::default(),
        }
    }

    pub fn with_config(
        registry: Arc<Registry>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    /// Execute the shutdown sequence and report what happened.
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let initial = self.registry.connection_count().await;
        let mut result = ShutdownResult::default();

        tracing::info!(
            reason = %reason,
            connections = initial,
            "Starting graceful shutdown - Phase 1: Signaling tasks"
        );
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 2: Waiting for connections to close");
        result.connections_closed = self.wait_for_connections_to_close(initial).await;

        tracing::info!("Phase 3: Closing remaining connections");
        result.forced_closes = self.registry.close_all().await;
        result.connections_closed += result.forced_closes;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            connections_closed = result.connections_closed,
            forced_closes = result.forced_closes,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Wait for handler tasks to deregister their connections; returns how
    /// many closed within the drain timeout.
    async fn wait_for_connections_to_close(&self, initial: usize) -> usize {
        if initial == 0 {
            return 0;
        }

        let registry = self.registry.clone();
        let wait_future = async {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if registry.connection_count().await == 0 {
                    break;
                }
            }
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.registry.connection_count().await;
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        initial - remaining
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Total connections closed during shutdown
    pub connections_closed: usize,
    /// Connections that had to be force-closed after the drain timeout
    pub forced_closes: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
