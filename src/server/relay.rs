use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::error::{RelayError, Result};
use crate::registry::Registry;

use super::handler::handle_connection;

/// The relay server: a listening socket, the shared connection registry,
/// and the shutdown channel that every spawned task subscribes to.
pub struct Relay {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown_tx: broadcast::Sender<()>,
    read_buffer_size: usize,
    accept_retry_delay: Duration,
}

impl Relay {
    /// Bind the listening socket. A bind failure is fatal and reported to
    /// the caller before any connection is served.
    pub async fn bind(settings: &Settings) -> Result<Self> {
        let addr = settings.server_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        tracing::info!(addr = %local_addr, "Relay listening");

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(Registry::new()),
            shutdown_tx,
            read_buffer_size: settings.relay.read_buffer_size,
            accept_retry_delay: Duration::from_millis(settings.relay.accept_retry_delay_ms),
        })
    }

    /// Address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Sender half of the shutdown channel; one send stops the accept loop
    /// and every connection handler.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until the shutdown signal fires. Each accepted
    /// connection runs in its own task so the accept loop never waits on
    /// per-client work; transient accept errors are logged and the loop
    /// continues after a short pause.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Accept loop received shutdown signal");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let registry = self.registry.clone();
                            let shutdown = self.shutdown_tx.subscribe();
                            let read_buffer_size = self.read_buffer_size;
                            tokio::spawn(async move {
                                handle_connection(stream, addr, registry, read_buffer_size, shutdown)
                                    .await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed, continuing");
                            tokio::time::sleep(self.accept_retry_delay).await;
                        }
                    }
                }
            }
        }

        // Release the listening socket before the shutdown sequence closes
        // the registered connections
        drop(self.listener);
        Ok(())
    }
}
