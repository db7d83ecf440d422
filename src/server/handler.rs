use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::registry::Registry;

/// Drive one client connection: register its write half, then read chunks
/// and forward each through the registry until the peer closes, a read
/// fails, or the shutdown signal fires. Deregistration happens exactly once
/// on the way out; if the registry already evicted this connection during a
/// broadcast, the deregister is a no-op.
///
/// Payloads are opaque: the first bytes a client sends (by convention a
/// username) get no special handling, and a payload that spans multiple
/// reads is forwarded as independent chunks.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    read_buffer_size: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = stream.into_split();
    let id = registry.register(writer, addr).await;
    let connection_start = std::time::Instant::now();

    tracing::info!(connection_id = %id, addr = %addr, "New connection");

    let mut buf = vec![0u8; read_buffer_size];
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(connection_id = %id, "Handler received shutdown signal");
                break;
            }
            read = reader.read(&mut buf) => {
                match read {
                    // Zero-length read: peer closed
                    Ok(0) => {
                        tracing::debug!(connection_id = %id, "Peer closed connection");
                        break;
                    }
                    Ok(n) => {
                        registry.broadcast(&buf[..n], id).await;
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %id, error = %e, "Read failed");
                        break;
                    }
                }
            }
        }
    }

    if let Some(mut peer) = registry.deregister(id).await {
        let _ = peer.writer.shutdown().await;
    }

    tracing::info!(
        connection_id = %id,
        addr = %addr,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "Connection closed"
    );
}
