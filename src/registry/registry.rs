use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ConnectionId, Peer};

/// Manages the set of active connections and the broadcast fan-out.
///
/// A single mutex guards the membership map; every read, insert, remove,
/// and the iterate-and-evict step inside [`broadcast`](Registry::broadcast)
/// runs under it, so an evicted writer can never be touched by a concurrent
/// register or broadcast.
pub struct Registry {
    /// connection_id -> Peer (write half + metadata)
    peers: Mutex<HashMap<ConnectionId, Peer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new connection and return its id.
    pub async fn register(&self, writer: OwnedWriteHalf, addr: SocketAddr) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut peers = self.peers.lock().await;
        peers.insert(id, Peer::new(writer, addr));

        tracing::info!(connection_id = %id, addr = %addr, total = peers.len(), "Connection registered");

        id
    }

    /// Remove a connection if present and hand its write half back to the
    /// caller, who is responsible for closing it. Calling this again for the
    /// same id is a no-op.
    pub async fn deregister(&self, id: ConnectionId) -> Option<Peer> {
        let mut peers = self.peers.lock().await;
        let removed = peers.remove(&id);

        if let Some(peer) = &removed {
            tracing::info!(
                connection_id = %id,
                addr = %peer.addr,
                total = peers.len(),
                "Connection deregistered"
            );
        }

        removed
    }

    /// Write `payload` verbatim to every member except `sender`. Any member
    /// whose write fails is closed and removed before the lock is released;
    /// the failure never reaches the sender.
    pub async fn broadcast(&self, payload: &[u8], sender: ConnectionId) {
        let mut peers = self.peers.lock().await;

        let mut dead = Vec::new();
        for (id, peer) in peers.iter_mut() {
            if *id == sender {
                continue;
            }
            if let Err(e) = peer.writer.write_all(payload).await {
                tracing::debug!(
                    connection_id = %id,
                    addr = %peer.addr,
                    error = %e,
                    "Broadcast write failed"
                );
                dead.push(*id);
            }
        }

        for id in dead {
            if let Some(mut peer) = peers.remove(&id) {
                let _ = peer.writer.shutdown().await;
                tracing::info!(
                    connection_id = %id,
                    addr = %peer.addr,
                    total = peers.len(),
                    "Peer evicted after failed write"
                );
            }
        }
    }

    /// Shut down every registered connection and empty the set. Used by the
    /// shutdown sequence; handler tasks that are still running deregister as
    /// a no-op afterwards.
    pub async fn close_all(&self) -> usize {
        let mut peers = self.peers.lock().await;
        let count = peers.len();

        for (id, peer) in peers.iter_mut() {
            if let Err(e) = peer.writer.shutdown().await {
                tracing::debug!(connection_id = %id, error = %e, "Close during shutdown failed");
            }
        }
        peers.clear();

        if count > 0 {
            tracing::info!(closed = count, "Closed all registered connections");
        }

        count
    }

    /// Current membership size.
    pub async fn connection_count(&self) -> usize {
        self.peers.lock().await.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
