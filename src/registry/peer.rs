use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::net::tcp::OwnedWriteHalf;
use uuid::Uuid;

/// Identity of a registered connection.
pub type ConnectionId = Uuid;

/// Write side of a registered connection, held by the registry on behalf of
/// the connection's handler task.
pub struct Peer {
    pub writer: OwnedWriteHalf,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl Peer {
    pub fn new(writer: OwnedWriteHalf, addr: SocketAddr) -> Self {
        Self {
            writer,
            addr,
            connected_at: Utc::now(),
        }
    }
}
