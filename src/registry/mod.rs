//! Shared set of active connections and the broadcast fan-out.

mod peer;
#[allow(clippy::module_inception)]
mod registry;

pub use peer::{ConnectionId, Peer};
pub use registry::Registry;
