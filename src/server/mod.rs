//! TCP listener and per-connection handling.

mod handler;
mod relay;

pub use relay::Relay;
