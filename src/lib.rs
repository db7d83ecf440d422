// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod telemetry;

// Domain layer (relay logic)
pub mod registry;

// Application layer
pub mod server;

// Supporting modules
pub mod shutdown;
