//! Tracing initialization.
//!
//! Log verbosity is controlled through `RUST_LOG` (env-filter syntax,
//! defaulting to `info`); the output format is controlled through the
//! `log.format` setting (`text` or `json`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Initialize the tracing subscriber. Call once at startup, before any
/// other component logs.
pub fn init_telemetry(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(format = %config.format, "Tracing initialized");
}
