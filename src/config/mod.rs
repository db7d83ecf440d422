mod settings;

pub use settings::{LogConfig, RelayConfig, ServerConfig, Settings};
