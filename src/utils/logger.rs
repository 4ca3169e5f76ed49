use crate::errors::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Logger utility for the application
pub struct Logger;

impl Logger {
    /// Initialize the logger with default configuration
    pub fn init() -> Result<()> {
        Self::init_with_level(Level::INFO)
    }

    /// Initialize the logger with specified level; `RUST_LOG` takes precedence
    pub fn init_with_level(level: Level) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();

        Ok(())
    }
}
