use serde::Deserialize;
use std::str::FromStr;
use tracing::Level;

use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

/// Installs the global `fmt` subscriber. Calling it again is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = Level::from_str(&config.level).map_err(|_| {
        ForecastError::InvalidArgument(format!("unknown log level '{}'", config.level))
    })?;

    // try_init fails only when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init();

    Ok(())
}
