//! Logging system setup.

use crate::config::LoggingSettings;
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Picks the base filter: `--debug` wins over the configured level.
pub fn base_level(settings: &LoggingSettings, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        settings.level.as_str()
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the level chosen from configuration and arguments.
///
/// # Arguments
///
/// * `settings` - The `[logging]` section of the configuration
/// * `debug` - Force debug level
/// * `json_format` - Emit JSON lines instead of human readable output
pub fn setup_logging(settings: &LoggingSettings, debug: bool, json_format: bool) -> Result<()> {
    let level = base_level(settings, debug);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json_format || settings.json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_thread_ids(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| anyhow!("failed to initialise logging: {e}"))
}
