//! Logging setup for binaries built on the container.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the process entry point.

use tracing_subscriber::EnvFilter;

use crate::errors::{ContainerError, ContainerResult};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` is used
/// (e.g. `"info"` or `"stagehand=debug"`).
///
/// # Errors
///
/// Returns error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_logging(default_filter: &str) -> ContainerResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
            ContainerError::Config(format!("invalid log filter '{}': {}", default_filter, e))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| ContainerError::Config(format!("failed to install logger: {}", e)))
}
