//! Structured logging setup

use mirrorcam_core::{CoreError, CoreResult};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` overrides `default_directive` when set. Calling this again
/// after a subscriber is installed is a no-op.
pub fn init_logging(default_directive: &str) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| CoreError::Logging {
            reason: format!("invalid filter {:?}: {}", default_directive, e),
        })?;

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialized");
    }
    Ok(())
}
