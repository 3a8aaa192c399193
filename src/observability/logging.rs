//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once, at the composition root
//! - Honour `RUST_LOG` when set, otherwise the configured level
//!
//! The library only emits `tracing` events; it never installs a subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the filter used when `RUST_LOG` is absent.
pub fn default_filter(config: &ObservabilityConfig) -> String {
    format!(
        "provider_shield={level},{level}",
        level = config.log_level.to_ascii_lowercase()
    )
}

/// Install the global subscriber.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config).into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
