//! Tracing subscriber setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set: `level` for everything, with the chatty
/// dependencies turned down.
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("{level},sqlx=warn,rdkafka=warn,hyper=warn,reqwest=warn")
}

/// Install the global fmt subscriber. `RUST_LOG` overrides `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
