//! Tracing subscriber setup.

use crate::error::{FlowGraphError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global fmt subscriber filtered by `filter`.
///
/// `RUST_LOG` takes precedence when set. Calling this again after a
/// subscriber is installed does nothing.
///
/// # Errors
/// `Logging` if `filter` is not a valid `EnvFilter` directive.
pub fn init_logging(filter: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter)
            .map_err(|e| FlowGraphError::Logging(format!("Invalid filter '{}': {}", filter, e)))?,
    };

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}
