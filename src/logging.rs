//! Tracing subscriber setup for hosts embedding the engine.
//!
//! The engine only emits `tracing` events; nothing is printed until the
//! host installs a subscriber. [`init`] installs the usual one.

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the level is `DEBUG`
/// when `verbose` and `INFO` otherwise.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
