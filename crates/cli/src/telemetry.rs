use std::env;

use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::layer::SubscriberExt;

const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs a stderr subscriber filtered by `CERTFLOW_LOG` or `RUST_LOG`.
///
/// Stdout carries the command's own output only.
///
/// # Errors
///
/// Returns an error for an invalid filter or when a subscriber is already set.
pub fn init_tracing() -> Result<(), TelemetryError> {
    let filter = env::var("CERTFLOW_LOG")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_owned());
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(SystemTime)
                .with_target(true),
        );
    set_global_default(subscriber)?;
    Ok(())
}
