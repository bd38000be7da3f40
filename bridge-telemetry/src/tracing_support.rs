//! Structured tracing setup.

use anyhow::{Context, Result};
use bridge_config::{LogFormat, TelemetrySection};
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set, otherwise the configured directive.
///
/// # Errors
///
/// Fails when the configured directive does not parse.
pub fn filter(section: &TelemetrySection) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&section.filter)
            .with_context(|| format!("invalid telemetry filter `{}`", section.filter)),
    }
}

/// Installs the global fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls from tests and embedders harmless.
///
/// # Errors
///
/// Fails when the filter directive is invalid.
pub fn init(section: &TelemetrySection) -> Result<bool> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(section)?);
    let installed = match section.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    Ok(installed.is_ok())
}
