//! Structured logging for hosts embedding a supplier.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use supplier_config::{Config, LogFormat};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned once telemetry is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a handle without reconfiguring, even when `config`
/// differs. A failed first call leaves nothing installed, so it may be
/// retried with a corrected configuration.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter expression and
/// [`TelemetryError::Subscriber`] if the host already installed a subscriber.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install(config))
        .map(|_| TelemetryHandle)
}

fn filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn subscriber(config: &Config) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter(config)?)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    tracing::subscriber::set_global_default(subscriber(config)?)
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn config(filter: &str, format: LogFormat) -> Config {
        Config {
            log_filter: Some(filter.to_owned()),
            log_format: Some(format),
            ..Config::default()
        }
    }

    #[rstest]
    #[case("info", LogFormat::Json)]
    #[case("supplier::dispatch=debug,warn", LogFormat::Compact)]
    fn builds_subscribers_for_valid_filters(#[case] filter: &str, #[case] format: LogFormat) {
        assert!(subscriber(&config(filter, format)).is_ok());
    }

    #[test]
    fn rejects_invalid_filters() {
        let result = subscriber(&config("supplier=[", LogFormat::Json));
        assert!(matches!(result, Err(TelemetryError::Filter(_))));
    }
}
