//! Shared configuration for the request supplier.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then a
//! configuration file (`--config-path` or `SUPPLIER_CONFIG_PATH`), then
//! `SUPPLIER_*` environment variables, then command-line flags. The resolved
//! [`Config`] describes how a supplier mounts itself: which leading URL
//! segments it provisions into the resource descriptor, the optional routing
//! trail alias, the reply timeout, and the telemetry settings.
//!
//! ```toml
//! provision = ["database", "collection"]
//! alias_from = "/warehouse"
//! alias_to = "/mounted"
//! reply_timeout_ms = 5000
//! log_filter = "supplier=debug"
//! log_format = "compact"
//! ```

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, default_log_filter, default_log_format, default_reply_timeout,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved supplier configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SUPPLIER")]
pub struct Config {
    /// Names of the leading URL segments consumed into the resource descriptor.
    #[serde(default)]
    pub provision: Vec<String>,
    /// Routing trail prefix replaced by `alias_to`.
    pub alias_from: Option<String>,
    /// Replacement for a routing trail starting with `alias_from`.
    pub alias_to: Option<String>,
    /// Milliseconds to wait for a reply before failing the request.
    pub reply_timeout_ms: Option<u64>,
    /// Tracing filter expression.
    pub log_filter: Option<String>,
    /// Tracing output format.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Provisioned segment names in consumption order.
    pub fn provision(&self) -> &[String] {
        &self.provision
    }

    /// Alias rule as `(from, to)` when both halves are configured.
    pub fn alias(&self) -> Option<(&str, &str)> {
        match (self.alias_from.as_deref(), self.alias_to.as_deref()) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    /// Reply timeout, if any.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms
            .map(Duration::from_millis)
            .or_else(default_reply_timeout)
    }

    /// Tracing filter expression.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Tracing output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Checks the settings that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IncompleteAlias`] when only one half of the alias
    /// rule is set and [`ConfigError::EmptySegmentName`] when a provisioned
    /// segment name is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.alias_from, &self.alias_to) {
            (Some(_), None) => return Err(ConfigError::IncompleteAlias { missing: "alias_to" }),
            (None, Some(_)) => {
                return Err(ConfigError::IncompleteAlias {
                    missing: "alias_from",
                });
            }
            _ => {}
        }

        if let Some(position) = self.provision.iter().position(|name| name.trim().is_empty()) {
            return Err(ConfigError::EmptySegmentName { position });
        }

        Ok(())
    }
}

/// Configuration values that load but cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One half of the alias rule is missing.
    #[error("alias rule is incomplete: {missing} is not set")]
    IncompleteAlias { missing: &'static str },
    /// A provisioned segment name is blank.
    #[error("provisioned segment name at position {position} is empty")]
    EmptySegmentName { position: usize },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_resolve_through_accessors() {
        let config = Config::default();
        assert!(config.provision().is_empty());
        assert_eq!(config.alias(), None);
        assert_eq!(config.reply_timeout(), None);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn alias_requires_both_halves() {
        let config = Config {
            alias_from: Some(String::from("/warehouse")),
            ..Config::default()
        };
        assert_eq!(config.alias(), None);
        assert_eq!(
            config.validate(),
            Err(ConfigError::IncompleteAlias { missing: "alias_to" })
        );
    }

    #[test]
    fn alias_pairs_when_complete() {
        let config = Config {
            alias_from: Some(String::from("/warehouse")),
            alias_to: Some(String::from("/mounted")),
            ..Config::default()
        };
        assert_eq!(config.alias(), Some(("/warehouse", "/mounted")));
    }

    #[rstest]
    #[case(vec!["database", ""], 1)]
    #[case(vec!["  "], 0)]
    fn rejects_blank_segment_names(#[case] names: Vec<&str>, #[case] position: usize) {
        let config = Config {
            provision: names.into_iter().map(String::from).collect(),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptySegmentName { position })
        );
    }

    #[test]
    fn converts_timeout_to_duration() {
        let config = Config {
            reply_timeout_ms: Some(250),
            ..Config::default()
        };
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(250)));
    }
}
