use std::time::Duration;

/// Default log filter expression used by the supplier.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the supplier.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the supplier.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Replies wait indefinitely unless a timeout is configured.
pub fn default_reply_timeout() -> Option<Duration> {
    None
}
