//! Error types for request supplying failures.
//!
//! This module defines the structured errors surfaced while parsing, provisioning
//! and dispatching a request. Every error is scoped to the request that raised
//! it and is delivered to the caller's reply unchanged; nothing is retried.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::router::Intent;

/// Opaque failure reported by a backend handler.
///
/// Backends may fail with any JSON value. The value is kept verbatim so the
/// caller sees exactly what the backend produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    value: Value,
}

impl BackendError {
    /// Wraps an arbitrary backend failure value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Creates a backend error from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(Value::String(message.into()))
    }

    /// Returns the raw value reported by the backend.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the error, returning the raw value.
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(message) => f.write_str(message),
            other => write!(f, "{other}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Errors surfaced while supplying a request.
#[derive(Debug, Error)]
pub enum SupplierError {
    /// The URL has fewer segments than the provisioner consumes.
    #[error("provision paths needs {required} parts, url supplied {available}")]
    InsufficientPathSegments { required: usize, available: usize },

    /// A backend handler replied with an error.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// The `load` preceding an `append` failed, so the append never ran.
    #[error("load failed: {0}")]
    LoadFailed(BackendError),

    /// No handler is registered for the intent the request resolved to.
    #[error("no handler registered for {intent}")]
    Unhandled { intent: Intent },

    /// Request bytes could not be parsed into a request.
    #[error("malformed request: {message}")]
    MalformedRequest {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A reserved header holds a value of the wrong shape.
    #[error("malformed {header} header: {source}")]
    MalformedHeader {
        header: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The request method is not one of `get`, `post`, `put` or `delete`.
    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    /// The pipeline did not reply within the configured timeout.
    #[error("no reply within {}ms", .after.as_millis())]
    TimedOut { after: Duration },
}

impl SupplierError {
    /// Creates an insufficient path segments error.
    pub fn insufficient_segments(required: usize, available: usize) -> Self {
        Self::InsufficientPathSegments {
            required,
            available,
        }
    }

    /// Creates a malformed request error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a malformed header error.
    pub fn malformed_header(header: &'static str, source: serde_json::Error) -> Self {
        Self::MalformedHeader { header, source }
    }

    /// Creates an unknown method error.
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
        }
    }

    /// Creates an unhandled intent error.
    pub fn unhandled(intent: Intent) -> Self {
        Self::Unhandled { intent }
    }

    /// Returns the backend value when the error originated in a backend.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(error) | Self::LoadFailed(error) => Some(error),
            _ => None,
        }
    }
}
