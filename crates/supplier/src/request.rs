//! Request model consumed by the supplier pipeline.
//!
//! Requests arrive as `{ method, url, headers, body }` documents. The header
//! map is mutable and doubles as the channel through which the pipeline and
//! backends share the routing trail, resource descriptor and selector.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SupplierError;
use crate::selector::Selector;

/// Header accumulating the provisioned segments across nested suppliers.
pub const ROUTE_HEADER: &str = "x-supplier-route";
/// Header holding the resource descriptor built by the provisioner.
pub const RESOURCE_HEADER: &str = "x-json-resource";
/// Header holding the selector consumed by `select` handlers.
pub const SELECTOR_HEADER: &str = "x-json-selector";
/// Header holding a per-request routing trail alias.
pub const ALIAS_HEADER: &str = "x-supplier-alias";

/// Mutable request header map.
pub type Headers = Map<String, Value>;

/// Provisioned segment name to raw path segment.
pub type Resource = BTreeMap<String, String>;

/// Request methods understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Read entities.
    Get,
    /// Read with a body, or create entities.
    Post,
    /// Update entities.
    Put,
    /// Remove entities.
    Delete,
}

impl Method {
    /// Parses a method string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::UnknownMethod` if the value is not one of
    /// `get`, `post`, `put` or `delete`.
    pub fn parse(value: &str) -> Result<Self, SupplierError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            _ => Err(SupplierError::unknown_method(value)),
        }
    }

    /// Returns the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing trail alias: a trail starting with `from` has that prefix replaced
/// by `to`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SupplierAlias {
    /// Prefix to replace.
    pub from: String,
    /// Replacement prefix.
    pub to: String,
}

impl SupplierAlias {
    /// Creates an alias rule.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Rewrites `route` when it starts with the alias prefix.
    pub fn apply(&self, route: &str) -> Option<String> {
        route
            .strip_prefix(self.from.as_str())
            .map(|rest| format!("{}{rest}", self.to))
    }
}

/// Request flowing through the supplier pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierRequest {
    /// Request method.
    pub method: Method,
    /// Remaining URL path, always starting with `/`.
    pub url: String,
    /// Mutable header map.
    pub headers: Headers,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Selector resolved for `select` dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    /// Context handed to the backend: the body for selects and plain appends,
    /// the loaded value for load-then-append.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Wire shape of an inbound request document.
#[derive(Debug, Deserialize)]
struct RawRequest {
    method: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    body: Option<Value>,
}

impl SupplierRequest {
    /// Creates a request with empty headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            selector: None,
            context: None,
        }
    }

    /// Adds a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parses a JSON request document.
    ///
    /// Trailing whitespace (including a newline delimiter) is trimmed before
    /// parsing. A missing `url` is treated as `/`.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedRequest` if the input is empty or is
    /// not a valid request document, and `SupplierError::UnknownMethod` if the
    /// method is not recognised.
    pub fn parse(line: &[u8]) -> Result<Self, SupplierError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(SupplierError::malformed("empty request"));
        }

        let raw: RawRequest =
            serde_json::from_slice(trimmed).map_err(SupplierError::from_json_error)?;
        let method = Method::parse(&raw.method)?;

        Ok(Self {
            method,
            url: raw.url.unwrap_or_else(|| String::from("/")),
            headers: raw.headers,
            body: raw.body,
            selector: None,
            context: None,
        })
    }

    /// Validates that the URL is an absolute path.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedRequest` if the URL does not start
    /// with `/`.
    pub fn validate(&self) -> Result<(), SupplierError> {
        if !self.url.starts_with('/') {
            return Err(SupplierError::malformed(format!(
                "url must start with '/': {}",
                self.url
            )));
        }
        Ok(())
    }

    /// Returns the routing trail accumulated so far.
    ///
    /// A non-string trail reads as `None`; use [`SupplierRequest::trail`]
    /// where that must be rejected.
    pub fn route(&self) -> Option<&str> {
        self.headers.get(ROUTE_HEADER).and_then(Value::as_str)
    }

    /// Returns the routing trail, treating `null` as absent.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedHeader` if the trail header holds
    /// anything other than a string.
    pub fn trail(&self) -> Result<Option<&str>, SupplierError> {
        match self.headers.get(ROUTE_HEADER) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => <&str>::deserialize(value)
                .map(Some)
                .map_err(|source| SupplierError::malformed_header(ROUTE_HEADER, source)),
        }
    }

    /// Replaces the routing trail.
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.headers
            .insert(ROUTE_HEADER.to_owned(), Value::String(route.into()));
    }

    /// Returns the resource descriptor attached by the provisioner.
    ///
    /// Non-string segment values are skipped.
    pub fn resource(&self) -> Resource {
        self.headers
            .get(RESOURCE_HEADER)
            .and_then(Value::as_object)
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(name, segment)| {
                        segment.as_str().map(|text| (name.clone(), text.to_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attaches the resource descriptor.
    pub fn set_resource(&mut self, resource: &Resource) {
        let object = resource
            .iter()
            .map(|(name, segment)| (name.clone(), Value::String(segment.clone())))
            .collect::<Map<_, _>>();
        self.headers
            .insert(RESOURCE_HEADER.to_owned(), Value::Object(object));
    }

    /// Reads the selector supplied through the selector header.
    ///
    /// The header may hold the selector object itself or a JSON-encoded
    /// string.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedHeader` if the header value is not a
    /// selector.
    pub fn header_selector(&self) -> Result<Option<Selector>, SupplierError> {
        decode_header(&self.headers, SELECTOR_HEADER)
    }

    /// Sets the selector and mirrors it into the selector header.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedHeader` if the selector cannot be
    /// encoded.
    pub fn set_selector(&mut self, selector: Selector) -> Result<(), SupplierError> {
        let encoded = serde_json::to_value(&selector)
            .map_err(|source| SupplierError::malformed_header(SELECTOR_HEADER, source))?;
        self.headers.insert(SELECTOR_HEADER.to_owned(), encoded);
        self.selector = Some(selector);
        Ok(())
    }

    /// Reads the alias directive carried by the request.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedHeader` if the header is not a
    /// `{from, to}` object.
    pub fn alias(&self) -> Result<Option<SupplierAlias>, SupplierError> {
        decode_header(&self.headers, ALIAS_HEADER)
    }
}

/// Request handed to the `load` handler ahead of an `append`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRequest {
    /// Entity id taken from the single URL segment.
    pub id: String,
    /// Headers of the originating request.
    pub headers: Headers,
}

fn decode_header<T>(headers: &Headers, name: &'static str) -> Result<Option<T>, SupplierError>
where
    T: for<'de> Deserialize<'de>,
{
    let decoded = match headers.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(encoded)) => serde_json::from_str(encoded),
        Some(value) => serde_json::from_value(value.clone()),
    };
    decoded
        .map(Some)
        .map_err(|source| SupplierError::malformed_header(name, source))
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
