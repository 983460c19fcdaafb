//! Reply payloads and the callbacks that carry them.
//!
//! A successful reply is either a bare entity list or, when any `select`
//! result carried symlink directives, an envelope separating the symlink
//! packet from the body:
//!
//! ```json
//! {"headers":{"symlinks":{"link1":{"kind":"symlink","targetindex":0,"link":"/other/path"}}},
//!  "body":[{"_digger":{"warehouse":"/db/apples"}}]}
//! ```
//!
//! Callers must branch on that shape.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::errors::{BackendError, SupplierError};

/// Opaque record returned by backends.
pub type Entity = Value;

/// Link id to symlink description.
pub type SymlinkPacket = BTreeMap<String, SymlinkEntry>;

/// How a symlink directive should be resolved by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkKind {
    /// One attribute of the entity lives elsewhere; the entity is kept.
    Attr,
    /// The whole entity lives elsewhere; a stub is returned in its place.
    Symlink,
}

/// Description of one symlink found in a `select` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymlinkEntry {
    /// Resolution kind.
    pub kind: SymlinkKind,
    /// Index of the entity in the reply body.
    pub targetindex: usize,
    /// Where the linked data lives.
    pub link: Value,
    /// Original entity data, recorded for `attr` links only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Entity>,
}

/// Headers section of the symlink envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedHeaders {
    /// Symlink packet keyed by link id.
    pub symlinks: SymlinkPacket,
}

/// Envelope returned when a `select` result contains symlinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedReply {
    /// Side-channel symlink packet.
    pub headers: LinkedHeaders,
    /// Stamped entities, with stubs in place of whole-entity links.
    pub body: Vec<Entity>,
}

/// Successful reply payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Plain entity list.
    Entities(Vec<Entity>),
    /// Entity list with a symlink packet.
    Linked(LinkedReply),
}

impl Payload {
    /// Returns the entity list regardless of shape.
    pub fn body(&self) -> &[Entity] {
        match self {
            Self::Entities(entities) => entities,
            Self::Linked(linked) => &linked.body,
        }
    }

    /// Returns the symlink packet when the reply is an envelope.
    pub fn symlinks(&self) -> Option<&SymlinkPacket> {
        match self {
            Self::Entities(_) => None,
            Self::Linked(linked) => Some(&linked.headers.symlinks),
        }
    }

    /// Consumes the payload, returning the entity list.
    pub fn into_body(self) -> Vec<Entity> {
        match self {
            Self::Entities(entities) => entities,
            Self::Linked(linked) => linked.body,
        }
    }
}

/// One-shot completion callback.
///
/// Ownership enforces the reply contract: a callback is consumed by the first
/// `send`, so nothing can answer twice through the same handle.
pub struct Callback<T, E> {
    inner: Box<dyn FnOnce(Result<T, E>) + Send>,
}

impl<T, E> Callback<T, E> {
    /// Wraps a completion function.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        Self { inner: Box::new(f) }
    }

    /// Completes with `result`.
    pub fn send(self, result: Result<T, E>) {
        (self.inner)(result);
    }

    /// Completes successfully.
    pub fn ok(self, value: T) {
        self.send(Ok(value));
    }

    /// Completes with an error.
    pub fn fail(self, error: E) {
        self.send(Err(error));
    }
}

impl<T, E> fmt::Debug for Callback<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Reply sink handed to middleware and the dispatcher.
pub type Reply = Callback<Payload, SupplierError>;

/// Reply handed to `select`, `append`, `save` and `remove` handlers.
pub type EntityReply = Callback<Vec<Entity>, BackendError>;

/// Reply handed to `load` handlers; the value becomes the append context.
pub type LoadReply = Callback<Value, BackendError>;

/// Failure line written by [`ResponseWriter::write_error`].
#[derive(Debug, Serialize)]
struct ErrorLine {
    error: String,
}

/// Writer that serialises reply outcomes as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a successful payload as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub fn write_payload(&mut self, payload: &Payload) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, payload)?;
        self.finish_line()
    }

    /// Writes an error as `{"error": "<message>"}`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub fn write_error(&mut self, error: &SupplierError) -> std::io::Result<()> {
        let line = ErrorLine {
            error: error.to_string(),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.finish_line()
    }

    /// Writes either side of a reply outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub fn write_outcome(&mut self, outcome: &Result<Payload, SupplierError>) -> std::io::Result<()> {
        match outcome {
            Ok(payload) => self.write_payload(payload),
            Err(error) => self.write_error(error),
        }
    }

    fn finish_line(&mut self) -> std::io::Result<()> {
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
