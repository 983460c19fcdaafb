//! Storage backend seams.
//!
//! Backends answer exactly one intent each. The dispatcher holds a typed
//! handler per intent rather than broadcasting events, so an intent with no
//! handler is detected and reported instead of silently stalling.

use std::fmt;
use std::sync::Arc;

use crate::request::{LoadRequest, SupplierRequest};
use crate::response::{EntityReply, LoadReply};
use crate::router::Intent;

/// Backend answering `select`, `append`, `save` or `remove`.
///
/// The handler must eventually complete `reply`; it may do so before
/// returning or later from another thread.
pub trait IntentHandler: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: &SupplierRequest, reply: EntityReply);
}

impl<F> IntentHandler for F
where
    F: Fn(&SupplierRequest, EntityReply) + Send + Sync,
{
    fn handle(&self, request: &SupplierRequest, reply: EntityReply) {
        self(request, reply);
    }
}

/// Backend resolving the entity named by a `POST /<id>` before an append.
pub trait LoadHandler: Send + Sync {
    /// Loads the context for the pending append.
    fn load(&self, request: LoadRequest, reply: LoadReply);
}

impl<F> LoadHandler for F
where
    F: Fn(LoadRequest, LoadReply) + Send + Sync,
{
    fn load(&self, request: LoadRequest, reply: LoadReply) {
        self(request, reply);
    }
}

/// Handler set registered with a supplier.
#[derive(Clone, Default)]
pub struct Warehouse {
    select: Option<Arc<dyn IntentHandler>>,
    append: Option<Arc<dyn IntentHandler>>,
    save: Option<Arc<dyn IntentHandler>>,
    remove: Option<Arc<dyn IntentHandler>>,
    load: Option<Arc<dyn LoadHandler>>,
}

impl fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Warehouse")
            .field("select", &self.select.is_some())
            .field("append", &self.append.is_some())
            .field("save", &self.save.is_some())
            .field("remove", &self.remove.is_some())
            .field("load", &self.load.is_some())
            .finish()
    }
}

impl Warehouse {
    /// Creates an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for an entity intent, replacing any previous one.
    ///
    /// `Ping` and `Load` have no entity handler slot and are ignored; use
    /// [`Warehouse::set_load`] for `Load`.
    pub fn set(&mut self, intent: Intent, handler: Arc<dyn IntentHandler>) {
        let slot = match intent {
            Intent::Select => &mut self.select,
            Intent::Append => &mut self.append,
            Intent::Save => &mut self.save,
            Intent::Remove => &mut self.remove,
            Intent::Ping | Intent::Load => return,
        };
        *slot = Some(handler);
    }

    /// Registers the load handler.
    pub fn set_load(&mut self, handler: Arc<dyn LoadHandler>) {
        self.load = Some(handler);
    }

    /// Returns the handler for an entity intent.
    pub fn handler(&self, intent: Intent) -> Option<Arc<dyn IntentHandler>> {
        match intent {
            Intent::Select => self.select.clone(),
            Intent::Append => self.append.clone(),
            Intent::Save => self.save.clone(),
            Intent::Remove => self.remove.clone(),
            Intent::Ping | Intent::Load => None,
        }
    }

    /// Returns the load handler.
    pub fn loader(&self) -> Option<Arc<dyn LoadHandler>> {
        self.load.clone()
    }
}
