//! Request supplier for digger storage backends.
//!
//! A supplier sits between an inbound request and the storage backends that
//! answer it. For every request it:
//!
//! 1. provisions the leading URL segments of its mount point into a resource
//!    descriptor and extends the routing trail;
//! 2. runs the registered middleware in order, any of which may answer early;
//! 3. maps the method and remaining URL onto one intent (`select`, `append`,
//!    `save`, `remove`, optionally preceded by `load`) and resolves bare URL
//!    tokens into selectors;
//! 4. stamps every returned entity with the routing trail and splits symlink
//!    directives out of `select` results.
//!
//! Replies are never delivered inside [`Supplier::handle`]; they are queued on
//! the caller's [`TaskQueue`] and run when the caller drains it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use supplier::{EntityReply, Method, Supplier, SupplierRequest, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let supplier = Supplier::builder(queue.spawner())
//!     .provision(["database", "collection"])
//!     .on_select(Arc::new(|_: &SupplierRequest, reply: EntityReply| {
//!         reply.ok(vec![json!({"name": "apple"})]);
//!     }))
//!     .build();
//!
//! supplier.handle(SupplierRequest::new(Method::Get, "/bob/apples/select"), |result| {
//!     println!("{result:?}");
//! });
//! queue.run_pending();
//! ```

mod backends;
mod errors;
mod middleware;
mod observe;
mod provision;
mod request;
mod response;
mod router;
mod schedule;
mod selector;
pub mod stamp;
mod supplier;
pub mod telemetry;

pub use backends::{IntentHandler, LoadHandler, Warehouse};
pub use errors::{BackendError, SupplierError};
pub use middleware::{Middleware, MiddlewareStack, Next};
pub use observe::{
    ActionEvent, ActionOutcome, Observers, ProvisionEvent, StructuredObserver, SupplierEvent,
    SupplierObserver,
};
pub use provision::{Provisioned, Provisioner, apply_alias};
pub use request::{
    ALIAS_HEADER, Headers, LoadRequest, Method, RESOURCE_HEADER, ROUTE_HEADER, Resource,
    SELECTOR_HEADER, SupplierAlias, SupplierRequest,
};
pub use response::{
    Callback, Entity, EntityReply, LinkedHeaders, LinkedReply, LoadReply, Payload, Reply,
    ResponseWriter, SymlinkEntry, SymlinkKind, SymlinkPacket,
};
pub use router::{DispatchRouter, Intent, Route};
pub use schedule::{Spawner, Task, TaskQueue, deferred_reply};
pub use selector::{
    IdMatcher, IdSelector, LASTSTEP, LiteralSelectorParser, Selector, SelectorParser,
    SelectorResolver, is_diggerid,
};
pub use supplier::{Supplier, SupplierBuilder};
pub use supplier_config::{Config, ConfigError};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
