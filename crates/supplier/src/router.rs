//! Method and URL routing onto backend intents.
//!
//! This module maps each provisioned request to one intent and drives the
//! backend handler for it:
//!
//! | Method | URL                         | Intent                      |
//! |--------|-----------------------------|-----------------------------|
//! | any    | ends with `/ping`           | synthetic pong, no backend  |
//! | get    | any                         | `select`                    |
//! | post   | contains `/select`, `/tree` | `select`                    |
//! | post   | `/<word>`                   | `load`, then `append`       |
//! | post   | anything else               | `append`                    |
//! | put    | any                         | `save`                      |
//! | delete | any                         | `remove`                    |
//!
//! Backend errors short-circuit to the reply unstamped. Successful results are
//! stamped with the routing trail, and `select` results are split for
//! symlinks, before the reply is sent.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backends::{IntentHandler, Warehouse};
use crate::errors::SupplierError;
use crate::observe::{ActionEvent, ActionOutcome, Observers, SupplierEvent};
use crate::request::{LoadRequest, Method, SupplierRequest};
use crate::response::{EntityReply, LoadReply, Payload, Reply};
use crate::selector::SelectorResolver;
use crate::stamp;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Dispatch outcomes a request can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Liveness check answered by the supplier itself.
    Ping,
    /// Read entities.
    Select,
    /// Create entities.
    Append,
    /// Update entities.
    Save,
    /// Delete entities.
    Remove,
    /// Fetch the append target named in the URL.
    Load,
}

impl Intent {
    /// Returns the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Select => "select",
            Self::Append => "append",
            Self::Save => "save",
            Self::Remove => "remove",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Reply with a pong without touching a backend.
    Ping,
    /// Emit `select`; `resolve` is false when the selector comes from headers.
    Select {
        /// Whether the selector is derived from the URL.
        resolve: bool,
    },
    /// Emit `load` for `id`, then `append` into the loaded context.
    LoadThenAppend {
        /// Entity id named by the URL.
        id: String,
    },
    /// Emit `append` with the body as context.
    Append,
    /// Emit `save`.
    Save,
    /// Emit `remove`.
    Remove,
}

impl Route {
    /// Classifies a request by method and remaining URL.
    pub fn classify(method: Method, url: &str) -> Self {
        if url.ends_with("/ping") {
            return Self::Ping;
        }

        let select = Self::Select {
            resolve: SelectorResolver::applies_to(url),
        };
        match method {
            Method::Get => select,
            Method::Post if url.contains("/select") || url.contains("/tree") => select,
            Method::Post => match bare_word(url) {
                Some(id) => Self::LoadThenAppend { id: id.to_owned() },
                None => Self::Append,
            },
            Method::Put => Self::Save,
            Method::Delete => Self::Remove,
        }
    }

    /// Intent emitted last for this route.
    pub fn intent(&self) -> Intent {
        match self {
            Self::Ping => Intent::Ping,
            Self::Select { .. } => Intent::Select,
            Self::LoadThenAppend { .. } | Self::Append => Intent::Append,
            Self::Save => Intent::Save,
            Self::Remove => Intent::Remove,
        }
    }
}

/// Returns the segment of a `/<word>` URL, where a word is `[A-Za-z0-9_]+`.
fn bare_word(url: &str) -> Option<&str> {
    let word = url.strip_prefix('/')?;
    let is_word = !word.is_empty()
        && word
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    is_word.then_some(word)
}

/// Routes requests to backend handlers.
#[derive(Debug, Clone, Default)]
pub struct DispatchRouter {
    warehouse: Warehouse,
    resolver: SelectorResolver,
    observers: Arc<Observers>,
}

impl DispatchRouter {
    /// Creates a router over the given handlers.
    pub fn new(warehouse: Warehouse, resolver: SelectorResolver, observers: Arc<Observers>) -> Self {
        Self {
            warehouse,
            resolver,
            observers,
        }
    }

    /// Dispatches a request; the outcome is delivered through `reply`.
    pub fn route(&self, request: SupplierRequest, reply: Reply) {
        let route = Route::classify(request.method, &request.url);

        debug!(
            target: DISPATCH_TARGET,
            method = request.method.as_str(),
            url = %request.url,
            intent = route.intent().as_str(),
            "routing request"
        );

        match route {
            Route::Ping => reply.ok(stamp::ping_payload()),
            Route::Select { resolve } => self.select(request, reply, resolve),
            Route::LoadThenAppend { id } => self.load_then_append(request, reply, id),
            Route::Append => {
                let mut request = request;
                request.context = request.body.clone();
                self.mutate(Intent::Append, request, reply);
            }
            Route::Save => self.mutate(Intent::Save, request, reply),
            Route::Remove => self.mutate(Intent::Remove, request, reply),
        }
    }

    fn select(&self, mut request: SupplierRequest, reply: Reply, resolve: bool) {
        let selected = if resolve {
            match self.resolver.resolve(&request.url) {
                Some(selector) => request.set_selector(selector),
                None => Ok(()),
            }
        } else {
            request.header_selector().map(|selector| {
                request.selector = selector;
            })
        };
        if let Err(error) = selected {
            warn!(target: DISPATCH_TARGET, %error, "selector rejected");
            reply.fail(error);
            return;
        }

        request.context = Some(
            request
                .body
                .clone()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        );

        let Some(handler) = self.handler(Intent::Select) else {
            reply.fail(SupplierError::unhandled(Intent::Select));
            return;
        };
        emit(Intent::Select, handler, request, reply, Arc::clone(&self.observers));
    }

    fn load_then_append(&self, request: SupplierRequest, reply: Reply, id: String) {
        let Some(append) = self.handler(Intent::Append) else {
            reply.fail(SupplierError::unhandled(Intent::Append));
            return;
        };
        let Some(loader) = self.warehouse.loader() else {
            warn!(target: DISPATCH_TARGET, intent = "load", "no handler registered");
            reply.fail(SupplierError::unhandled(Intent::Load));
            return;
        };

        let load_request = LoadRequest {
            id,
            headers: request.headers.clone(),
        };
        let observers = Arc::clone(&self.observers);
        let mut request = request;
        loader.load(
            load_request,
            LoadReply::new(move |result| match result {
                Ok(context) => {
                    request.context = Some(context);
                    emit(Intent::Append, append, request, reply, observers);
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "load failed; append cancelled");
                    reply.fail(SupplierError::LoadFailed(error));
                }
            }),
        );
    }

    fn mutate(&self, intent: Intent, request: SupplierRequest, reply: Reply) {
        let Some(handler) = self.handler(intent) else {
            reply.fail(SupplierError::unhandled(intent));
            return;
        };
        emit(intent, handler, request, reply, Arc::clone(&self.observers));
    }

    fn handler(&self, intent: Intent) -> Option<Arc<dyn IntentHandler>> {
        let handler = self.warehouse.handler(intent);
        if handler.is_none() {
            warn!(target: DISPATCH_TARGET, intent = intent.as_str(), "no handler registered");
        }
        handler
    }
}

/// Hands `request` to `handler` and completes `reply` with the stamped result.
fn emit(
    intent: Intent,
    handler: Arc<dyn IntentHandler>,
    request: SupplierRequest,
    reply: Reply,
    observers: Arc<Observers>,
) {
    let request = Arc::new(request);
    let completed = Arc::clone(&request);
    handler.handle(
        &request,
        EntityReply::new(move |result| {
            let entities = match result {
                Ok(entities) => entities,
                Err(error) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        intent = intent.as_str(),
                        %error,
                        "backend failed"
                    );
                    reply.fail(SupplierError::Backend(error));
                    return;
                }
            };

            let route = completed.route();
            let payload = match intent {
                Intent::Select => stamp::select_payload(entities, route),
                _ => stamp::mutation_payload(entities, route),
            };

            debug!(
                target: DISPATCH_TARGET,
                intent = intent.as_str(),
                results = payload.body().len(),
                "intent completed"
            );

            if !observers.is_empty() {
                observers.emit(&SupplierEvent::Action(ActionEvent {
                    intent,
                    request: Arc::clone(&completed),
                    outcome: outcome(intent, &payload),
                }));
            }
            reply.ok(payload);
        }),
    );
}

fn outcome(intent: Intent, payload: &Payload) -> ActionOutcome {
    match intent {
        Intent::Save | Intent::Remove => ActionOutcome::Count(payload.body().len()),
        _ => ActionOutcome::Results(payload.body().to_vec()),
    }
}
