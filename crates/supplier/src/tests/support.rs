//! Scenario world for the supplier dispatch behaviour suite.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::{
    BackendError, EntityReply, IntentHandler, LoadHandler, LoadReply, LoadRequest, Middleware,
    Next, Payload, Reply, Supplier, SupplierError, SupplierRequest, TaskQueue,
};

/// Shared record of middleware and backend invocations, in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Scenario world shared across BDD steps.
pub struct SupplierWorld {
    queue: TaskQueue,
    provision: Vec<String>,
    id_prefix: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
    select: Option<Arc<dyn IntentHandler>>,
    append: Option<Arc<dyn IntentHandler>>,
    load: Option<Arc<dyn LoadHandler>>,
    calls: CallLog,
    seen: Arc<Mutex<Option<SupplierRequest>>>,
    outcome: Arc<Mutex<Option<Result<Payload, SupplierError>>>>,
    pub replied_before_drain: bool,
}

impl SupplierWorld {
    /// Builds a world with no handlers, middleware or provisioning.
    pub fn new() -> Self {
        Self {
            queue: TaskQueue::new(),
            provision: Vec::new(),
            id_prefix: None,
            middleware: Vec::new(),
            select: None,
            append: None,
            load: None,
            calls: CallLog::default(),
            seen: Arc::default(),
            outcome: Arc::default(),
            replied_before_drain: false,
        }
    }

    pub fn provision(&mut self, names: &str) {
        self.provision = names.split(',').map(str::to_owned).collect();
    }

    pub fn match_ids_with_prefix(&mut self, prefix: &str) {
        self.id_prefix = Some(prefix.to_owned());
    }

    pub fn add_middleware(&mut self, label: &str, replies: bool) {
        let calls = Arc::clone(&self.calls);
        let label = label.to_owned();
        self.middleware.push(Arc::new(
            move |request: SupplierRequest, reply: Reply, next: Next| {
                record(&calls, &label);
                if replies {
                    reply.ok(Payload::Entities(Vec::new()));
                } else {
                    next.run(request, reply);
                }
            },
        ));
    }

    pub fn select_returning(&mut self, entities: Vec<Value>) {
        let calls = Arc::clone(&self.calls);
        let seen = Arc::clone(&self.seen);
        self.select = Some(Arc::new(
            move |request: &SupplierRequest, reply: EntityReply| {
                record(&calls, "select");
                *seen.lock().expect("seen lock") = Some(request.clone());
                reply.ok(entities.clone());
            },
        ));
    }

    pub fn append_echoing(&mut self) {
        let calls = Arc::clone(&self.calls);
        self.append = Some(Arc::new(
            move |request: &SupplierRequest, reply: EntityReply| {
                record(&calls, "append");
                reply.ok(request.body.clone().into_iter().collect());
            },
        ));
    }

    pub fn load_failing(&mut self) {
        let calls = Arc::clone(&self.calls);
        self.load = Some(Arc::new(move |_: LoadRequest, reply: LoadReply| {
            record(&calls, "load");
            reply.fail(BackendError::new(json!({"code": 404})));
        }));
    }

    /// Builds the supplier and submits one request.
    pub fn supply(&mut self, request: SupplierRequest) {
        let mut builder = Supplier::builder(self.queue.spawner()).provision(self.provision.clone());
        if let Some(prefix) = self.id_prefix.clone() {
            builder = builder.id_matcher(Arc::new(move |token: &str| token.starts_with(&prefix)));
        }
        for middleware in &self.middleware {
            builder = builder.middleware(Arc::clone(middleware));
        }
        if let Some(select) = &self.select {
            builder = builder.on_select(Arc::clone(select));
        }
        if let Some(append) = &self.append {
            builder = builder.on_append(Arc::clone(append));
        }
        if let Some(load) = &self.load {
            builder = builder.on_load(Arc::clone(load));
        }

        let outcome = Arc::clone(&self.outcome);
        builder.build().handle(request, move |result| {
            *outcome.lock().expect("outcome lock") = Some(result);
        });
        self.replied_before_drain = self.outcome.lock().expect("outcome lock").is_some();
        self.queue.run_pending();
    }

    /// Inspects the delivered outcome.
    pub fn with_outcome<R>(&self, inspect: impl FnOnce(&Result<Payload, SupplierError>) -> R) -> R {
        let outcome = self.outcome.lock().expect("outcome lock");
        inspect(outcome.as_ref().expect("a reply was delivered"))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn seen(&self) -> SupplierRequest {
        self.seen
            .lock()
            .expect("seen lock")
            .clone()
            .expect("the select backend was called")
    }
}

fn record(calls: &CallLog, label: &str) {
    calls.lock().expect("calls lock").push(label.to_owned());
}
