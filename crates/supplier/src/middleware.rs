//! Ordered request interceptors run between provisioning and dispatch.
//!
//! Each middleware owns the request and the reply while it runs. It either
//! hands both to [`Next::run`] to continue the chain, or completes the reply
//! itself, which skips the remaining middleware and dispatch. A middleware
//! that does neither stalls the request; only a configured reply timeout
//! rescues it.

use std::fmt;
use std::sync::Arc;

use crate::request::SupplierRequest;
use crate::response::Reply;

/// Request interceptor.
pub trait Middleware: Send + Sync {
    /// Inspects or rewrites the request, then continues or replies.
    fn handle(&self, request: SupplierRequest, reply: Reply, next: Next);
}

impl<F> Middleware for F
where
    F: Fn(SupplierRequest, Reply, Next) + Send + Sync,
{
    fn handle(&self, request: SupplierRequest, reply: Reply, next: Next) {
        self(request, reply, next);
    }
}

type Completion = Box<dyn FnOnce(SupplierRequest, Reply) + Send>;

/// Continuation into the rest of the chain.
pub struct Next {
    layers: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    complete: Completion,
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("layers", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl Next {
    /// Runs the next middleware, or the completion after the last one.
    pub fn run(self, request: SupplierRequest, reply: Reply) {
        let Self {
            layers,
            index,
            complete,
        } = self;
        match layers.get(index).cloned() {
            Some(layer) => {
                let next = Self {
                    layers,
                    index: index + 1,
                    complete,
                };
                layer.handle(request, reply, next);
            }
            None => complete(request, reply),
        }
    }
}

/// Middleware in registration order.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl MiddlewareStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; registration order is execution order.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns whether no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs the chain, calling `complete` once every middleware continued.
    pub fn run<F>(&self, request: SupplierRequest, reply: Reply, complete: F)
    where
        F: FnOnce(SupplierRequest, Reply) + Send + 'static,
    {
        let next = Next {
            layers: self.layers.iter().cloned().collect(),
            index: 0,
            complete: Box::new(complete),
        };
        next.run(request, reply);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::request::Method;
    use crate::response::{Payload, Reply};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, label: &'static str) -> Arc<dyn Middleware> {
        let log = Arc::clone(log);
        Arc::new(move |request: SupplierRequest, reply: Reply, next: Next| {
            log.lock().expect("log").push(String::from(label));
            next.run(request, reply);
        })
    }

    fn capture(log: &Log) -> Reply {
        let log = Arc::clone(log);
        Reply::new(move |result| {
            let label = match result {
                Ok(payload) => format!("reply {}", payload.body().len()),
                Err(error) => format!("error {error}"),
            };
            log.lock().expect("log").push(label);
        })
    }

    #[test]
    fn runs_in_registration_order_then_completes() {
        let log: Log = Arc::default();
        let mut stack = MiddlewareStack::new();
        stack.push(recording(&log, "first"));
        stack.push(recording(&log, "second"));
        stack.push(recording(&log, "third"));
        assert_eq!(stack.len(), 3);

        let done = Arc::clone(&log);
        stack.run(
            SupplierRequest::new(Method::Get, "/"),
            capture(&log),
            move |_, reply| {
                done.lock().expect("log").push(String::from("dispatch"));
                reply.ok(Payload::Entities(Vec::new()));
            },
        );

        assert_eq!(
            *log.lock().expect("log"),
            ["first", "second", "third", "dispatch", "reply 0"]
        );
    }

    #[test]
    fn replying_short_circuits_the_chain() {
        let log: Log = Arc::default();
        let mut stack = MiddlewareStack::new();
        stack.push(recording(&log, "first"));
        stack.push(Arc::new(|_: SupplierRequest, reply: Reply, _: Next| {
            reply.ok(Payload::Entities(vec![json!({"cached": true})]));
        }));
        stack.push(recording(&log, "never"));

        let done = Arc::clone(&log);
        stack.run(
            SupplierRequest::new(Method::Get, "/"),
            capture(&log),
            move |_, _| done.lock().expect("log").push(String::from("dispatch")),
        );

        assert_eq!(*log.lock().expect("log"), ["first", "reply 1"]);
    }

    #[test]
    fn middleware_may_rewrite_the_request() {
        let mut stack = MiddlewareStack::new();
        stack.push(Arc::new(
            |mut request: SupplierRequest, reply: Reply, next: Next| {
                request.url = String::from("/rewritten");
                next.run(request, reply);
            },
        ));

        let seen: Arc<Mutex<Option<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        stack.run(
            SupplierRequest::new(Method::Get, "/"),
            Reply::new(|_| {}),
            move |request, _| *sink.lock().expect("sink") = Some(request.url),
        );
        assert_eq!(seen.lock().expect("seen").as_deref(), Some("/rewritten"));
    }

    #[test]
    fn empty_stack_completes_immediately() {
        let stack = MiddlewareStack::new();
        assert!(stack.is_empty());
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        stack.run(
            SupplierRequest::new(Method::Get, "/"),
            Reply::new(|_| {}),
            move |_, _| *flag.lock().expect("flag") = true,
        );
        assert!(*ran.lock().expect("ran"));
    }
}
