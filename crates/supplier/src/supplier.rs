//! Request pipeline entry point.
//!
//! A [`Supplier`] runs each request through provisioning, the alias rewrite,
//! the middleware stack and the dispatch router, in that order. Every step
//! completes the same deferred reply, so the caller's callback always runs on
//! a later [`TaskQueue`](crate::TaskQueue) turn.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use supplier_config::{Config, ConfigError};

use crate::backends::{IntentHandler, LoadHandler, Warehouse};
use crate::errors::SupplierError;
use crate::middleware::{Middleware, MiddlewareStack};
use crate::observe::{Observers, ProvisionEvent, SupplierEvent, SupplierObserver};
use crate::provision::{Provisioner, apply_alias};
use crate::request::{SupplierAlias, SupplierRequest};
use crate::response::{Payload, Reply};
use crate::router::{DISPATCH_TARGET, DispatchRouter, Intent};
use crate::schedule::{Spawner, deferred_reply};
use crate::selector::{IdMatcher, SelectorParser, SelectorResolver};

/// Configures and builds a [`Supplier`].
///
/// Configuration is fixed once [`SupplierBuilder::build`] returns.
#[derive(Debug)]
pub struct SupplierBuilder {
    spawner: Spawner,
    provisioner: Provisioner,
    alias: Option<SupplierAlias>,
    reply_timeout: Option<Duration>,
    resolver: SelectorResolver,
    middleware: MiddlewareStack,
    warehouse: Warehouse,
    observers: Observers,
}

impl SupplierBuilder {
    /// Starts a builder whose replies are deferred through `spawner`.
    pub fn new(spawner: Spawner) -> Self {
        Self {
            spawner,
            provisioner: Provisioner::default(),
            alias: None,
            reply_timeout: None,
            resolver: SelectorResolver::default(),
            middleware: MiddlewareStack::new(),
            warehouse: Warehouse::new(),
            observers: Observers::new(),
        }
    }

    /// Sets the leading URL segment names to provision; empty is a no-op.
    #[must_use]
    pub fn provision<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provisioner.configure(names);
        self
    }

    /// Rewrites routing trails starting with `from` to start with `to`.
    #[must_use]
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.alias = Some(SupplierAlias::new(from, to));
        self
    }

    /// Fails requests that have not replied within `timeout`.
    #[must_use]
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Applies provisioning, alias and timeout settings from `config`.
    ///
    /// Settings absent from `config` keep their current values.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`Config::validate`], such as an alias
    /// with only one half set; the builder is not modified.
    pub fn configure(mut self, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        self.provisioner.configure(config.provision().iter().cloned());
        if let Some((from, to)) = config.alias() {
            self.alias = Some(SupplierAlias::new(from, to));
        }
        if let Some(timeout) = config.reply_timeout() {
            self.reply_timeout = Some(timeout);
        }
        Ok(self)
    }

    /// Replaces the predicate deciding which URL tokens are entity ids.
    #[must_use]
    pub fn id_matcher(mut self, matcher: IdMatcher) -> Self {
        self.resolver = self.resolver.with_matcher(matcher);
        self
    }

    /// Replaces the parser for non-id URL tokens.
    #[must_use]
    pub fn selector_parser(mut self, parser: Arc<dyn SelectorParser>) -> Self {
        self.resolver = self.resolver.with_parser(parser);
        self
    }

    /// Appends a middleware; registration order is execution order.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers the `select` handler.
    #[must_use]
    pub fn on_select(mut self, handler: Arc<dyn IntentHandler>) -> Self {
        self.warehouse.set(Intent::Select, handler);
        self
    }

    /// Registers the `append` handler.
    #[must_use]
    pub fn on_append(mut self, handler: Arc<dyn IntentHandler>) -> Self {
        self.warehouse.set(Intent::Append, handler);
        self
    }

    /// Registers the `save` handler.
    #[must_use]
    pub fn on_save(mut self, handler: Arc<dyn IntentHandler>) -> Self {
        self.warehouse.set(Intent::Save, handler);
        self
    }

    /// Registers the `remove` handler.
    #[must_use]
    pub fn on_remove(mut self, handler: Arc<dyn IntentHandler>) -> Self {
        self.warehouse.set(Intent::Remove, handler);
        self
    }

    /// Registers the `load` handler.
    #[must_use]
    pub fn on_load(mut self, handler: Arc<dyn LoadHandler>) -> Self {
        self.warehouse.set_load(handler);
        self
    }

    /// Subscribes an observer to provisioning and action events.
    #[must_use]
    pub fn observe(mut self, observer: Arc<dyn SupplierObserver>) -> Self {
        self.observers.subscribe(observer);
        self
    }

    /// Finishes configuration.
    pub fn build(self) -> Supplier {
        let observers = Arc::new(self.observers);
        let router = DispatchRouter::new(self.warehouse, self.resolver, Arc::clone(&observers));
        Supplier {
            inner: Arc::new(Pipeline {
                spawner: self.spawner,
                provisioner: self.provisioner,
                alias: self.alias,
                reply_timeout: self.reply_timeout,
                middleware: self.middleware,
                router,
                observers,
            }),
        }
    }
}

#[derive(Debug)]
struct Pipeline {
    spawner: Spawner,
    provisioner: Provisioner,
    alias: Option<SupplierAlias>,
    reply_timeout: Option<Duration>,
    middleware: MiddlewareStack,
    router: DispatchRouter,
    observers: Arc<Observers>,
}

/// Mounted request supplier. Cloning shares the configuration.
#[derive(Debug, Clone)]
pub struct Supplier {
    inner: Arc<Pipeline>,
}

impl Supplier {
    /// Starts a [`SupplierBuilder`].
    pub fn builder(spawner: Spawner) -> SupplierBuilder {
        SupplierBuilder::new(spawner)
    }

    /// Processes one request, delivering the outcome to `on_reply`.
    ///
    /// `on_reply` runs at most once, on a later turn of the task queue behind
    /// the builder's spawner; never before this method returns.
    pub fn handle<F>(&self, request: SupplierRequest, on_reply: F)
    where
        F: FnOnce(Result<Payload, SupplierError>) + Send + 'static,
    {
        let reply = deferred_reply(&self.inner.spawner, self.inner.reply_timeout, on_reply);
        self.process(request, reply);
    }

    /// Parses one JSON request document and processes it.
    ///
    /// Parse failures are delivered to `on_reply` like any other error.
    pub fn handle_line<F>(&self, line: &[u8], on_reply: F)
    where
        F: FnOnce(Result<Payload, SupplierError>) + Send + 'static,
    {
        let reply = deferred_reply(&self.inner.spawner, self.inner.reply_timeout, on_reply);
        match SupplierRequest::parse(line) {
            Ok(request) => self.process(request, reply),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                reply.fail(error);
            }
        }
    }

    fn process(&self, mut request: SupplierRequest, reply: Reply) {
        if let Err(error) = request.validate() {
            warn!(target: DISPATCH_TARGET, %error, "invalid request");
            reply.fail(error);
            return;
        }

        let provisioned = match self.inner.provisioner.provision(&mut request) {
            Ok(provisioned) => provisioned,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, url = %request.url, %error, "provisioning failed");
                reply.fail(error);
                return;
            }
        };
        self.inner
            .observers
            .emit(&SupplierEvent::Provisioned(ProvisionEvent {
                url: provisioned.original_url,
                route: provisioned.route,
                resource: provisioned.resource,
            }));

        if let Err(error) = apply_alias(&mut request, self.inner.alias.as_ref()) {
            warn!(target: DISPATCH_TARGET, %error, "alias rejected");
            reply.fail(error);
            return;
        }

        debug!(
            target: DISPATCH_TARGET,
            method = request.method.as_str(),
            url = %request.url,
            route = ?request.route(),
            middleware = self.inner.middleware.len(),
            "request provisioned"
        );

        let pipeline = Arc::clone(&self.inner);
        self.inner
            .middleware
            .run(request, reply, move |request, reply| {
                pipeline.router.route(request, reply);
            });
    }
}
