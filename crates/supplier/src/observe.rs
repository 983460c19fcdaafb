//! Fire-and-forget notifications about supplied requests.

use std::fmt;
use std::sync::Arc;

use crate::request::{Resource, SupplierRequest};
use crate::response::Entity;
use crate::router::Intent;

/// Tracing target for supplier notifications.
const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");

/// Provisioning outcome for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionEvent {
    /// URL before provisioning.
    pub url: String,
    /// Routing trail after provisioning.
    pub route: Option<String>,
    /// Resource descriptor built from the consumed segments.
    pub resource: Resource,
}

/// Result summary carried by an [`ActionEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Stamped entities returned by `select` or `append`.
    Results(Vec<Entity>),
    /// Number of entities touched by `save` or `remove`.
    Count(usize),
}

/// Completed intent.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    /// Intent that completed.
    pub intent: Intent,
    /// Request as handed to the backend.
    pub request: Arc<SupplierRequest>,
    /// What the backend produced.
    pub outcome: ActionOutcome,
}

/// Notification emitted by a supplier.
#[derive(Debug, Clone)]
pub enum SupplierEvent {
    /// A request's URL was provisioned.
    Provisioned(ProvisionEvent),
    /// An intent completed without error.
    Action(ActionEvent),
}

/// Observer notified of supplier events.
///
/// Observers run inline on the dispatching thread and must not block.
pub trait SupplierObserver: Send + Sync {
    /// Receives one event.
    fn notify(&self, event: &SupplierEvent);
}

impl<F> SupplierObserver for F
where
    F: Fn(&SupplierEvent) + Send + Sync,
{
    fn notify(&self, event: &SupplierEvent) {
        self(event);
    }
}

/// Registered observers.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn SupplierObserver>>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.observers.len())
            .finish()
    }
}

impl Observers {
    /// Creates an empty observer list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer; observers are notified in subscription order.
    pub fn subscribe(&mut self, observer: Arc<dyn SupplierObserver>) {
        self.observers.push(observer);
    }

    /// Returns whether nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notifies every observer.
    pub fn emit(&self, event: &SupplierEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

/// Observer that records events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredObserver;

impl StructuredObserver {
    /// Builds a new observer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SupplierObserver for StructuredObserver {
    fn notify(&self, event: &SupplierEvent) {
        match event {
            SupplierEvent::Provisioned(provisioned) => {
                tracing::debug!(
                    target: EVENTS_TARGET,
                    event = "provisioned",
                    url = %provisioned.url,
                    route = ?provisioned.route,
                    resource = ?provisioned.resource,
                    "request provisioned"
                );
            }
            SupplierEvent::Action(action) => {
                let (results, count) = match &action.outcome {
                    ActionOutcome::Results(entities) => (Some(entities.len()), None),
                    ActionOutcome::Count(count) => (None, Some(*count)),
                };
                tracing::info!(
                    target: EVENTS_TARGET,
                    event = "action",
                    intent = %action.intent,
                    url = %action.request.url,
                    route = ?action.request.route(),
                    results = ?results,
                    count = ?count,
                    "intent completed"
                );
            }
        }
    }
}
