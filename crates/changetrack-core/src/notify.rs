//! Property-changed notifications.
//!
//! Every tracked object and collection owns a [`Notifier`]. Handlers run
//! synchronously, in subscription order, on the thread that made the
//! change. The handler list is snapshotted before dispatch, so a handler may
//! subscribe, unsubscribe, or write to the graph without deadlocking.
//!
//! Relaying a change up through the parents that hold the changed node is
//! not done by handlers: the wiring layer drives it from a worklist, and each
//! [`PropertyChanged`] records where the change started and how far it has
//! travelled.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::NodeId;

/// Meta-property published whenever a write may have changed the status.
pub const CHANGE_TRACKING_STATUS: &str = "ChangeTrackingStatus";

/// Meta-property published whenever a write may have changed the changed
/// property list.
pub const CHANGED_PROPERTIES: &str = "ChangedProperties";

/// Property name a tracked collection publishes for its own mutations.
pub const COLLECTION_ITEMS: &str = "Item[]";

// ---------------------------------------------------------------------------
// PropertyChanged
// ---------------------------------------------------------------------------

/// A single property-changed notification.
///
/// `origin` is the node where the underlying change happened and `source`
/// the node publishing this notification; they differ for relayed changes,
/// `hops` edges apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChanged {
    property: String,
    origin: NodeId,
    source: NodeId,
    hops: usize,
}

impl PropertyChanged {
    pub(crate) fn new(origin: NodeId, property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            origin,
            source: origin,
            hops: 0,
        }
    }

    /// The same change republished on `source`, `hops` edges above the origin.
    pub(crate) fn relayed(
        origin: NodeId,
        source: NodeId,
        hops: usize,
        property: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            origin,
            source,
            hops,
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// `ChangeTrackingStatus` or `ChangedProperties`.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.property == CHANGE_TRACKING_STATUS || self.property == CHANGED_PROPERTIES
    }

    /// Node where the underlying change happened.
    #[must_use]
    pub const fn origin(&self) -> NodeId {
        self.origin
    }

    /// Node this notification was published on.
    #[must_use]
    pub const fn source(&self) -> NodeId {
        self.source
    }

    /// Relay edges between the origin and the source.
    #[must_use]
    pub const fn hops(&self) -> usize {
        self.hops
    }

    /// Whether this notification is a relay of a change made elsewhere.
    #[must_use]
    pub const fn is_relayed(&self) -> bool {
        self.hops > 0
    }

    /// Same origin and source, different property.
    pub(crate) fn sibling(&self, property: &str) -> Self {
        Self {
            property: property.to_string(),
            ..*self
        }
    }
}

impl fmt::Display for PropertyChanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.property)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Handler invoked for every published notification.
pub type Handler = Rc<dyn Fn(&PropertyChanged)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Notifier {
    next_id: Cell<u64>,
    handlers: RefCell<Vec<(SubscriptionId, Handler)>>,
}

impl Notifier {
    pub fn subscribe(&self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    #[must_use]
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.handlers.borrow().iter().any(|(existing, _)| *existing == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    pub fn publish(&self, event: &PropertyChanged) {
        let handlers: Vec<Handler> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to one registered handler.
///
/// Dropping a `Subscription` leaves the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to detach it.
#[derive(Debug)]
pub struct Subscription {
    notifier: Weak<Notifier>,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn attach(notifier: &Rc<Notifier>, handler: Handler) -> Self {
        let id = notifier.subscribe(handler);
        Self {
            notifier: Rc::downgrade(notifier),
            id,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the handler is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|notifier| notifier.is_subscribed(self.id))
    }

    /// Detach the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|notifier| notifier.unsubscribe(self.id))
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Records every property name published on one node until dropped.
///
/// ```rust,ignore
/// let monitor = order.monitor();
/// order.set("CustomerNumber", "Test1")?;
/// assert!(monitor.raised("CustomerNumber"));
/// ```
pub struct Monitor {
    events: Rc<RefCell<Vec<PropertyChanged>>>,
    subscription: Option<Subscription>,
}

impl Monitor {
    pub(crate) fn attach(notifier: &Rc<Notifier>) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let subscription = Subscription::attach(
            notifier,
            Rc::new(move |event: &PropertyChanged| sink.borrow_mut().push(event.clone())),
        );
        Self {
            events,
            subscription: Some(subscription),
        }
    }

    /// Whether `property` was published at least once.
    #[must_use]
    pub fn raised(&self, property: &str) -> bool {
        self.count(property) > 0
    }

    #[must_use]
    pub fn count(&self, property: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.property() == property)
            .count()
    }

    /// Property names in publication order.
    #[must_use]
    pub fn properties(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|event| event.property().to_string())
            .collect()
    }

    #[must_use]
    pub fn events(&self) -> Vec<PropertyChanged> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("events", &self.properties())
            .finish()
    }
}
