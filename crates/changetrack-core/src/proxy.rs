//! Interception layer: tracked views over plain objects.
//!
//! A [`Tracked`] is the "normal" capability view: the same properties as
//! the underlying [`Object`], read and written by name, with every write
//! routed through the change state machine and published to subscribers.
//! A [`Tracker`] is the "tracking" capability view of the same proxy:
//! status, changed properties, and the accept/reject checkpoints.
//!
//! # Write path
//!
//! `Tracked::set(name, value)`:
//!
//! 1. resolve `name` and type-check `value` (no state is touched on failure);
//! 2. compare with the current value; equal writes are no-ops;
//! 3. record the original value on the first write since the checkpoint;
//! 4. store the value, re-wiring the relay edge for reference slots;
//! 5. publish `name`, then `ChangeTrackingStatus`, then `ChangedProperties`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::collection::TrackedList;
use crate::error::{TrackError, TrackResult};
use crate::notify::{
    CHANGE_TRACKING_STATUS, CHANGED_PROPERTIES, Monitor, Notifier, PropertyChanged, Subscription,
};
use crate::registry::{Registry, TrackingSession};
use crate::shape::Shape;
use crate::state::{ChangeState, Lifecycle};
use crate::status::ChangeStatus;
use crate::value::{NodeId, Object, Value};
use crate::wiring::{self, Edge, Node, Upstream};

// ---------------------------------------------------------------------------
// ObjectNode
// ---------------------------------------------------------------------------

/// The proxy record for one underlying object identity.
pub(crate) struct ObjectNode {
    pub(crate) target: Object,
    pub(crate) state: RefCell<ChangeState>,
    pub(crate) edges: RefCell<HashMap<usize, Edge>>,
    /// Children detached by writes since the last checkpoint.
    pub(crate) detached: RefCell<Vec<Node>>,
    pub(crate) upstream: RefCell<Vec<Upstream>>,
    pub(crate) notifier: Rc<Notifier>,
}

impl ObjectNode {
    pub(crate) fn new(target: Object, lifecycle: Lifecycle) -> Self {
        Self {
            target,
            state: RefCell::new(ChangeState::new(lifecycle)),
            edges: RefCell::new(HashMap::new()),
            detached: RefCell::new(Vec::new()),
            upstream: RefCell::new(Vec::new()),
            notifier: Rc::new(Notifier::default()),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.target.id()
    }

    /// Publish a change of `property` here and relay it to every holder.
    pub(crate) fn notify(self: &Rc<Self>, property: &str) {
        wiring::propagate(&Node::Object(Rc::clone(self)), property);
    }

    /// Publish only the two meta-properties.
    pub(crate) fn notify_meta(&self) {
        let event = PropertyChanged::new(self.id(), CHANGE_TRACKING_STATUS);
        self.notifier.publish(&event);
        self.notifier.publish(&event.sibling(CHANGED_PROPERTIES));
    }

    pub(crate) fn take_children(&self) -> Vec<Node> {
        let mut children: Vec<Node> = std::mem::take(&mut *self.edges.borrow_mut())
            .into_values()
            .map(|edge| edge.child)
            .collect();
        children.append(&mut self.detached.borrow_mut());
        children
    }
}

impl Drop for ObjectNode {
    fn drop(&mut self) {
        wiring::release(self.take_children());
    }
}

// ---------------------------------------------------------------------------
// Tracked
// ---------------------------------------------------------------------------

/// Tracked view of an object: same properties, intercepted writes.
#[derive(Clone)]
pub struct Tracked {
    registry: Rc<Registry>,
    node: Rc<ObjectNode>,
}

impl Tracked {
    pub(crate) const fn new(registry: Rc<Registry>, node: Rc<ObjectNode>) -> Self {
        Self { registry, node }
    }

    /// The underlying object. Writes through it bypass tracking.
    #[must_use]
    pub fn target(&self) -> &Object {
        &self.node.target
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    #[must_use]
    pub fn shape(&self) -> Rc<Shape> {
        self.node.target.shape()
    }

    /// Whether both views are the same proxy.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// The session this proxy belongs to.
    #[must_use]
    pub fn session(&self) -> TrackingSession {
        TrackingSession::from_registry(Rc::clone(&self.registry))
    }

    /// Read a property.
    ///
    /// Reading a complex or collection property makes sure its child proxy
    /// is wired (once; later reads reuse it).
    ///
    /// # Errors
    ///
    /// [`TrackError::NotFound`] for undeclared names.
    pub fn get(&self, name: &str) -> TrackResult<Value> {
        let shape = self.shape();
        let slot = shape.resolve(name)?;
        if shape.property(slot).kind.is_reference() {
            wiring::ensure_child(&self.registry, &self.node, slot);
        }
        Ok(self.node.target.slot(slot))
    }

    /// Write a property through the interception layer.
    ///
    /// Returns `false` when `value` equals the current value; nothing is
    /// recorded or published in that case.
    ///
    /// # Errors
    ///
    /// - [`TrackError::NotFound`] for undeclared names.
    /// - [`TrackError::TypeMismatch`] when the property cannot hold `value`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> TrackResult<bool> {
        let value = value.into();
        let shape = self.shape();
        let slot = shape.resolve(name)?;
        shape.check(slot, &value)?;

        let old = self.node.target.slot(slot);
        if old == value {
            return Ok(false);
        }

        let first = self.node.state.borrow_mut().record_write(slot, old);
        trace!(
            shape = shape.name(),
            property = name,
            first_write = first,
            "intercepted write"
        );

        wiring::assign(&self.registry, &self.node, slot, value);
        Ok(true)
    }

    /// Tracked view of the object held by a complex property.
    ///
    /// # Errors
    ///
    /// - [`TrackError::NotFound`] for undeclared names.
    /// - [`TrackError::TypeMismatch`] if `name` is not a complex property.
    /// - [`TrackError::NotTrackable`] if complex properties are not tracked.
    pub fn object(&self, name: &str) -> TrackResult<Option<Self>> {
        let shape = self.shape();
        let slot = shape.resolve(name)?;
        let def = shape.property(slot);
        if !def.kind.is_complex() {
            return Err(reference_mismatch(&shape, slot, "complex property"));
        }
        if !self.registry.options().make_complex_properties_trackable {
            return Err(TrackError::not_trackable(format!(
                "complex property '{}.{}'",
                shape.name(),
                name
            )));
        }

        match wiring::ensure_child(&self.registry, &self.node, slot) {
            Some(Node::Object(child)) => Ok(Some(Self::new(Rc::clone(&self.registry), child))),
            _ => Ok(None),
        }
    }

    /// Tracked view of the collection held by a collection property.
    ///
    /// # Errors
    ///
    /// - [`TrackError::NotFound`] for undeclared names.
    /// - [`TrackError::TypeMismatch`] if `name` is not a collection property.
    /// - [`TrackError::NotTrackable`] if collection properties are not tracked.
    pub fn list(&self, name: &str) -> TrackResult<Option<TrackedList>> {
        let shape = self.shape();
        let slot = shape.resolve(name)?;
        let def = shape.property(slot);
        if !def.kind.is_collection() {
            return Err(reference_mismatch(&shape, slot, "collection property"));
        }
        if !self.registry.options().make_collection_properties_trackable {
            return Err(TrackError::not_trackable(format!(
                "collection property '{}.{}'",
                shape.name(),
                name
            )));
        }

        match wiring::ensure_child(&self.registry, &self.node, slot) {
            Some(Node::Collection(child)) => {
                Ok(Some(TrackedList::new(Rc::clone(&self.registry), child)))
            }
            _ => Ok(None),
        }
    }

    /// Register `handler` for every property-changed notification on this
    /// object, including relayed child changes and the meta-properties.
    pub fn subscribe(&self, handler: impl Fn(&PropertyChanged) + 'static) -> Subscription {
        Subscription::attach(&self.node.notifier, Rc::new(handler))
    }

    /// Record notifications until the returned monitor is dropped.
    #[must_use]
    pub fn monitor(&self) -> Monitor {
        Monitor::attach(&self.node.notifier)
    }

    /// The tracking capability view of this proxy.
    #[must_use]
    pub fn tracker(&self) -> Tracker {
        Tracker::new(Rc::clone(&self.registry), Rc::clone(&self.node))
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("target", &self.node.target)
            .field("status", &self.node.state.borrow().status())
            .finish()
    }
}

fn reference_mismatch(shape: &Shape, slot: usize, expected: &str) -> TrackError {
    let def = shape.property(slot);
    TrackError::TypeMismatch {
        shape: shape.name().to_string(),
        property: def.name.clone(),
        expected: expected.to_string(),
        actual: def.kind.to_string(),
    }
}

/// The tracking capability view of `view`.
#[must_use]
pub fn as_tracker(view: &Tracked) -> Tracker {
    view.tracker()
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Change-tracking capability view: status and checkpoints.
#[derive(Clone)]
pub struct Tracker {
    registry: Rc<Registry>,
    node: Rc<ObjectNode>,
}

impl Tracker {
    pub(crate) const fn new(registry: Rc<Registry>, node: Rc<ObjectNode>) -> Self {
        Self { registry, node }
    }

    /// Status including wired descendants.
    ///
    /// `Added`/`Deleted` markers win; otherwise `Changed` if this object or
    /// anything wired below it has pending changes.
    #[must_use]
    pub fn status(&self) -> ChangeStatus {
        wiring::effective_status(&self.node)
    }

    /// Whether [`status`](Self::status) is anything but `Unchanged`.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.status() != ChangeStatus::Unchanged
    }

    /// Written properties plus reference properties whose child has pending
    /// changes, in declaration order.
    #[must_use]
    pub fn changed_properties(&self) -> Vec<String> {
        wiring::changed_properties(&self.node)
    }

    /// Value of `name` as of the last checkpoint.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotFound`] for undeclared names.
    pub fn original_value(&self, name: &str) -> TrackResult<Value> {
        let slot = self.node.target.shape().resolve(name)?;
        let original = self.node.state.borrow().original(slot).cloned();
        Ok(original.unwrap_or_else(|| self.node.target.slot(slot)))
    }

    /// Detached plain copy of the object holding its checkpoint values.
    ///
    /// Reference properties point at the same underlying objects as before.
    #[must_use]
    pub fn original(&self) -> Object {
        let copy = self.node.target.shallow_copy();
        let state = self.node.state.borrow();
        for &slot in state.changed_slots() {
            if let Some(value) = state.original(slot) {
                copy.set_slot(slot, value.clone());
            }
        }
        copy
    }

    /// Commit all pending changes of this object and its wired descendants.
    pub fn accept_changes(&self) {
        let had_own = !self.node.state.borrow().changed_slots().is_empty();
        let was_changed = self.has_changes();

        wiring::accept_changes(&Node::Object(Rc::clone(&self.node)));

        if was_changed && !had_own && !self.has_changes() {
            self.node.notify_meta();
        }
    }

    /// Revert all pending changes of this object and its wired descendants.
    ///
    /// Each restored property is written back through the interception path,
    /// so subscribers see a notification per reverted property.
    pub fn reject_changes(&self) {
        let was_changed = self.has_changes();
        let had_own = !self.node.state.borrow().changed_slots().is_empty();

        wiring::reject_changes(&self.registry, &Node::Object(Rc::clone(&self.node)));

        if was_changed && !had_own {
            self.node.notify_meta();
        }
    }

    /// The normal view of the same proxy.
    #[must_use]
    pub fn view(&self) -> Tracked {
        Tracked::new(Rc::clone(&self.registry), Rc::clone(&self.node))
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("target", &self.node.target)
            .field("status", &self.status())
            .field("changed_properties", &self.changed_properties())
            .finish()
    }
}
