//! Collection adapter: intercepted Add/Remove/Clear on list-valued
//! properties.
//!
//! A tracked list publishes `Item[]` for its own mutations and for changes
//! relayed from its elements; the owning object republishes that as a change
//! of the collection property. Elements pushed through the adapter are
//! marked `Added`, removed ones `Deleted`, until the next collection-level
//! checkpoint.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{TrackError, TrackResult};
use crate::notify::{COLLECTION_ITEMS, Monitor, Notifier, PropertyChanged, Subscription};
use crate::proxy::{ObjectNode, Tracked};
use crate::registry::Registry;
use crate::shape::PropertyKind;
use crate::state::Lifecycle;
use crate::status::ChangeStatus;
use crate::value::{List, NodeId, Object, Value};
use crate::wiring::{self, Edge, Node, Upstream};

// ---------------------------------------------------------------------------
// CollectionNode
// ---------------------------------------------------------------------------

pub(crate) struct CollectionNode {
    pub(crate) target: List,
    element: PropertyKind,
    owner_shape: String,
    owner_property: String,
    pub(crate) members: RefCell<HashMap<NodeId, Edge>>,
    added: RefCell<Vec<Rc<ObjectNode>>>,
    deleted: RefCell<Vec<Rc<ObjectNode>>>,
    /// Contents as of the last checkpoint; taken on the first mutation.
    snapshot: RefCell<Option<Vec<Value>>>,
    pub(crate) upstream: RefCell<Vec<Upstream>>,
    pub(crate) notifier: Rc<Notifier>,
}

impl CollectionNode {
    pub(crate) fn new(target: List, element: PropertyKind, owner: (&str, &str)) -> Self {
        Self {
            target,
            element,
            owner_shape: owner.0.to_string(),
            owner_property: owner.1.to_string(),
            members: RefCell::new(HashMap::new()),
            added: RefCell::new(Vec::new()),
            deleted: RefCell::new(Vec::new()),
            snapshot: RefCell::new(None),
            upstream: RefCell::new(Vec::new()),
            notifier: Rc::new(Notifier::default()),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.target.id()
    }

    pub(crate) fn own_pending(&self) -> bool {
        if !self.added.borrow().is_empty() || !self.deleted.borrow().is_empty() {
            return true;
        }
        self.snapshot
            .borrow()
            .as_ref()
            .is_some_and(|snapshot| *snapshot != self.target.to_vec())
    }

    /// Publish `Item[]` here and relay it to the owning objects.
    pub(crate) fn notify(self: &Rc<Self>) {
        wiring::propagate(&Node::Collection(Rc::clone(self)), COLLECTION_ITEMS);
    }

    pub(crate) fn check_element(&self, value: &Value) -> TrackResult<()> {
        if self.element.accepts(value) {
            return Ok(());
        }
        Err(TrackError::TypeMismatch {
            shape: self.owner_shape.clone(),
            property: self.owner_property.clone(),
            expected: self.element.to_string(),
            actual: value.type_name(),
        })
    }

    /// Remember the checkpoint contents before the first mutation.
    pub(crate) fn begin_mutation(&self) {
        let mut snapshot = self.snapshot.borrow_mut();
        if snapshot.is_none() {
            *snapshot = Some(self.target.to_vec());
        }
    }

    pub(crate) fn member(&self, object: &Object) -> Option<Rc<ObjectNode>> {
        match self.members.borrow().get(&object.id()).map(|edge| edge.child.clone()) {
            Some(Node::Object(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn mark_added(&self, node: &Rc<ObjectNode>) {
        let was_deleted = {
            let mut deleted = self.deleted.borrow_mut();
            let before = deleted.len();
            deleted.retain(|existing| !Rc::ptr_eq(existing, node));
            deleted.len() != before
        };
        let lifecycle = if was_deleted {
            Lifecycle::Tracked
        } else {
            self.added.borrow_mut().push(Rc::clone(node));
            Lifecycle::Added
        };
        node.state.borrow_mut().set_lifecycle(lifecycle);
        node.notify_meta();
    }

    pub(crate) fn mark_deleted(&self, node: &Rc<ObjectNode>) {
        let was_added = {
            let mut added = self.added.borrow_mut();
            let before = added.len();
            added.retain(|existing| !Rc::ptr_eq(existing, node));
            added.len() != before
        };
        let lifecycle = if was_added {
            Lifecycle::Tracked
        } else {
            self.deleted.borrow_mut().push(Rc::clone(node));
            Lifecycle::Deleted
        };
        node.state.borrow_mut().set_lifecycle(lifecycle);
        node.notify_meta();
    }

    pub(crate) fn accept_own(&self) {
        self.snapshot.borrow_mut().take();
        let added = std::mem::take(&mut *self.added.borrow_mut());
        let deleted = std::mem::take(&mut *self.deleted.borrow_mut());
        for node in added.iter().chain(&deleted) {
            node.state.borrow_mut().set_lifecycle(Lifecycle::Tracked);
            node.notify_meta();
        }
    }

    pub(crate) fn reject_own(self: &Rc<Self>, registry: &Registry) {
        let added = std::mem::take(&mut *self.added.borrow_mut());
        let deleted = std::mem::take(&mut *self.deleted.borrow_mut());
        for node in added.iter().chain(&deleted) {
            node.state.borrow_mut().set_lifecycle(Lifecycle::Tracked);
            node.notify_meta();
        }

        let snapshot = self.snapshot.borrow_mut().take();
        if let Some(snapshot) = snapshot {
            self.target.replace(snapshot);
            wiring::sync_members(registry, self);
            self.notify();
        }
    }

    pub(crate) fn take_children(&self) -> Vec<Node> {
        let mut children: Vec<Node> = std::mem::take(&mut *self.members.borrow_mut())
            .into_values()
            .map(|edge| edge.child)
            .collect();
        children.extend(self.added.borrow_mut().drain(..).map(Node::Object));
        children.extend(self.deleted.borrow_mut().drain(..).map(Node::Object));
        children
    }
}

impl Drop for CollectionNode {
    fn drop(&mut self) {
        wiring::release(self.take_children());
    }
}

// ---------------------------------------------------------------------------
// TrackedList
// ---------------------------------------------------------------------------

/// Tracked view of a collection-valued property.
#[derive(Clone)]
pub struct TrackedList {
    registry: Rc<Registry>,
    node: Rc<CollectionNode>,
}

impl TrackedList {
    pub(crate) const fn new(registry: Rc<Registry>, node: Rc<CollectionNode>) -> Self {
        Self { registry, node }
    }

    /// The underlying list. Mutations through it bypass tracking.
    #[must_use]
    pub fn target(&self) -> &List {
        &self.node.target
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.node.target.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node.target.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.node.target.get(index)
    }

    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.node.target.to_vec()
    }

    /// Tracked view of the element at `index`; `None` for a null element.
    ///
    /// # Errors
    ///
    /// - [`TrackError::IndexOutOfBounds`] past the end of the list.
    /// - [`TrackError::TypeMismatch`] if the element is a scalar.
    pub fn object(&self, index: usize) -> TrackResult<Option<Tracked>> {
        let len = self.len();
        let value = self
            .node
            .target
            .get(index)
            .ok_or(TrackError::IndexOutOfBounds { index, len })?;
        match value {
            Value::Null => Ok(None),
            Value::Object(object) => Ok(self.member_view(&object)),
            other => Err(TrackError::TypeMismatch {
                shape: self.node.owner_shape.clone(),
                property: self.node.owner_property.clone(),
                expected: "object element".to_string(),
                actual: other.type_name(),
            }),
        }
    }

    /// Tracked views of the distinct object elements, in list order.
    #[must_use]
    pub fn objects(&self) -> Vec<Tracked> {
        self.node
            .target
            .distinct_objects()
            .iter()
            .filter_map(|object| self.member_view(object))
            .collect()
    }

    /// Append `value`, marking a new object element `Added`.
    ///
    /// # Errors
    ///
    /// [`TrackError::TypeMismatch`] if the collection cannot hold `value`.
    pub fn push(&self, value: impl Into<Value>) -> TrackResult<()> {
        self.insert(self.len(), value)
    }

    /// Insert `value` at `index`.
    ///
    /// # Errors
    ///
    /// - [`TrackError::TypeMismatch`] if the collection cannot hold `value`.
    /// - [`TrackError::IndexOutOfBounds`] if `index > len`.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> TrackResult<()> {
        let value = value.into();
        self.node.check_element(&value)?;
        let len = self.len();
        if index > len {
            return Err(TrackError::IndexOutOfBounds { index, len });
        }

        let newcomer = match &value {
            Value::Object(object) if !self.node.target.contains_object(object) => {
                Some(object.clone())
            }
            _ => None,
        };

        self.node.begin_mutation();
        self.node.target.insert(index, value);
        wiring::sync_members(&self.registry, &self.node);
        if let Some(member) = newcomer.and_then(|object| self.node.member(&object)) {
            self.node.mark_added(&member);
        }

        trace!(collection = %self.node.id(), index, "intercepted insert");
        self.node.notify();
        Ok(())
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`TrackError::IndexOutOfBounds`] past the end of the list.
    pub fn remove_at(&self, index: usize) -> TrackResult<Value> {
        let len = self.len();
        if index >= len {
            return Err(TrackError::IndexOutOfBounds { index, len });
        }

        let leaving = match self.node.target.get(index) {
            Some(Value::Object(object)) => self.node.member(&object).map(|node| (object, node)),
            _ => None,
        };

        self.node.begin_mutation();
        let removed = self
            .node
            .target
            .remove(index)
            .ok_or(TrackError::IndexOutOfBounds { index, len })?;
        wiring::sync_members(&self.registry, &self.node);
        let gone = leaving.filter(|(object, _)| !self.node.target.contains_object(object));
        if let Some((_, node)) = gone {
            self.node.mark_deleted(&node);
        }

        trace!(collection = %self.node.id(), index, "intercepted remove");
        self.node.notify();
        Ok(removed)
    }

    /// Remove the first occurrence of `object`. Returns whether it was found.
    pub fn remove(&self, object: &Object) -> bool {
        let position = self
            .node
            .target
            .to_vec()
            .iter()
            .position(|value| value.as_object().is_some_and(|o| o.ptr_eq(object)));
        position.is_some_and(|index| self.remove_at(index).is_ok())
    }

    /// Remove every element. Publishes nothing when already empty.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }

        let leaving: Vec<Rc<ObjectNode>> = self
            .node
            .target
            .distinct_objects()
            .iter()
            .filter_map(|object| self.node.member(object))
            .collect();

        self.node.begin_mutation();
        self.node.target.replace(Vec::new());
        wiring::sync_members(&self.registry, &self.node);
        for node in &leaving {
            self.node.mark_deleted(node);
        }

        debug!(collection = %self.node.id(), removed = leaving.len(), "intercepted clear");
        self.node.notify();
    }

    /// Put a removed element back at the end of the list.
    ///
    /// Returns `false` if `object` is not among the deleted items.
    pub fn undelete(&self, object: &Object) -> bool {
        let is_deleted = self
            .node
            .deleted
            .borrow()
            .iter()
            .any(|node| node.target.ptr_eq(object));
        if !is_deleted {
            return false;
        }
        self.push(object).is_ok()
    }

    /// `Changed` if the contents or any element has pending changes.
    #[must_use]
    pub fn status(&self) -> ChangeStatus {
        if wiring::reaches_pending(&Node::Collection(Rc::clone(&self.node)), None) {
            ChangeStatus::Changed
        } else {
            ChangeStatus::Unchanged
        }
    }

    /// Elements added since the last checkpoint.
    #[must_use]
    pub fn added_items(&self) -> Vec<Tracked> {
        self.views(&self.node.added.borrow())
    }

    /// Elements removed since the last checkpoint.
    #[must_use]
    pub fn deleted_items(&self) -> Vec<Tracked> {
        self.views(&self.node.deleted.borrow())
    }

    /// Elements that were present at the checkpoint and have pending changes.
    #[must_use]
    pub fn changed_items(&self) -> Vec<Tracked> {
        self.objects()
            .into_iter()
            .filter(|item| item.tracker().status() == ChangeStatus::Changed)
            .collect()
    }

    #[must_use]
    pub fn unchanged_items(&self) -> Vec<Tracked> {
        self.objects()
            .into_iter()
            .filter(|item| item.tracker().status() == ChangeStatus::Unchanged)
            .collect()
    }

    /// Confirm the current membership and every element's pending writes.
    pub fn accept_changes(&self) {
        wiring::accept_changes(&Node::Collection(Rc::clone(&self.node)));
    }

    /// Restore the checkpoint membership and revert every element.
    pub fn reject_changes(&self) {
        wiring::reject_changes(&self.registry, &Node::Collection(Rc::clone(&self.node)));
    }

    pub fn subscribe(&self, handler: impl Fn(&PropertyChanged) + 'static) -> Subscription {
        Subscription::attach(&self.node.notifier, Rc::new(handler))
    }

    #[must_use]
    pub fn monitor(&self) -> Monitor {
        Monitor::attach(&self.node.notifier)
    }

    fn member_view(&self, object: &Object) -> Option<Tracked> {
        let node = self.node.member(object).or_else(|| {
            wiring::sync_members(&self.registry, &self.node);
            self.node.member(object)
        })?;
        Some(Tracked::new(Rc::clone(&self.registry), node))
    }

    fn views(&self, nodes: &[Rc<ObjectNode>]) -> Vec<Tracked> {
        nodes
            .iter()
            .map(|node| Tracked::new(Rc::clone(&self.registry), Rc::clone(node)))
            .collect()
    }
}

impl fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedList")
            .field("owner", &format!("{}.{}", self.node.owner_shape, self.node.owner_property))
            .field("len", &self.len())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::options::TrackOptions;
    use crate::registry::wrap;
    use crate::shape::Shape;

    fn basket() -> (Object, Rc<Shape>) {
        let item = Shape::builder("Item").text("Sku").build().expect("item shape");
        let basket = Shape::builder("Basket")
            .collection("Items", "Item")
            .property("Tags", PropertyKind::collection_of(PropertyKind::Text))
            .build()
            .expect("basket shape");

        let items = List::from_values(vec![
            Object::new(&item).with("Sku", "a").expect("sku").into(),
            Object::new(&item).with("Sku", "b").expect("sku").into(),
        ]);
        let object = Object::new(&basket)
            .with("Items", items)
            .and_then(|o| o.with("Tags", List::new()))
            .expect("basket");
        (object, item)
    }

    fn items(root: &Tracked) -> TrackedList {
        root.list("Items").expect("collection").expect("non-null")
    }

    #[test]
    fn push_marks_added_and_publishes_items() {
        let (object, item) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let monitor = list.monitor();

        let fresh = Object::new(&item);
        list.push(&fresh).expect("push");

        assert_eq!(list.len(), 3);
        assert!(monitor.raised(COLLECTION_ITEMS));
        let added = list.added_items();
        assert_eq!(added.len(), 1);
        assert!(added[0].target().ptr_eq(&fresh));
        assert_eq!(added[0].tracker().status(), ChangeStatus::Added);
        assert_eq!(list.status(), ChangeStatus::Changed);
    }

    #[test]
    fn remove_marks_deleted_and_stops_relaying() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let first = list.object(0).expect("in range").expect("object");

        let removed = list.remove_at(0).expect("remove");
        assert!(removed.as_object().is_some_and(|o| o.ptr_eq(first.target())));
        assert_eq!(first.tracker().status(), ChangeStatus::Deleted);
        assert_eq!(list.deleted_items().len(), 1);

        let monitor = root.monitor();
        first.set("Sku", "zzz").expect("write detached element");
        assert!(!monitor.raised("Items"));
    }

    #[test]
    fn push_then_remove_cancels_out() {
        let (object, item) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);

        let fresh = Object::new(&item);
        list.push(&fresh).expect("push");
        assert!(list.remove(&fresh));

        assert!(list.added_items().is_empty());
        assert!(list.deleted_items().is_empty());
        assert_eq!(list.status(), ChangeStatus::Unchanged);
    }

    #[test]
    fn reject_restores_membership() {
        let (object, item) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let before = list.items();

        list.push(Object::new(&item)).expect("push");
        list.remove_at(0).expect("remove");
        list.reject_changes();

        assert_eq!(list.items(), before);
        assert!(list.added_items().is_empty());
        assert!(list.deleted_items().is_empty());
        assert_eq!(list.status(), ChangeStatus::Unchanged);
        assert!(list.objects().iter().all(|o| o.tracker().status() == ChangeStatus::Unchanged));
    }

    #[test]
    fn accept_confirms_membership() {
        let (object, item) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);

        let fresh = Object::new(&item);
        list.push(&fresh).expect("push");
        let gone = list.object(0).expect("in range").expect("object");
        list.remove_at(0).expect("remove");
        list.accept_changes();

        assert_eq!(list.status(), ChangeStatus::Unchanged);
        assert_eq!(list.len(), 2);
        assert_eq!(gone.tracker().status(), ChangeStatus::Unchanged);
        assert_eq!(list.unchanged_items().len(), 2);
        assert_eq!(root.tracker().status(), ChangeStatus::Unchanged);
    }

    #[test]
    fn element_writes_show_up_as_changed_items() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);

        list.object(1)
            .expect("in range")
            .expect("object")
            .set("Sku", "B")
            .expect("write");

        let changed = list.changed_items();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].get("Sku"), Ok(Value::from("B")));
        assert_eq!(list.unchanged_items().len(), 1);
        assert_eq!(root.tracker().changed_properties(), vec!["Items".to_string()]);
    }

    #[test]
    fn undelete_puts_element_back() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let first = list.object(0).expect("in range").expect("object");

        list.remove_at(0).expect("remove");
        assert!(list.undelete(first.target()));
        assert!(!list.undelete(first.target()));

        assert_eq!(first.tracker().status(), ChangeStatus::Unchanged);
        assert!(list.deleted_items().is_empty());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn clear_deletes_every_element() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let views = list.objects();

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.deleted_items().len(), 2);
        assert!(views.iter().all(|v| v.tracker().status() == ChangeStatus::Deleted));

        let monitor = list.monitor();
        list.clear();
        assert!(monitor.events().is_empty());
    }

    #[test]
    fn wrong_element_type_is_rejected() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);
        let monitor = list.monitor();

        let err = list.push(5).expect_err("int in object list");
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        assert_eq!(list.len(), 2);
        assert!(monitor.events().is_empty());
        assert_eq!(list.status(), ChangeStatus::Unchanged);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let list = items(&root);

        assert_eq!(
            list.remove_at(9),
            Err(TrackError::IndexOutOfBounds { index: 9, len: 2 })
        );
        assert!(list.object(2).is_err());
        assert!(list.insert(3, Value::Null).is_err());
    }

    #[test]
    fn scalar_collections_track_membership() {
        let (object, _) = basket();
        let root = wrap(&object, TrackOptions::default());
        let tags = root.list("Tags").expect("collection").expect("non-null");
        let monitor = root.monitor();

        tags.push("fragile").expect("push");
        assert!(monitor.raised("Tags"));
        assert_eq!(tags.status(), ChangeStatus::Changed);

        tags.reject_changes();
        assert!(tags.is_empty());
        assert_eq!(root.tracker().status(), ChangeStatus::Unchanged);
    }
}
