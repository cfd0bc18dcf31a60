//! Graph wiring: making an object graph trackable and relaying changes.
//!
//! # Overview
//!
//! Wrapping a root object walks everything reachable through complex and
//! collection properties, creating one tracked node per underlying identity
//! and one relay edge per parent slot (or collection membership). An edge
//! owns its child and leaves a weak back-reference ([`Upstream`]) on it, so
//! a change on the child can be republished as a change of the parent
//! property holding it.
//!
//! # Design
//!
//! - **Register before descending**: a node is inserted into the registry
//!   before any of its properties are visited, so a property that points
//!   back at an in-progress object resolves to the existing node. Revisiting
//!   an identity is the normal cycle-guard path, not an error.
//! - **Worklists, not recursion**: wiring, relaying, queries, checkpoints and
//!   teardown keep pending nodes on an explicit queue or stack, so graph
//!   depth never translates into call-stack depth.
//! - **One visit per cascade**: [`propagate`] publishes on the origin, then
//!   walks the back-references breadth first with a single visited set. A
//!   parent publishes only after its child has, and never twice for one
//!   change, however the graph cycles.
//! - **Explicit edge lifetime**: overwriting a slot or removing an element
//!   detaches the old edge before the new one is attached. A detached child
//!   never notifies its former parent again. A child detached by a tracked
//!   write stays owned by its former parent until the next checkpoint, so
//!   reject can still revert it.
//! - **O(V+E)**: every walk here visits each node and edge at most once.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::collection::CollectionNode;
use crate::notify::{
    CHANGE_TRACKING_STATUS, CHANGED_PROPERTIES, COLLECTION_ITEMS, Notifier, PropertyChanged,
};
use crate::proxy::ObjectNode;
use crate::registry::Registry;
use crate::shape::PropertyKind;
use crate::state::Lifecycle;
use crate::status::ChangeStatus;
use crate::value::{List, NodeId, Object, Value};

// ---------------------------------------------------------------------------
// Node and Edge
// ---------------------------------------------------------------------------

/// A tracked node of either flavor.
#[derive(Clone)]
pub enum Node {
    Object(Rc<ObjectNode>),
    Collection(Rc<CollectionNode>),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Object(node) => node.id(),
            Self::Collection(node) => node.id(),
        }
    }

    pub fn notifier(&self) -> &Rc<Notifier> {
        match self {
            Self::Object(node) => &node.notifier,
            Self::Collection(node) => &node.notifier,
        }
    }

    fn upstream(&self) -> &RefCell<Vec<Upstream>> {
        match self {
            Self::Object(node) => &node.upstream,
            Self::Collection(node) => &node.upstream,
        }
    }

    pub fn downgrade(&self) -> WeakNode {
        match self {
            Self::Object(node) => WeakNode::Object(Rc::downgrade(node)),
            Self::Collection(node) => WeakNode::Collection(Rc::downgrade(node)),
        }
    }

    /// Children this node owns: wired edges, plus objects detached by
    /// writes since the last checkpoint.
    pub fn children(&self) -> Vec<Self> {
        match self {
            Self::Object(node) => {
                let mut children: Vec<Self> = node
                    .edges
                    .borrow()
                    .values()
                    .map(|edge| edge.child.clone())
                    .collect();
                children.extend(node.detached.borrow().iter().cloned());
                children
            }
            Self::Collection(node) => node
                .members
                .borrow()
                .values()
                .map(|edge| edge.child.clone())
                .collect(),
        }
    }

    /// Live parents holding this node, with the property each holds it by.
    fn parents(&self) -> Vec<(Self, String)> {
        let mut upstream = self.upstream().borrow_mut();
        upstream.retain(|up| up.parent.is_live());
        upstream
            .iter()
            .filter_map(|up| up.parent.upgrade().map(|parent| (parent, up.property.clone())))
            .collect()
    }

    /// Publish `properties` here, then both meta-properties once.
    fn publish_change(&self, origin: NodeId, hops: usize, properties: &[String]) {
        let notifier = Rc::clone(self.notifier());
        let mut last = None;
        for property in properties {
            let event = PropertyChanged::relayed(origin, self.id(), hops, property.as_str());
            notifier.publish(&event);
            last = Some(event);
        }
        if let Some(event) = last {
            notifier.publish(&event.sibling(CHANGE_TRACKING_STATUS));
            notifier.publish(&event.sibling(CHANGED_PROPERTIES));
        }
    }

    /// This node's own state has something to accept or reject.
    pub fn own_pending(&self) -> bool {
        match self {
            Self::Object(node) => node.state.borrow().has_pending(),
            Self::Collection(node) => node.own_pending(),
        }
    }

    fn accept_own(&self) {
        match self {
            Self::Object(node) => {
                let had_writes = node.state.borrow_mut().accept();
                if had_writes {
                    node.notify_meta();
                }
            }
            Self::Collection(node) => node.accept_own(),
        }
    }

    fn reject_own(&self, registry: &Registry) {
        match self {
            Self::Object(node) => {
                let originals = node.state.borrow_mut().take_originals();
                for (slot, value) in originals {
                    assign(registry, node, slot, value);
                }
            }
            Self::Collection(node) => node.reject_own(registry),
        }
    }

    /// Let go of objects kept alive only for the checkpoint just taken.
    fn release_detached(&self) -> Vec<Self> {
        match self {
            Self::Object(node) => std::mem::take(&mut *node.detached.borrow_mut()),
            Self::Collection(_) => Vec::new(),
        }
    }

    /// Remove and return every node this one owns.
    pub fn take_children(&self) -> Vec<Self> {
        match self {
            Self::Object(node) => node.take_children(),
            Self::Collection(node) => node.take_children(),
        }
    }

    fn is_unique(&self) -> bool {
        match self {
            Self::Object(node) => Rc::strong_count(node) == 1,
            Self::Collection(node) => Rc::strong_count(node) == 1,
        }
    }
}

/// Non-owning handle to a [`Node`].
#[derive(Clone)]
pub enum WeakNode {
    Object(Weak<ObjectNode>),
    Collection(Weak<CollectionNode>),
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        match self {
            Self::Object(node) => node.upgrade().map(Node::Object),
            Self::Collection(node) => node.upgrade().map(Node::Collection),
        }
    }

    pub fn is_live(&self) -> bool {
        match self {
            Self::Object(node) => node.strong_count() > 0,
            Self::Collection(node) => node.strong_count() > 0,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Back-reference from a child to one parent slot holding it.
pub struct Upstream {
    parent: WeakNode,
    property: String,
}

/// A relay edge from a parent to one child.
///
/// The edge owns the child; the child's matching [`Upstream`] entry is
/// removed again by [`detach`](Self::detach).
pub struct Edge {
    pub child: Node,
    parent: WeakNode,
    property: String,
}

impl Edge {
    fn attach(parent: WeakNode, property: &str, child: Node) -> Self {
        child.upstream().borrow_mut().push(Upstream {
            parent: parent.clone(),
            property: property.to_string(),
        });
        Self {
            child,
            parent,
            property: property.to_string(),
        }
    }

    /// Stop relaying from the child and hand it back.
    pub fn detach(self) -> Node {
        trace!(child = %self.child.id(), property = %self.property, "detaching relay edge");
        {
            let mut upstream = self.child.upstream().borrow_mut();
            if let Some(index) = upstream
                .iter()
                .position(|up| up.parent.ptr_eq(&self.parent) && up.property == self.property)
            {
                upstream.remove(index);
            }
        }
        self.child
    }
}

/// Drop `nodes` without recursing through what they own.
///
/// A node whose last owner is this worklist hands its children over before
/// it goes, so dropping it never reaches further than one level.
pub fn release(mut nodes: Vec<Node>) {
    while let Some(node) = nodes.pop() {
        if node.is_unique() {
            nodes.extend(node.take_children());
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring walk
// ---------------------------------------------------------------------------

struct Walk<'a> {
    registry: &'a Registry,
    pending: Vec<Rc<ObjectNode>>,
}

impl<'a> Walk<'a> {
    const fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            pending: Vec::new(),
        }
    }

    /// Existing node for `target`, or a freshly registered one queued for
    /// property wiring.
    fn object(&mut self, target: &Object, lifecycle: Lifecycle) -> Rc<ObjectNode> {
        if let Some(existing) = self.registry.object(target.id()) {
            trace!(id = %target.id(), "identity already wrapped; reusing proxy");
            return existing;
        }

        let node = Rc::new(ObjectNode::new(target.clone(), lifecycle));
        self.registry.register(&Node::Object(Rc::clone(&node)));
        self.pending.push(Rc::clone(&node));
        node
    }

    fn collection(
        &mut self,
        list: &List,
        element: &PropertyKind,
        owner: (&str, &str),
    ) -> Rc<CollectionNode> {
        if let Some(existing) = self.registry.collection(list.id()) {
            trace!(id = %list.id(), "collection already wrapped; reusing adapter");
            return existing;
        }

        let node = Rc::new(CollectionNode::new(list.clone(), element.clone(), owner));
        self.registry.register(&Node::Collection(Rc::clone(&node)));
        self.sync_members(&node);
        node
    }

    fn run(&mut self) {
        while let Some(node) = self.pending.pop() {
            let shape = node.target.shape();
            for (slot, def) in shape.properties().iter().enumerate() {
                if def.kind.is_reference() {
                    self.wire_slot(&node, slot);
                }
            }
        }
    }

    fn wire_slot(&mut self, node: &Rc<ObjectNode>, slot: usize) {
        let options = self.registry.options();
        let shape = node.target.shape();
        let def = shape.property(slot);

        let child = match (&def.kind, node.target.slot(slot)) {
            (PropertyKind::Complex(_), Value::Object(object))
                if options.make_complex_properties_trackable =>
            {
                Node::Object(self.object(&object, Lifecycle::Tracked))
            }
            (PropertyKind::Collection(element), Value::List(list))
                if options.make_collection_properties_trackable =>
            {
                Node::Collection(self.collection(&list, element, (shape.name(), def.name.as_str())))
            }
            _ => return,
        };

        attach_property(node, slot, &def.name, child);
    }

    fn sync_members(&mut self, collection: &Rc<CollectionNode>) {
        let present = collection.target.distinct_objects();
        let present_ids: HashSet<NodeId> = present.iter().map(Object::id).collect();

        let gone: Vec<Edge> = {
            let mut members = collection.members.borrow_mut();
            let stale: Vec<NodeId> = members
                .keys()
                .filter(|id| !present_ids.contains(id))
                .copied()
                .collect();
            stale.iter().filter_map(|id| members.remove(id)).collect()
        };
        release(gone.into_iter().map(Edge::detach).collect());

        for object in present {
            if collection.members.borrow().contains_key(&object.id()) {
                continue;
            }
            let child = self.object(&object, Lifecycle::Tracked);
            let edge = Edge::attach(
                WeakNode::Collection(Rc::downgrade(collection)),
                COLLECTION_ITEMS,
                Node::Object(child),
            );
            collection.members.borrow_mut().insert(object.id(), edge);
        }
    }
}

fn attach_property(parent: &Rc<ObjectNode>, slot: usize, property: &str, child: Node) {
    let edge = Edge::attach(WeakNode::Object(Rc::downgrade(parent)), property, child);
    let previous = parent.edges.borrow_mut().insert(slot, edge);
    if let Some(previous) = previous {
        release(vec![previous.detach()]);
    }
}

fn detach_property(parent: &ObjectNode, slot: usize) -> Option<Node> {
    let edge = parent.edges.borrow_mut().remove(&slot);
    edge.map(Edge::detach)
}

/// Wrap `target` and everything reachable from it.
pub fn make_trackable(registry: &Registry, target: &Object, lifecycle: Lifecycle) -> Rc<ObjectNode> {
    let mut walk = Walk::new(registry);
    let root = walk.object(target, lifecycle);
    walk.run();
    root
}

/// Re-derive the edge for `slot` from the value it currently holds.
///
/// Returns the child the slot was wired to before, if it changed.
pub fn rewire_slot(registry: &Registry, node: &Rc<ObjectNode>, slot: usize) -> Option<Node> {
    let previous = detach_property(node, slot);
    let mut walk = Walk::new(registry);
    walk.wire_slot(node, slot);
    walk.run();

    let current = node.edges.borrow().get(&slot).map(|edge| edge.child.id());
    previous.filter(|child| Some(child.id()) != current)
}

/// Bring a collection's member edges in line with its current elements.
pub fn sync_members(registry: &Registry, collection: &Rc<CollectionNode>) {
    let mut walk = Walk::new(registry);
    walk.sync_members(collection);
    walk.run();
}

/// Wired child for `slot`, re-wiring first if the slot no longer holds the
/// value the edge was created for.
pub fn ensure_child(registry: &Registry, node: &Rc<ObjectNode>, slot: usize) -> Option<Node> {
    let current = match node.target.slot(slot) {
        Value::Object(object) => Some(object.id()),
        Value::List(list) => Some(list.id()),
        _ => None,
    };
    let wired = node.edges.borrow().get(&slot).map(|edge| edge.child.id());
    if wired != current {
        let previous = rewire_slot(registry, node, slot);
        release(previous.into_iter().collect());
    }
    node.edges.borrow().get(&slot).map(|edge| edge.child.clone())
}

/// Store `value` in `slot`, rewire reference slots, and publish.
///
/// Callers have already validated the value and updated the change state.
/// A child detached here is kept by `node` until the next checkpoint.
pub fn assign(registry: &Registry, node: &Rc<ObjectNode>, slot: usize, value: Value) {
    let shape = node.target.shape();
    let def = shape.property(slot);

    node.target.set_slot(slot, value);
    let previous = if def.kind.is_reference() {
        rewire_slot(registry, node, slot)
    } else {
        None
    };
    node.detached.borrow_mut().extend(previous);
    node.notify(&def.name);
}

// ---------------------------------------------------------------------------
// Relay cascade
// ---------------------------------------------------------------------------

/// Publish `property` on `origin`, then relay it up through every node
/// holding it.
///
/// Each parent republishes the change as the property it holds the child
/// by (collections as `Item[]`), followed by its meta-properties, and only
/// after the child has published. The cascade shares one visited set, so a
/// node publishes at most once per change; when a parent holds the child in
/// several slots, each of those properties is published in that one visit.
pub fn propagate(origin: &Node, property: &str) {
    let origin_id = origin.id();
    let mut visited = HashSet::from([origin_id]);
    let mut queue = VecDeque::from([(origin.clone(), vec![property.to_string()], 0usize)]);
    let mut published = 0usize;

    while let Some((node, properties, hops)) = queue.pop_front() {
        node.publish_change(origin_id, hops, &properties);
        published += 1;

        let mut next: Vec<(Node, Vec<String>)> = Vec::new();
        for (parent, property) in node.parents() {
            let id = parent.id();
            if let Some((_, pending)) = next.iter_mut().find(|(queued, _)| queued.id() == id) {
                pending.push(property);
            } else if visited.insert(id) {
                next.push((parent, vec![property]));
            } else {
                trace!(node = %id, "relay already passed through this node; stopping");
            }
        }
        queue.extend(next.into_iter().map(|(parent, pending)| (parent, pending, hops + 1)));
    }

    trace!(origin = %origin_id, property, nodes = published, "propagated change");
}

// ---------------------------------------------------------------------------
// Pending-change queries
// ---------------------------------------------------------------------------

/// Whether `start`, or anything reachable from it, has pending changes.
///
/// `skip` is treated as already visited.
pub fn reaches_pending(start: &Node, skip: Option<NodeId>) -> bool {
    let mut visited: HashSet<NodeId> = skip.into_iter().collect();
    let mut stack = vec![start.clone()];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id()) {
            continue;
        }
        if node.own_pending() {
            return true;
        }
        stack.extend(node.children());
    }

    false
}

/// Status of an object including its wired descendants.
pub fn effective_status(node: &Rc<ObjectNode>) -> ChangeStatus {
    let own = node.state.borrow().status();
    if own != ChangeStatus::Unchanged {
        return own;
    }
    if reaches_pending(&Node::Object(Rc::clone(node)), None) {
        ChangeStatus::Changed
    } else {
        ChangeStatus::Unchanged
    }
}

/// Names of properties with own writes or pending changes below them, in
/// shape declaration order.
pub fn changed_properties(node: &Rc<ObjectNode>) -> Vec<String> {
    let shape = node.target.shape();
    let children: HashMap<usize, Node> = node
        .edges
        .borrow()
        .iter()
        .map(|(slot, edge)| (*slot, edge.child.clone()))
        .collect();
    let state = node.state.borrow().clone();

    shape
        .properties()
        .iter()
        .enumerate()
        .filter(|(slot, _)| {
            state.is_changed(*slot)
                || children
                    .get(slot)
                    .is_some_and(|child| reaches_pending(child, Some(node.id())))
        })
        .map(|(_, def)| def.name.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Accept everything reachable from `root`, children before parents.
pub fn accept_changes(root: &Node) {
    let order = post_order(root);
    debug!(root = %root.id(), nodes = order.len(), "accepting changes");
    for node in &order {
        node.accept_own();
    }
    let detached = order.iter().flat_map(Node::release_detached).collect();
    drop(order);
    release(detached);
}

/// Reject everything reachable from `root`.
///
/// Each node restores its own state first; its children are looked up only
/// afterwards, so a child restored into a slot is itself rejected too.
pub fn reject_changes(registry: &Registry, root: &Node) {
    let mut visited = HashSet::new();
    let mut stack = vec![root.clone()];
    let mut rejected = Vec::new();

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id()) {
            continue;
        }
        node.reject_own(registry);
        stack.extend(
            node.children()
                .into_iter()
                .filter(|child| !visited.contains(&child.id())),
        );
        rejected.push(node);
    }

    debug!(root = %root.id(), nodes = rejected.len(), "rejected changes");
    let detached = rejected.iter().flat_map(Node::release_detached).collect();
    drop(rejected);
    release(detached);
}

fn post_order(root: &Node) -> Vec<Node> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        let children = node.children();
        stack.push((node, true));
        stack.extend(
            children
                .into_iter()
                .filter(|child| !visited.contains(&child.id()))
                .map(|child| (child, false)),
        );
    }

    order
}
