//! Identity registry and wrapping sessions.
//!
//! The registry maps each underlying object or list identity to its single
//! tracked node, and is the cycle guard for every wiring walk: an identity
//! already present is reused, never wrapped twice.
//!
//! It does not own the graph. Entries are weak: a node lives as long as a
//! view, a parent edge, or a pending checkpoint holds it, and its entry is
//! pruned once it is gone. Dropping the registry severs the edges of every
//! node still alive, which frees node cycles that nothing outside holds.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::collection::CollectionNode;
use crate::error::{TrackError, TrackResult};
use crate::options::TrackOptions;
use crate::proxy::{ObjectNode, Tracked, Tracker};
use crate::state::Lifecycle;
use crate::status::ChangeStatus;
use crate::value::{NodeId, Object};
use crate::wiring::{self, Node, WeakNode};

pub(crate) struct Registry {
    options: TrackOptions,
    nodes: RefCell<HashMap<NodeId, WeakNode>>,
}

impl Registry {
    pub(crate) fn new(options: TrackOptions) -> Rc<Self> {
        Rc::new(Self {
            options,
            nodes: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) const fn options(&self) -> TrackOptions {
        self.options
    }

    fn lookup(&self, id: NodeId) -> Option<Node> {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get(&id)?.upgrade();
        if node.is_none() {
            nodes.remove(&id);
        }
        node
    }

    pub(crate) fn object(&self, id: NodeId) -> Option<Rc<ObjectNode>> {
        match self.lookup(id) {
            Some(Node::Object(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn collection(&self, id: NodeId) -> Option<Rc<CollectionNode>> {
        match self.lookup(id) {
            Some(Node::Collection(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn register(&self, node: &Node) {
        self.nodes.borrow_mut().insert(node.id(), node.downgrade());
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        nodes.retain(|_, node| node.is_live());
        nodes.len()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let live: Vec<Node> = self
            .nodes
            .get_mut()
            .drain()
            .filter_map(|(_, node)| node.upgrade())
            .collect();
        let children: Vec<Node> = live.iter().flat_map(Node::take_children).collect();
        drop(children);
    }
}

// ---------------------------------------------------------------------------
// TrackingSession
// ---------------------------------------------------------------------------

/// One identity scope for wrapping.
///
/// Every root wrapped through the same session shares its registry, so an
/// object reachable from several roots gets exactly one proxy.
///
/// ```rust,ignore
/// let session = TrackingSession::new(TrackOptions::default());
/// let first = session.wrap(&order_a);
/// let second = session.wrap(&order_b);
/// // A shared address is one proxy.
/// assert!(first.object("Address")?.unwrap().ptr_eq(&second.object("Address")?.unwrap()));
/// ```
#[derive(Clone)]
pub struct TrackingSession {
    registry: Rc<Registry>,
}

impl TrackingSession {
    #[must_use]
    pub fn new(options: TrackOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }

    pub(crate) const fn from_registry(registry: Rc<Registry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn options(&self) -> TrackOptions {
        self.registry.options()
    }

    /// Wrap `target` (and everything reachable from it) as `Unchanged`.
    #[must_use]
    pub fn wrap(&self, target: &Object) -> Tracked {
        self.wrap_as(target, ChangeStatus::Unchanged)
    }

    /// Wrap `target` with an initial status.
    ///
    /// `Added` and `Deleted` set the lifecycle marker; `Changed` has no
    /// checkpoint to differ from and starts out like `Unchanged`.
    #[must_use]
    pub fn wrap_as(&self, target: &Object, status: ChangeStatus) -> Tracked {
        let before = self.registry.len();
        let lifecycle = Lifecycle::from_status(status);
        let node = wiring::make_trackable(&self.registry, target, lifecycle);
        if lifecycle != Lifecycle::Tracked {
            node.state.borrow_mut().set_lifecycle(lifecycle);
        }

        debug!(
            shape = %target.shape_name(),
            root = %node.id(),
            status = %status,
            wrapped = self.registry.len() - before,
            "wrapped object graph"
        );
        Tracked::new(Rc::clone(&self.registry), node)
    }

    /// Tracked view of an object already wrapped in this session.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotTrackable`] if `object` was never wrapped here.
    pub fn tracked(&self, object: &Object) -> TrackResult<Tracked> {
        self.registry
            .object(object.id())
            .map(|node| Tracked::new(Rc::clone(&self.registry), node))
            .ok_or_else(|| {
                TrackError::not_trackable(format!("{} {}", object.shape_name(), object.id()))
            })
    }

    /// Tracking capability view of an object already wrapped in this session.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotTrackable`] if `object` was never wrapped here.
    pub fn tracker_of(&self, object: &Object) -> TrackResult<Tracker> {
        self.tracked(object).map(|view| view.tracker())
    }

    #[must_use]
    pub fn is_tracked(&self, object: &Object) -> bool {
        self.registry.object(object.id()).is_some()
    }

    /// Number of wrapped objects and collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }
}

impl fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSession")
            .field("options", &self.registry.options())
            .field("nodes", &self.registry.len())
            .finish()
    }
}

/// Wrap `target` in a fresh session.
#[must_use]
pub fn wrap(target: &Object, options: TrackOptions) -> Tracked {
    TrackingSession::new(options).wrap(target)
}
