//! changetrack-core library.
//!
//! Transparent change tracking for dynamic object graphs. Wrapping an
//! [`Object`] yields a [`Tracked`] view with the same properties; every write
//! through it is recorded against the last checkpoint, published to
//! subscribers, and relayed up through the parents that hold it. The
//! [`Tracker`] capability view reports status and changed properties and
//! accepts or rejects pending changes. Nested objects and collections are
//! tracked recursively, and cyclic graphs wrap in a single bounded pass.
//!
//! ```rust,ignore
//! let order = wrap(&plain_order, TrackOptions::default());
//! order.set("CustomerNumber", "Test1")?;
//! let tracker = as_tracker(&order);
//! assert_eq!(tracker.status(), ChangeStatus::Changed);
//! tracker.reject_changes();
//! ```
//!
//! # Conventions
//!
//! - **Errors**: Library operations return [`TrackResult`]; config loading
//!   uses `anyhow::Result` with path context.
//! - **Logging**: Use `tracing` macros (`debug!` for sessions and
//!   checkpoints, `trace!` for writes, relays, and cycle-guard hits).
//! - **Threading**: Single-threaded. Views are `!Send`; callers synchronize
//!   externally if they share the underlying data.

pub mod collection;
pub mod error;
pub mod notify;
pub mod options;
pub mod proxy;
pub mod registry;
pub mod shape;
pub mod state;
pub mod status;
pub mod value;

mod wiring;

pub use collection::TrackedList;
pub use error::{ErrorCode, TrackError, TrackResult};
pub use notify::{
    CHANGE_TRACKING_STATUS, CHANGED_PROPERTIES, COLLECTION_ITEMS, Monitor, PropertyChanged,
    Subscription,
};
pub use options::TrackOptions;
pub use proxy::{Tracked, Tracker, as_tracker};
pub use registry::{TrackingSession, wrap};
pub use shape::{PropertyDef, PropertyKind, Shape, ShapeBuilder};
pub use status::ChangeStatus;
pub use value::{List, NodeId, Object, Value};
