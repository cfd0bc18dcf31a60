//! Per-object change state machine.
//!
//! A `ChangeState` holds what one wrapped object needs to answer "what
//! changed since the last checkpoint" and to undo it:
//!
//! - the **original value store**: slot → value captured on the first write
//!   to that slot after the last checkpoint;
//! - the **changed property set**: slots written since the checkpoint, in
//!   first-write order;
//! - a **lifecycle marker** (`Added` / `Deleted`) that writes never
//!   downgrade.
//!
//! # Transitions
//!
//! | From | Event | To |
//! |---|---|---|
//! | Unchanged | write | Changed |
//! | Changed | accept | Unchanged |
//! | Changed | reject | Unchanged |
//! | Added / Deleted | write | unchanged marker, write still recorded |
//!
//! Whether nested children keep the *effective* status at `Changed` is
//! decided by the graph walk in [`crate::wiring`], not here.

use std::collections::BTreeMap;

use crate::status::ChangeStatus;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Tracked,
    Added,
    Deleted,
}

impl Lifecycle {
    /// Lifecycle a wrapper starts in for the requested initial status.
    ///
    /// `Changed` has no original values to revert to, so it starts tracked.
    #[must_use]
    pub const fn from_status(status: ChangeStatus) -> Self {
        match status {
            ChangeStatus::Added => Self::Added,
            ChangeStatus::Deleted => Self::Deleted,
            ChangeStatus::Unchanged | ChangeStatus::Changed => Self::Tracked,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeState {
    lifecycle: Lifecycle,
    originals: BTreeMap<usize, Value>,
    changed: Vec<usize>,
}

impl ChangeState {
    #[must_use]
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            ..Self::default()
        }
    }

    /// Status from this object's own state only.
    #[must_use]
    pub fn status(&self) -> ChangeStatus {
        match self.lifecycle {
            Lifecycle::Added => ChangeStatus::Added,
            Lifecycle::Deleted => ChangeStatus::Deleted,
            Lifecycle::Tracked if self.changed.is_empty() => ChangeStatus::Unchanged,
            Lifecycle::Tracked => ChangeStatus::Changed,
        }
    }

    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Record a write to `slot` whose previous value was `old`.
    ///
    /// Returns `true` when this is the first write since the checkpoint, in
    /// which case `old` becomes the original value.
    pub fn record_write(&mut self, slot: usize, old: Value) -> bool {
        if self.originals.contains_key(&slot) {
            return false;
        }
        self.originals.insert(slot, old);
        self.changed.push(slot);
        true
    }

    #[must_use]
    pub fn is_changed(&self, slot: usize) -> bool {
        self.originals.contains_key(&slot)
    }

    #[must_use]
    pub fn original(&self, slot: usize) -> Option<&Value> {
        self.originals.get(&slot)
    }

    /// Slots written since the checkpoint, in first-write order.
    #[must_use]
    pub fn changed_slots(&self) -> &[usize] {
        &self.changed
    }

    /// Own writes or a lifecycle marker are pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.changed.is_empty() || self.lifecycle != Lifecycle::Tracked
    }

    /// Commit current values as the new baseline.
    ///
    /// Lifecycle markers survive: they need a collection-level checkpoint.
    /// Returns whether any write was pending.
    pub fn accept(&mut self) -> bool {
        let had_writes = !self.changed.is_empty();
        self.originals.clear();
        self.changed.clear();
        had_writes
    }

    /// Drain the original value store for a revert, in first-write order.
    pub fn take_originals(&mut self) -> Vec<(usize, Value)> {
        let mut originals = std::mem::take(&mut self.originals);
        std::mem::take(&mut self.changed)
            .into_iter()
            .filter_map(|slot| originals.remove(&slot).map(|value| (slot, value)))
            .collect()
    }
}
