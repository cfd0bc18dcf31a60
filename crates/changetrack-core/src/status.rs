use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Change status of a tracked object or collection.
///
/// `Added` and `Deleted` are lifecycle markers: property writes never
/// downgrade them to `Changed`, and only collection-level checkpoints clear
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    #[default]
    Unchanged,
    Added,
    Deleted,
    Changed,
}

impl ChangeStatus {
    pub const ALL: [Self; 4] = [Self::Unchanged, Self::Added, Self::Deleted, Self::Changed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Changed => "changed",
        }
    }

    /// `Added` or `Deleted`.
    #[must_use]
    pub const fn is_lifecycle_marker(self) -> bool {
        matches!(self, Self::Added | Self::Deleted)
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown change status '{0}': expected unchanged, added, deleted or changed")]
pub struct UnknownStatus(pub String);

impl FromStr for ChangeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
