//! Values exchanged with the KV service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A store-wide modification counter.
///
/// Every successful write or delete advances the store revision by one and
/// stamps the written key with the new value. Compare-and-swap compares
/// against the revision a key was last modified at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// The revision of an empty store.
    pub const ZERO: Revision = Revision(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The revision following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A stored value together with the revision it was last modified at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub value: Vec<u8>,
    pub revision: Revision,
}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied at this revision.
    Swapped(Revision),
    /// The expectation did not hold. `current` is the key's revision at the
    /// time of the attempt, or `None` if the key was absent.
    Conflict { current: Option<Revision> },
}

impl CasOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, CasOutcome::Swapped(_))
    }
}
