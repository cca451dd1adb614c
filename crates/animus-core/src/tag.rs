//! Per-entity tag membership.
//!
//! A [`TagTable`] is a sparse set of small integer [`Tag`]s marking category
//! membership ("is a coin", "is on the red team"). Adding a present tag and
//! removing an absent one are silent no-ops so callers can treat tag writes
//! as idempotent.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Integer identifier marking entity category membership.
///
/// As with [`ValueKey`](crate::value::ValueKey), the name-to-number mapping
/// is a host-side convention.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(pub u32);

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TagTable
// ---------------------------------------------------------------------------

/// Sparse tag set. Enumeration order is unspecified.
#[derive(Default)]
pub(crate) struct TagTable {
    tags: HashSet<Tag>,
}

impl TagTable {
    pub(crate) fn new() -> Self {
        Self {
            tags: HashSet::new(),
        }
    }

    /// Insert a tag. Returns `false` if it was already present.
    pub(crate) fn add(&mut self, tag: Tag) -> bool {
        self.tags.insert(tag)
    }

    pub(crate) fn has(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Remove a tag. Returns `false` if it was absent.
    pub(crate) fn remove(&mut self, tag: Tag) -> bool {
        self.tags.remove(&tag)
    }

    /// Current tags, in unspecified order.
    pub(crate) fn snapshot(&self) -> Vec<Tag> {
        self.tags.iter().copied().collect()
    }

    /// Remove every tag in one bulk operation, returning what was present.
    pub(crate) fn clear(&mut self) -> Vec<Tag> {
        let tags = self.snapshot();
        self.tags.clear();
        tags
    }

    pub(crate) fn len(&self) -> usize {
        self.tags.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
