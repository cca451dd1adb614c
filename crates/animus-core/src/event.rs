//! Change notifications and subscription plumbing.
//!
//! Entities, worlds, and filters all raise synchronous notifications when
//! their state changes. Observers register through an [`ObserverList`], which
//! hands back a [`SubscriptionId`] for explicit removal and stores only
//! [`Weak`] references so the subscription graph (world watching entities,
//! filters watching both) can never keep anything alive by accident.
//!
//! Dispatch discipline: every notification pass first snapshots the live
//! observers, then invokes them with no interior borrow held, so an observer
//! may subscribe, unsubscribe, or mutate the source re-entrantly. Structural
//! changes made during a pass are observed by the *next* pass.

use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::tag::Tag;
use crate::value::ValueKey;

// ---------------------------------------------------------------------------
// EntityEvent
// ---------------------------------------------------------------------------

/// A change raised by a single entity's tag set or value store.
///
/// The bulk variants carry the keys that were present so index maintainers
/// can update without rescanning the (already emptied) entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    /// A tag was newly added.
    TagAdded(Tag),
    /// A present tag was removed.
    TagRemoved(Tag),
    /// The whole tag set was cleared in one bulk operation.
    TagsCleared(Vec<Tag>),
    /// A value was stored under a previously empty key.
    ValueAdded(ValueKey),
    /// The value under an occupied key was overwritten or mutated in place.
    ValueChanged(ValueKey),
    /// The value under a key was deleted.
    ValueRemoved(ValueKey),
    /// The whole value store was cleared in one bulk operation.
    ValuesCleared(Vec<ValueKey>),
}

// ---------------------------------------------------------------------------
// Observer traits
// ---------------------------------------------------------------------------

/// Observer of one entity's tag/value changes.
pub trait EntityObserver {
    /// Called synchronously after the change has been applied; reading the
    /// entity inside the callback observes the post-change state.
    fn on_entity_event(&self, entity: &Entity, event: &EntityEvent);
}

/// Observer of a membership source (a world or a filter).
pub trait SourceObserver {
    /// An entity became a member of the source.
    fn on_entity_added(&self, entity: &Entity);
    /// An entity stopped being a member of the source.
    fn on_entity_removed(&self, entity: &Entity);
}

// ---------------------------------------------------------------------------
// SubscriptionId / ObserverList
// ---------------------------------------------------------------------------

/// Token identifying one subscription in one [`ObserverList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Registry of weak observers keyed by subscription id.
pub(crate) struct ObserverList<T: ?Sized> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Weak<T>)>,
}

impl<T: ?Sized> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self, observer: Weak<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    /// Remove a subscription by id. Returns `false` if the id is unknown
    /// (already removed, or from a different list).
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Upgrade all live observers into a dispatch snapshot, pruning entries
    /// whose observer has been dropped.
    pub(crate) fn snapshot(&mut self) -> Vec<Rc<T>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
