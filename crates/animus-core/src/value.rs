//! Per-entity typed value storage.
//!
//! A [`ValueTable`] maps small integer [`ValueKey`]s to single type-erased
//! values. The table itself stores `Box<dyn Any>` plus the Rust type name
//! recorded at write time; callers assert the concrete type on read and get
//! a [`ValueError::WrongType`] when the assertion fails.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValueKey
// ---------------------------------------------------------------------------

/// Integer key identifying a typed datum stored on an entity.
///
/// The mapping from human-readable names to key numbers is a host-side naming
/// convention (typically a constants table); the runtime treats keys as
/// opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueKey(pub u32);

impl fmt::Debug for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueKey({})", self.0)
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ValueError / ValueWrite
// ---------------------------------------------------------------------------

/// Read/write failure inside a [`ValueTable`].
///
/// The entity layer maps these onto the crate error type, attaching the
/// entity id the table cannot know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueError {
    /// No value stored under the requested key.
    Missing,
    /// A value exists but its stored type differs from the requested one.
    WrongType {
        /// Type name recorded when the value was written.
        found: &'static str,
    },
}

/// Outcome of an upsert: whether the key was fresh or overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueWrite {
    Added,
    Updated,
}

// ---------------------------------------------------------------------------
// ValueTable
// ---------------------------------------------------------------------------

struct ValueSlot {
    value: Box<dyn Any>,
    type_name: &'static str,
}

/// Type-erased value table. At most one value per key.
#[derive(Default)]
pub(crate) struct ValueTable {
    slots: HashMap<ValueKey, ValueSlot>,
}

impl ValueTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Insert a value under a fresh key. Returns `false` (and leaves the
    /// table untouched) if the key is already present.
    pub(crate) fn add<T: 'static>(&mut self, key: ValueKey, value: T) -> bool {
        if self.slots.contains_key(&key) {
            return false;
        }
        self.slots.insert(
            key,
            ValueSlot {
                value: Box::new(value),
                type_name: std::any::type_name::<T>(),
            },
        );
        true
    }

    /// Upsert a value. Overwriting may change the stored type; type checks
    /// happen on read, not on write.
    pub(crate) fn set<T: 'static>(&mut self, key: ValueKey, value: T) -> ValueWrite {
        let slot = ValueSlot {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        };
        match self.slots.insert(key, slot) {
            None => ValueWrite::Added,
            Some(_) => ValueWrite::Updated,
        }
    }

    /// Clone the value stored under `key` out of the table.
    pub(crate) fn get_cloned<T: Clone + 'static>(&self, key: ValueKey) -> Result<T, ValueError> {
        self.with(key, T::clone)
    }

    /// Run a read-only closure against the value stored under `key`.
    pub(crate) fn with<T: 'static, R>(
        &self,
        key: ValueKey,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, ValueError> {
        let slot = self.slots.get(&key).ok_or(ValueError::Missing)?;
        let value = slot.value.downcast_ref::<T>().ok_or(ValueError::WrongType {
            found: slot.type_name,
        })?;
        Ok(f(value))
    }

    /// Run a mutating closure against the value stored under `key`.
    pub(crate) fn with_mut<T: 'static, R>(
        &mut self,
        key: ValueKey,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, ValueError> {
        let slot = self.slots.get_mut(&key).ok_or(ValueError::Missing)?;
        let found = slot.type_name;
        let value = slot
            .value
            .downcast_mut::<T>()
            .ok_or(ValueError::WrongType { found })?;
        Ok(f(value))
    }

    /// Remove the value under `key`. Returns `false` if absent.
    pub(crate) fn delete(&mut self, key: ValueKey) -> bool {
        self.slots.remove(&key).is_some()
    }

    pub(crate) fn has(&self, key: ValueKey) -> bool {
        self.slots.contains_key(&key)
    }

    /// The set of currently occupied keys, in unspecified order.
    pub(crate) fn keys(&self) -> Vec<ValueKey> {
        self.slots.keys().copied().collect()
    }

    /// Remove every entry in one bulk operation, returning the keys that
    /// were occupied so the caller can raise a single aggregate notification.
    pub(crate) fn clear(&mut self) -> Vec<ValueKey> {
        let keys = self.keys();
        self.slots.clear();
        keys
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
