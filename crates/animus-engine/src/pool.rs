//! Pooled entity reuse.
//!
//! An [`EntityPool`] shelves despawned entities and hands them back out
//! instead of rebuilding them, for high-churn things like bullets and coins.
//! The pool relies on the despawn contract: a despawned entity keeps its
//! installed tags, values, and behaviours, and a later spawn reproduces
//! fresh enable semantics without re-running one-time init or leaking stale
//! subscriptions.

use animus_core::entity::Entity;
use animus_core::AnimusError;
use tracing::debug;

// ---------------------------------------------------------------------------
// EntityPool
// ---------------------------------------------------------------------------

/// A pool of reusable entities built by a factory.
///
/// The factory returns a fresh, installed, not-yet-initialized entity; the
/// pool drives the spawn/despawn framing on the way out and in.
pub struct EntityPool {
    factory: Box<dyn Fn() -> Entity>,
    idle: Vec<Entity>,
}

impl EntityPool {
    /// Create an empty pool over a factory.
    pub fn new(factory: impl Fn() -> Entity + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            idle: Vec::new(),
        }
    }

    /// Pre-create `count` idle entities so the first rents allocate nothing.
    pub fn warm(&mut self, count: usize) {
        for _ in 0..count {
            self.idle.push((self.factory)());
        }
    }

    /// Take an entity out of the pool (building one if none are idle) and
    /// spawn it.
    ///
    /// # Errors
    ///
    /// Propagates the entity's spawn error; the entity is not shelved back
    /// in that case.
    pub fn rent(&mut self) -> Result<Entity, AnimusError> {
        let entity = self.idle.pop().unwrap_or_else(|| (self.factory)());
        entity.spawn()?;
        debug!(entity = %entity.id(), idle = self.idle.len(), "pool: rented");
        Ok(entity)
    }

    /// Despawn an entity and shelve it for reuse.
    ///
    /// # Errors
    ///
    /// Propagates the entity's despawn error (e.g. returning an entity that
    /// was never spawned); the entity is not shelved in that case.
    pub fn give_back(&mut self, entity: Entity) -> Result<(), AnimusError> {
        entity.despawn()?;
        debug!(entity = %entity.id(), idle = self.idle.len() + 1, "pool: returned");
        self.idle.push(entity);
        Ok(())
    }

    /// Number of idle entities currently shelved.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }
}

impl std::fmt::Debug for EntityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPool")
            .field("idle_count", &self.idle.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
