//! The entity handle and its lifecycle state machine.
//!
//! An [`Entity`] composes a value store, a tag set, and a behaviour table
//! behind one lifecycle state machine:
//!
//! ```text
//! Uninitialized -> Initialized -> Enabled <-> Disabled -> Disposed
//! ```
//!
//! with an orthogonal spawned/despawned axis for pooled reuse. Lifecycle
//! calls fan out to the attached behaviours: forward attach order for
//! `init`/`enable`/the tick family/`spawn`, reverse attach order for
//! `disable`/`dispose`/`despawn`.
//!
//! Entities are cheap handles (`Rc`-shared, single-threaded). Cloning a
//! handle never copies entity state; worlds and filters hold handle clones
//! plus explicit event subscriptions, not ownership.
//!
//! # Re-entrancy
//!
//! Every dispatch pass iterates a snapshot taken at dispatch start and holds
//! no interior borrow while a behaviour runs, so a behaviour may add or
//! remove behaviours, mutate tags and values, or change world membership of
//! its own entity mid-pass. Behaviours added during a pass run from the next
//! pass on; behaviours removed during a pass are skipped for the remainder
//! of it.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::behaviour::{Behaviour, BehaviourTable, Capability};
use crate::event::{EntityEvent, EntityObserver, ObserverList, SubscriptionId};
use crate::tag::{Tag, TagTable};
use crate::value::{ValueError, ValueKey, ValueTable, ValueWrite};
use crate::AnimusError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Process-unique entity identifier, assigned at construction and stable for
/// the handle's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_entity_id() -> EntityId {
    EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// EntityState
// ---------------------------------------------------------------------------

/// Init/enable axis of the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Freshly constructed; installers run against this state.
    Uninitialized,
    /// `init` has run; not yet receiving ticks.
    Initialized,
    /// Receiving ticks.
    Enabled,
    /// Temporarily inactive; re-enable to resume ticking.
    Disabled,
    /// Terminal. All owned state has been cleared.
    Disposed,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

struct EntityInner {
    id: EntityId,
    name: RefCell<String>,
    state: Cell<EntityState>,
    spawned: Cell<bool>,
    values: RefCell<ValueTable>,
    tags: RefCell<TagTable>,
    behaviours: RefCell<BehaviourTable>,
    observers: RefCell<ObserverList<dyn EntityObserver>>,
}

/// A composable runtime object holding tags, keyed values, and attached
/// behaviours, driven through the lifecycle state machine.
#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInner>,
}

impl Entity {
    /// Create a fresh, unnamed, uninitialized entity.
    pub fn new() -> Self {
        Self::named("")
    }

    /// Create a fresh, uninitialized entity with a debug name.
    ///
    /// Names are mutable and not unique; identity is [`Entity::id`].
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                id: allocate_entity_id(),
                name: RefCell::new(name.into()),
                state: Cell::new(EntityState::Uninitialized),
                spawned: Cell::new(false),
                values: RefCell::new(ValueTable::new()),
                tags: RefCell::new(TagTable::new()),
                behaviours: RefCell::new(BehaviourTable::new()),
                observers: RefCell::new(ObserverList::new()),
            }),
        }
    }

    // -- identity -----------------------------------------------------------

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.borrow_mut() = name.into();
    }

    pub fn state(&self) -> EntityState {
        self.inner.state.get()
    }

    /// Whether the entity is on the spawned side of the pooling axis.
    pub fn is_spawned(&self) -> bool {
        self.inner.spawned.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == EntityState::Enabled
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == EntityState::Disposed
    }

    fn ensure_live(&self) -> Result<(), AnimusError> {
        if self.is_disposed() {
            Err(AnimusError::Disposed { entity: self.id() })
        } else {
            Ok(())
        }
    }

    // -- events -------------------------------------------------------------

    /// Register an observer for this entity's tag/value change events.
    ///
    /// The registry holds only a weak reference; keep the observer alive
    /// elsewhere and remove it with [`Entity::unsubscribe`] when done.
    pub fn subscribe(&self, observer: Weak<dyn EntityObserver>) -> SubscriptionId {
        self.inner.observers.borrow_mut().subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.borrow_mut().unsubscribe(id)
    }

    fn notify(&self, event: EntityEvent) {
        let observers = self.inner.observers.borrow_mut().snapshot();
        for observer in observers {
            observer.on_entity_event(self, &event);
        }
    }

    // -- tags ---------------------------------------------------------------

    /// Add a tag. `Ok(false)` means the tag was already present; no event
    /// fires in that case.
    pub fn add_tag(&self, tag: Tag) -> Result<bool, AnimusError> {
        self.ensure_live()?;
        let added = self.inner.tags.borrow_mut().add(tag);
        if added {
            self.notify(EntityEvent::TagAdded(tag));
        }
        Ok(added)
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.inner.tags.borrow().has(tag)
    }

    /// Remove a tag. Returns `false` (no event) if it was absent.
    pub fn del_tag(&self, tag: Tag) -> bool {
        let removed = self.inner.tags.borrow_mut().remove(tag);
        if removed {
            self.notify(EntityEvent::TagRemoved(tag));
        }
        removed
    }

    /// Current tags, in unspecified order.
    pub fn tags(&self) -> Vec<Tag> {
        self.inner.tags.borrow().snapshot()
    }

    /// Remove all tags in one bulk operation, firing a single aggregate
    /// event instead of one per tag.
    pub fn clear_tags(&self) {
        let cleared = self.inner.tags.borrow_mut().clear();
        if !cleared.is_empty() {
            self.notify(EntityEvent::TagsCleared(cleared));
        }
    }

    pub fn tag_count(&self) -> usize {
        self.inner.tags.borrow().len()
    }

    // -- values -------------------------------------------------------------

    /// Store a value under a fresh key.
    ///
    /// # Errors
    ///
    /// [`AnimusError::DuplicateKey`] if the key is occupied.
    pub fn add_value<T: 'static>(&self, key: ValueKey, value: T) -> Result<(), AnimusError> {
        self.ensure_live()?;
        if !self.inner.values.borrow_mut().add(key, value) {
            return Err(AnimusError::DuplicateKey {
                entity: self.id(),
                key,
            });
        }
        self.notify(EntityEvent::ValueAdded(key));
        Ok(())
    }

    /// Upsert a value, firing `ValueAdded` or `ValueChanged` accordingly.
    /// Overwriting may change the stored type; type checks happen on read.
    pub fn set_value<T: 'static>(&self, key: ValueKey, value: T) -> Result<(), AnimusError> {
        self.ensure_live()?;
        let write = self.inner.values.borrow_mut().set(key, value);
        self.notify(match write {
            ValueWrite::Added => EntityEvent::ValueAdded(key),
            ValueWrite::Updated => EntityEvent::ValueChanged(key),
        });
        Ok(())
    }

    /// Clone the value under `key` out of the store.
    ///
    /// # Errors
    ///
    /// [`AnimusError::KeyNotFound`] if absent, [`AnimusError::TypeMismatch`]
    /// if the stored type is not `T`.
    pub fn value<T: Clone + 'static>(&self, key: ValueKey) -> Result<T, AnimusError> {
        self.inner
            .values
            .borrow()
            .get_cloned::<T>(key)
            .map_err(|err| self.value_error::<T>(key, err))
    }

    /// Clone the value under `key`, or `None` on any failure. Never errors.
    pub fn try_value<T: Clone + 'static>(&self, key: ValueKey) -> Option<T> {
        self.inner.values.borrow().get_cloned::<T>(key).ok()
    }

    /// Run a read-only closure against the value under `key` without
    /// cloning. The closure must not mutate this entity's values.
    pub fn with_value<T: 'static, R>(
        &self,
        key: ValueKey,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, AnimusError> {
        self.inner
            .values
            .borrow()
            .with(key, f)
            .map_err(|err| self.value_error::<T>(key, err))
    }

    /// Mutate the value under `key` in place, firing `ValueChanged` after
    /// the closure returns. The closure must not touch this entity's values.
    pub fn update_value<T: 'static, R>(
        &self,
        key: ValueKey,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, AnimusError> {
        self.ensure_live()?;
        let result = self
            .inner
            .values
            .borrow_mut()
            .with_mut(key, f)
            .map_err(|err| self.value_error::<T>(key, err))?;
        self.notify(EntityEvent::ValueChanged(key));
        Ok(result)
    }

    /// Delete the value under `key`. Returns `false` (no event) if absent.
    pub fn del_value(&self, key: ValueKey) -> bool {
        let deleted = self.inner.values.borrow_mut().delete(key);
        if deleted {
            self.notify(EntityEvent::ValueRemoved(key));
        }
        deleted
    }

    pub fn has_value(&self, key: ValueKey) -> bool {
        self.inner.values.borrow().has(key)
    }

    /// Currently occupied value keys, in unspecified order.
    pub fn value_keys(&self) -> Vec<ValueKey> {
        self.inner.values.borrow().keys()
    }

    /// Remove all values in one bulk operation, firing a single aggregate
    /// event instead of one per key.
    pub fn clear_values(&self) {
        let cleared = self.inner.values.borrow_mut().clear();
        if !cleared.is_empty() {
            self.notify(EntityEvent::ValuesCleared(cleared));
        }
    }

    pub fn value_count(&self) -> usize {
        self.inner.values.borrow().len()
    }

    fn value_error<T>(&self, key: ValueKey, err: ValueError) -> AnimusError {
        match err {
            ValueError::Missing => AnimusError::KeyNotFound {
                entity: self.id(),
                key,
            },
            ValueError::WrongType { found } => AnimusError::TypeMismatch {
                entity: self.id(),
                key,
                expected: std::any::type_name::<T>(),
                found,
            },
        }
    }

    // -- behaviours ---------------------------------------------------------

    /// Attach a behaviour, probing its capabilities once.
    ///
    /// Attaching to an already initialized entity replays catch-up hooks so
    /// late attachment behaves like early attachment: `init` runs
    /// immediately, and `enable` too if the entity is enabled.
    pub fn add_behaviour<B: Behaviour>(&self, behaviour: B) -> Result<(), AnimusError> {
        self.ensure_live()?;
        let object: Rc<RefCell<dyn Behaviour>> = Rc::new(RefCell::new(behaviour));
        let id = self.inner.behaviours.borrow_mut().attach(
            TypeId::of::<B>(),
            std::any::type_name::<B>(),
            object.clone(),
        );
        match self.state() {
            EntityState::Initialized | EntityState::Disabled => {
                self.run_catch_up_init(&object);
            }
            EntityState::Enabled => {
                self.run_catch_up_init(&object);
                // The init hook may have detached the behaviour again.
                if self.inner.behaviours.borrow().is_attached(id) {
                    let mut guard = object.borrow_mut();
                    if let Some(hook) = guard.as_enable() {
                        hook.enable(self);
                    }
                }
            }
            EntityState::Uninitialized | EntityState::Disposed => {}
        }
        Ok(())
    }

    fn run_catch_up_init(&self, object: &Rc<RefCell<dyn Behaviour>>) {
        let mut guard = object.borrow_mut();
        if let Some(hook) = guard.as_init() {
            hook.init(self);
        }
    }

    /// Detach the first attached behaviour of type `B`, revoking all its
    /// capability subscriptions atomically. If the entity is enabled, the
    /// departing behaviour's `disable` hook runs first.
    ///
    /// A behaviour that detaches itself from inside one of its own callbacks
    /// skips the disable catch-up (the instance is already mid-callback).
    ///
    /// # Errors
    ///
    /// [`AnimusError::BehaviourNotFound`] if no behaviour of type `B` is
    /// attached.
    pub fn remove_behaviour<B: Behaviour>(&self) -> Result<(), AnimusError> {
        self.ensure_live()?;
        let found = self
            .inner
            .behaviours
            .borrow()
            .find_by_type(TypeId::of::<B>());
        let (id, object) = found.ok_or(AnimusError::BehaviourNotFound {
            entity: self.id(),
            type_name: std::any::type_name::<B>(),
        })?;
        if self.state() == EntityState::Enabled {
            if let Ok(mut guard) = object.try_borrow_mut() {
                if let Some(hook) = guard.as_disable() {
                    hook.disable(self);
                }
            }
        }
        self.inner.behaviours.borrow_mut().detach(id);
        Ok(())
    }

    pub fn has_behaviour<B: Behaviour>(&self) -> bool {
        self.inner
            .behaviours
            .borrow()
            .contains_type(TypeId::of::<B>())
    }

    pub fn behaviour_count(&self) -> usize {
        self.inner.behaviours.borrow().len()
    }

    /// Run a closure against the first attached behaviour of type `B`.
    ///
    /// # Errors
    ///
    /// [`AnimusError::BehaviourNotFound`] if no behaviour of type `B` is
    /// attached.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from inside one of `B`'s own callbacks
    /// (the instance is already exclusively borrowed).
    pub fn with_behaviour<B: Behaviour, R>(
        &self,
        f: impl FnOnce(&mut B) -> R,
    ) -> Result<R, AnimusError> {
        let found = self
            .inner
            .behaviours
            .borrow()
            .find_by_type(TypeId::of::<B>());
        let (_, object) = found.ok_or(AnimusError::BehaviourNotFound {
            entity: self.id(),
            type_name: std::any::type_name::<B>(),
        })?;
        let mut guard = object.borrow_mut();
        let any: &mut dyn std::any::Any = &mut *guard;
        let concrete = any
            .downcast_mut::<B>()
            .expect("slot type id matches concrete type");
        Ok(f(concrete))
    }

    // -- lifecycle ----------------------------------------------------------

    /// Run one-time setup: invokes `init` on every attached behaviour
    /// implementing it, in attach order.
    ///
    /// # Errors
    ///
    /// [`AnimusError::InvalidStateTransition`] unless the entity is
    /// `Uninitialized`; [`AnimusError::Disposed`] after disposal.
    pub fn init(&self) -> Result<(), AnimusError> {
        self.check_transition("init", &[EntityState::Uninitialized])?;
        self.inner.state.set(EntityState::Initialized);
        debug!(entity = %self.id(), "init");
        self.dispatch(Capability::Init, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_init() {
                hook.init(entity);
            }
        });
        Ok(())
    }

    /// Activate: invokes `enable` on every subscribed behaviour in attach
    /// order and starts accepting ticks.
    ///
    /// # Errors
    ///
    /// [`AnimusError::InvalidStateTransition`] unless the entity is
    /// `Initialized` or `Disabled`; [`AnimusError::Disposed`] after disposal.
    pub fn enable(&self) -> Result<(), AnimusError> {
        self.check_transition("enable", &[EntityState::Initialized, EntityState::Disabled])?;
        self.inner.state.set(EntityState::Enabled);
        debug!(entity = %self.id(), "enable");
        self.dispatch(Capability::Enable, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_enable() {
                hook.enable(entity);
            }
        });
        Ok(())
    }

    /// Deactivate: invokes `disable` on every subscribed behaviour in
    /// reverse attach order and stops accepting ticks.
    ///
    /// # Errors
    ///
    /// [`AnimusError::InvalidStateTransition`] unless the entity is
    /// `Enabled`; [`AnimusError::Disposed`] after disposal.
    pub fn disable(&self) -> Result<(), AnimusError> {
        self.check_transition("disable", &[EntityState::Enabled])?;
        self.inner.state.set(EntityState::Disabled);
        debug!(entity = %self.id(), "disable");
        self.dispatch(Capability::Disable, true, |behaviour, entity| {
            if let Some(hook) = behaviour.as_disable() {
                hook.disable(entity);
            }
        });
        Ok(())
    }

    /// Tear down permanently: forces `disable` if enabled, invokes `dispose`
    /// on every subscribed behaviour in reverse attach order, then clears
    /// values, tags, behaviours, and subscriptions. Terminal.
    ///
    /// # Errors
    ///
    /// [`AnimusError::Disposed`] if already disposed.
    pub fn dispose(&self) -> Result<(), AnimusError> {
        self.ensure_live()?;
        if self.state() == EntityState::Enabled {
            self.disable()?;
        }
        self.dispatch(Capability::Dispose, true, |behaviour, entity| {
            if let Some(hook) = behaviour.as_dispose() {
                hook.dispose(entity);
            }
        });
        // Bulk clears fire aggregate events so downstream indices stay in
        // sync before the subscriptions themselves are dropped.
        self.clear_values();
        self.clear_tags();
        self.inner.behaviours.borrow_mut().clear();
        self.inner.observers.borrow_mut().clear();
        self.inner.spawned.set(false);
        self.inner.state.set(EntityState::Disposed);
        debug!(entity = %self.id(), "dispose");
        Ok(())
    }

    /// Per-frame update. Silently dropped unless the entity is `Enabled`.
    pub fn tick(&self, dt: f32) {
        if !self.is_enabled() {
            return;
        }
        self.dispatch(Capability::Tick, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_tick() {
                hook.tick(entity, dt);
            }
        });
    }

    /// Fixed-timestep update. Silently dropped unless the entity is
    /// `Enabled`.
    pub fn fixed_tick(&self, dt: f32) {
        if !self.is_enabled() {
            return;
        }
        self.dispatch(Capability::FixedTick, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_fixed_tick() {
                hook.fixed_tick(entity, dt);
            }
        });
    }

    /// End-of-frame update. Silently dropped unless the entity is `Enabled`.
    pub fn late_tick(&self, dt: f32) {
        if !self.is_enabled() {
            return;
        }
        self.dispatch(Capability::LateTick, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_late_tick() {
                hook.late_tick(entity, dt);
            }
        });
    }

    /// Pooling entry: drives `init` (if not yet initialized) then `enable`,
    /// then invokes `spawn` hooks in attach order and marks the entity
    /// spawned.
    ///
    /// # Errors
    ///
    /// [`AnimusError::InvalidStateTransition`] if already spawned;
    /// [`AnimusError::Disposed`] after disposal.
    pub fn spawn(&self) -> Result<(), AnimusError> {
        self.ensure_live()?;
        if self.is_spawned() {
            return Err(AnimusError::InvalidStateTransition {
                entity: self.id(),
                operation: "spawn",
                state: self.state(),
            });
        }
        if self.state() == EntityState::Uninitialized {
            self.init()?;
        }
        if self.state() != EntityState::Enabled {
            self.enable()?;
        }
        self.inner.spawned.set(true);
        debug!(entity = %self.id(), "spawn");
        self.dispatch(Capability::Spawn, false, |behaviour, entity| {
            if let Some(hook) = behaviour.as_spawn() {
                hook.spawn(entity);
            }
        });
        Ok(())
    }

    /// Pooling exit: invokes `despawn` hooks in reverse attach order, drives
    /// `disable`, and leaves the entity `Initialized` so a later
    /// [`Entity::spawn`] reproduces fresh enable semantics.
    ///
    /// # Errors
    ///
    /// [`AnimusError::InvalidStateTransition`] if not spawned;
    /// [`AnimusError::Disposed`] after disposal.
    pub fn despawn(&self) -> Result<(), AnimusError> {
        self.ensure_live()?;
        if !self.is_spawned() {
            return Err(AnimusError::InvalidStateTransition {
                entity: self.id(),
                operation: "despawn",
                state: self.state(),
            });
        }
        self.dispatch(Capability::Despawn, true, |behaviour, entity| {
            if let Some(hook) = behaviour.as_despawn() {
                hook.despawn(entity);
            }
        });
        if self.state() == EntityState::Enabled {
            self.disable()?;
        }
        self.inner.state.set(EntityState::Initialized);
        self.inner.spawned.set(false);
        debug!(entity = %self.id(), "despawn");
        Ok(())
    }

    fn check_transition(
        &self,
        operation: &'static str,
        allowed: &[EntityState],
    ) -> Result<(), AnimusError> {
        let state = self.state();
        if state == EntityState::Disposed {
            return Err(AnimusError::Disposed { entity: self.id() });
        }
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(AnimusError::InvalidStateTransition {
                entity: self.id(),
                operation,
                state,
            })
        }
    }

    /// Invoke one capability over a snapshot of the dispatch list.
    ///
    /// No table borrow is held while a behaviour runs; slots detached
    /// mid-pass are re-checked and skipped, slots attached mid-pass are not
    /// part of the snapshot. A behaviour that is itself mid-callback (e.g.
    /// its tick triggered a despawn of its own entity) is skipped by the
    /// nested pass instead of being entered re-entrantly.
    fn dispatch(
        &self,
        cap: Capability,
        reverse: bool,
        mut invoke: impl FnMut(&mut dyn Behaviour, &Entity),
    ) {
        let mut snapshot = self.inner.behaviours.borrow().snapshot(cap);
        if reverse {
            snapshot.reverse();
        }
        for (slot_id, object) in snapshot {
            if !self.inner.behaviours.borrow().is_attached(slot_id) {
                continue;
            }
            match object.try_borrow_mut() {
                Ok(mut guard) => invoke(&mut *guard, self),
                Err(_) => {
                    trace!(entity = %self.id(), "skipping re-entrant dispatch into running behaviour");
                }
            }
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("name", &*self.inner.name.borrow())
            .field("state", &self.state())
            .field("spawned", &self.is_spawned())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
