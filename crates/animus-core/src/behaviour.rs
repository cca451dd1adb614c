//! Behaviour capabilities and the per-entity behaviour table.
//!
//! A behaviour is a unit of logic attached to an entity. Each lifecycle
//! capability is its own narrow trait ([`Init`], [`Tick`], ...); a behaviour
//! advertises the capabilities it implements by overriding the matching
//! `as_*` probe on [`Behaviour`]. Probing happens exactly once, when the
//! behaviour is attached: the table records the slot in a per-capability
//! dispatch list so per-frame dispatch never type-checks anything.
//!
//! ```
//! use animus_core::prelude::*;
//!
//! struct Fuse { remaining: f32 }
//!
//! impl Tick for Fuse {
//!     fn tick(&mut self, _entity: &Entity, dt: f32) {
//!         self.remaining -= dt;
//!     }
//! }
//!
//! impl Behaviour for Fuse {
//!     fn as_tick(&mut self) -> Option<&mut dyn Tick> {
//!         Some(self)
//!     }
//! }
//!
//! let bomb = Entity::named("bomb");
//! bomb.add_behaviour(Fuse { remaining: 3.0 }).unwrap();
//! assert!(bomb.has_behaviour::<Fuse>());
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::entity::Entity;

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// One-time setup, invoked when the owning entity initializes.
pub trait Init {
    fn init(&mut self, entity: &Entity);
}

/// Activation, invoked when the owning entity enables.
pub trait Enable {
    fn enable(&mut self, entity: &Entity);
}

/// Deactivation, invoked in reverse attach order when the entity disables.
pub trait Disable {
    fn disable(&mut self, entity: &Entity);
}

/// Final teardown, invoked in reverse attach order when the entity disposes.
pub trait Dispose {
    fn dispose(&mut self, entity: &Entity);
}

/// Per-frame update while the entity is enabled.
pub trait Tick {
    fn tick(&mut self, entity: &Entity, dt: f32);
}

/// Fixed-timestep update while the entity is enabled.
pub trait FixedTick {
    fn fixed_tick(&mut self, entity: &Entity, dt: f32);
}

/// End-of-frame update while the entity is enabled.
pub trait LateTick {
    fn late_tick(&mut self, entity: &Entity, dt: f32);
}

/// Pooling hook, invoked after the entity spawns.
pub trait Spawn {
    fn spawn(&mut self, entity: &Entity);
}

/// Pooling hook, invoked in reverse attach order before the entity despawns.
pub trait Despawn {
    fn despawn(&mut self, entity: &Entity);
}

// ---------------------------------------------------------------------------
// Behaviour
// ---------------------------------------------------------------------------

/// The attachable unit of logic.
///
/// Override the probe for each capability the type implements; the default
/// probes return `None`. The `Any` supertrait enables type-keyed lookup and
/// removal ([`Entity::with_behaviour`], [`Entity::remove_behaviour`]).
pub trait Behaviour: Any {
    fn as_init(&mut self) -> Option<&mut dyn Init> {
        None
    }
    fn as_enable(&mut self) -> Option<&mut dyn Enable> {
        None
    }
    fn as_disable(&mut self) -> Option<&mut dyn Disable> {
        None
    }
    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        None
    }
    fn as_tick(&mut self) -> Option<&mut dyn Tick> {
        None
    }
    fn as_fixed_tick(&mut self) -> Option<&mut dyn FixedTick> {
        None
    }
    fn as_late_tick(&mut self) -> Option<&mut dyn LateTick> {
        None
    }
    fn as_spawn(&mut self) -> Option<&mut dyn Spawn> {
        None
    }
    fn as_despawn(&mut self) -> Option<&mut dyn Despawn> {
        None
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Index into the per-capability dispatch lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capability {
    Init = 0,
    Enable,
    Disable,
    Dispose,
    Tick,
    FixedTick,
    LateTick,
    Spawn,
    Despawn,
}

pub(crate) const CAPABILITY_COUNT: usize = 9;

impl Capability {
    fn index(self) -> usize {
        self as usize
    }
}

/// Probe a behaviour once for every capability it implements.
fn probe_capabilities(behaviour: &mut dyn Behaviour) -> Vec<Capability> {
    let mut caps = Vec::new();
    if behaviour.as_init().is_some() {
        caps.push(Capability::Init);
    }
    if behaviour.as_enable().is_some() {
        caps.push(Capability::Enable);
    }
    if behaviour.as_disable().is_some() {
        caps.push(Capability::Disable);
    }
    if behaviour.as_dispose().is_some() {
        caps.push(Capability::Dispose);
    }
    if behaviour.as_tick().is_some() {
        caps.push(Capability::Tick);
    }
    if behaviour.as_fixed_tick().is_some() {
        caps.push(Capability::FixedTick);
    }
    if behaviour.as_late_tick().is_some() {
        caps.push(Capability::LateTick);
    }
    if behaviour.as_spawn().is_some() {
        caps.push(Capability::Spawn);
    }
    if behaviour.as_despawn().is_some() {
        caps.push(Capability::Despawn);
    }
    caps
}

// ---------------------------------------------------------------------------
// BehaviourTable
// ---------------------------------------------------------------------------

pub(crate) struct BehaviourSlot {
    pub(crate) id: u64,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) object: Rc<RefCell<dyn Behaviour>>,
}

/// Insertion-ordered behaviour storage with per-capability dispatch lists.
///
/// Slots are identified by a table-unique id so dispatch snapshots can
/// re-check attachment mid-pass without holding a borrow of the table.
pub(crate) struct BehaviourTable {
    next_id: u64,
    slots: Vec<BehaviourSlot>,
    dispatch: [Vec<u64>; CAPABILITY_COUNT],
}

impl BehaviourTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            slots: Vec::new(),
            dispatch: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Attach a behaviour object, probing its capabilities once. Returns the
    /// new slot id.
    pub(crate) fn attach(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        object: Rc<RefCell<dyn Behaviour>>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        for cap in probe_capabilities(&mut *object.borrow_mut()) {
            self.dispatch[cap.index()].push(id);
        }
        self.slots.push(BehaviourSlot {
            id,
            type_id,
            type_name,
            object,
        });
        id
    }

    /// Detach a slot by id, revoking all capability subscriptions atomically.
    pub(crate) fn detach(&mut self, id: u64) -> Option<BehaviourSlot> {
        let pos = self.slots.iter().position(|slot| slot.id == id)?;
        for list in &mut self.dispatch {
            list.retain(|&entry| entry != id);
        }
        Some(self.slots.remove(pos))
    }

    /// First slot holding a behaviour of the given concrete type, in attach
    /// order.
    pub(crate) fn find_by_type(&self, type_id: TypeId) -> Option<(u64, Rc<RefCell<dyn Behaviour>>)> {
        self.slots
            .iter()
            .find(|slot| slot.type_id == type_id)
            .map(|slot| (slot.id, slot.object.clone()))
    }

    pub(crate) fn contains_type(&self, type_id: TypeId) -> bool {
        self.slots.iter().any(|slot| slot.type_id == type_id)
    }

    pub(crate) fn is_attached(&self, id: u64) -> bool {
        self.slots.iter().any(|slot| slot.id == id)
    }

    /// Dispatch snapshot for one capability, in attach order.
    pub(crate) fn snapshot(&self, cap: Capability) -> Vec<(u64, Rc<RefCell<dyn Behaviour>>)> {
        self.dispatch[cap.index()]
            .iter()
            .filter_map(|&id| {
                self.slots
                    .iter()
                    .find(|slot| slot.id == id)
                    .map(|slot| (id, slot.object.clone()))
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        for list in &mut self.dispatch {
            list.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

impl Default for BehaviourTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct TickOnly;

    impl Tick for TickOnly {
        fn tick(&mut self, _entity: &Entity, _dt: f32) {}
    }

    impl Behaviour for TickOnly {
        fn as_tick(&mut self) -> Option<&mut dyn Tick> {
            Some(self)
        }
    }

    struct InitAndDisable;

    impl Init for InitAndDisable {
        fn init(&mut self, _entity: &Entity) {}
    }

    impl Disable for InitAndDisable {
        fn disable(&mut self, _entity: &Entity) {}
    }

    impl Behaviour for InitAndDisable {
        fn as_init(&mut self) -> Option<&mut dyn Init> {
            Some(self)
        }
        fn as_disable(&mut self) -> Option<&mut dyn Disable> {
            Some(self)
        }
    }

    struct Inert;

    impl Behaviour for Inert {}

    fn boxed<B: Behaviour>(behaviour: B) -> Rc<RefCell<dyn Behaviour>> {
        Rc::new(RefCell::new(behaviour))
    }

    #[test]
    fn probe_registers_only_implemented_capabilities() {
        let mut table = BehaviourTable::new();
        let id = table.attach(TypeId::of::<TickOnly>(), "TickOnly", boxed(TickOnly));

        assert_eq!(table.snapshot(Capability::Tick).len(), 1);
        assert!(table.snapshot(Capability::Init).is_empty());
        assert!(table.snapshot(Capability::FixedTick).is_empty());
        assert!(table.is_attached(id));
    }

    #[test]
    fn inert_behaviour_registers_nothing() {
        let mut table = BehaviourTable::new();
        table.attach(TypeId::of::<Inert>(), "Inert", boxed(Inert));
        assert_eq!(table.len(), 1);
        assert!(table.snapshot(Capability::Tick).is_empty());
        assert!(table.snapshot(Capability::Dispose).is_empty());
    }

    #[test]
    fn dispatch_lists_preserve_attach_order() {
        let mut table = BehaviourTable::new();
        let a = table.attach(TypeId::of::<TickOnly>(), "TickOnly", boxed(TickOnly));
        let b = table.attach(
            TypeId::of::<InitAndDisable>(),
            "InitAndDisable",
            boxed(InitAndDisable),
        );
        let c = table.attach(TypeId::of::<TickOnly>(), "TickOnly", boxed(TickOnly));

        let ticks: Vec<u64> = table
            .snapshot(Capability::Tick)
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(ticks, vec![a, c]);

        let inits: Vec<u64> = table
            .snapshot(Capability::Init)
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(inits, vec![b]);
    }

    #[test]
    fn detach_revokes_all_subscriptions() {
        let mut table = BehaviourTable::new();
        let id = table.attach(
            TypeId::of::<InitAndDisable>(),
            "InitAndDisable",
            boxed(InitAndDisable),
        );

        let slot = table.detach(id).expect("slot exists");
        assert_eq!(slot.type_name, "InitAndDisable");
        assert!(!table.is_attached(id));
        assert!(table.snapshot(Capability::Init).is_empty());
        assert!(table.snapshot(Capability::Disable).is_empty());
        assert!(table.detach(id).is_none());
    }

    #[test]
    fn find_by_type_returns_first_attached() {
        let mut table = BehaviourTable::new();
        let first = table.attach(TypeId::of::<TickOnly>(), "TickOnly", boxed(TickOnly));
        let _second = table.attach(TypeId::of::<TickOnly>(), "TickOnly", boxed(TickOnly));

        let (found, _) = table.find_by_type(TypeId::of::<TickOnly>()).unwrap();
        assert_eq!(found, first);
        assert!(table.contains_type(TypeId::of::<TickOnly>()));
        assert!(!table.contains_type(TypeId::of::<InitAndDisable>()));
    }
}
