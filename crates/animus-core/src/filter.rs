//! Incrementally-maintained predicate views.
//!
//! A [`Filter`] is a read-only, push-updated membership set over an
//! [`EntitySource`] (a [`World`](crate::world::World) or another filter,
//! so views compose). It never rescans its source: membership is kept
//! current by the source's add/remove notifications plus per-entity change
//! subscriptions selected by a [`Trigger`].
//!
//! The filter tracks *every* source member, including those that currently
//! fail the predicate, because a later trigger event can flip the predicate
//! result either way.
//!
//! For a fixed sequence of source and entity mutations the final membership
//! is uniquely determined; there is no cross-entity ordering dependency.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::entity::{Entity, EntityId};
use crate::event::{EntityEvent, EntityObserver, ObserverList, SourceObserver, SubscriptionId};
use crate::tag::Tag;
use crate::value::ValueKey;

// ---------------------------------------------------------------------------
// EntitySource
// ---------------------------------------------------------------------------

/// A membership set that can be observed and snapshotted: implemented by
/// [`World`](crate::world::World) and [`Filter`].
pub trait EntitySource {
    /// Defensive snapshot of the current members, in unspecified order.
    fn members(&self) -> Vec<Entity>;

    /// O(1) membership test by entity id.
    fn contains_id(&self, id: EntityId) -> bool;

    /// Register a membership observer. The registry holds only a weak
    /// reference.
    fn subscribe(&self, observer: Weak<dyn SourceObserver>) -> SubscriptionId;

    /// Remove a previously registered membership observer.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Which entity-level events cause a filter to re-evaluate its predicate for
/// the affected entity.
///
/// Narrow triggers keep re-evaluation off unrelated hot paths; the trigger
/// must cover every event the predicate depends on, or membership can go
/// stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Re-evaluate on every tag or value event.
    AnyChange,
    /// Re-evaluate on tag events only.
    TagChanges,
    /// Re-evaluate on value events only.
    ValueChanges,
    /// Re-evaluate only when one specific tag is added or removed.
    Tag(Tag),
    /// Re-evaluate only when the value under one specific key changes.
    Value(ValueKey),
}

impl Trigger {
    pub(crate) fn matches(&self, event: &EntityEvent) -> bool {
        match self {
            Trigger::AnyChange => true,
            Trigger::TagChanges => matches!(
                event,
                EntityEvent::TagAdded(_)
                    | EntityEvent::TagRemoved(_)
                    | EntityEvent::TagsCleared(_)
            ),
            Trigger::ValueChanges => matches!(
                event,
                EntityEvent::ValueAdded(_)
                    | EntityEvent::ValueChanged(_)
                    | EntityEvent::ValueRemoved(_)
                    | EntityEvent::ValuesCleared(_)
            ),
            Trigger::Tag(tag) => match event {
                EntityEvent::TagAdded(t) | EntityEvent::TagRemoved(t) => t == tag,
                EntityEvent::TagsCleared(tags) => tags.contains(tag),
                _ => false,
            },
            Trigger::Value(key) => match event {
                EntityEvent::ValueAdded(k)
                | EntityEvent::ValueChanged(k)
                | EntityEvent::ValueRemoved(k) => k == key,
                EntityEvent::ValuesCleared(keys) => keys.contains(key),
                _ => false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FilterState {
    /// Per-tracked-entity change subscription, removed when the source drops
    /// the entity.
    tracked: HashMap<EntityId, SubscriptionId>,
    members: HashMap<EntityId, Entity>,
}

struct FilterInner {
    /// Weak self-handle so the filter can subscribe itself to entities and
    /// sources it observes.
    self_ref: Weak<FilterInner>,
    trigger: Trigger,
    predicate: Box<dyn Fn(&Entity) -> bool>,
    state: RefCell<FilterState>,
    observers: RefCell<ObserverList<dyn SourceObserver>>,
}

/// A live predicate view over an [`EntitySource`].
#[derive(Clone)]
pub struct Filter {
    inner: Rc<FilterInner>,
}

impl Filter {
    /// Build a filter over `source`: scan its current members once, include
    /// those matching `predicate`, and subscribe to the source and to every
    /// member's trigger events for incremental upkeep.
    pub fn new(
        source: &impl EntitySource,
        trigger: Trigger,
        predicate: impl Fn(&Entity) -> bool + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<FilterInner>| FilterInner {
            self_ref: weak.clone(),
            trigger,
            predicate: Box::new(predicate),
            state: RefCell::new(FilterState::default()),
            observers: RefCell::new(ObserverList::new()),
        });
        for entity in source.members() {
            inner.track(&entity);
        }
        let inner_dyn: Rc<dyn SourceObserver> = inner.clone();
        let observer: Weak<dyn SourceObserver> = Rc::downgrade(&inner_dyn);
        source.subscribe(observer);
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().members.is_empty()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.contains_id(entity.id())
    }

    pub fn contains_id(&self, id: EntityId) -> bool {
        self.inner.state.borrow().members.contains_key(&id)
    }

    /// Snapshot of the current members, in unspecified order. Safe to
    /// iterate while the filter updates underneath.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.state.borrow().members.values().cloned().collect()
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Filter")
            .field("member_count", &state.members.len())
            .field("tracked_count", &state.tracked.len())
            .field("trigger", &self.inner.trigger)
            .finish()
    }
}

impl EntitySource for Filter {
    fn members(&self) -> Vec<Entity> {
        self.entities()
    }

    fn contains_id(&self, id: EntityId) -> bool {
        Filter::contains_id(self, id)
    }

    fn subscribe(&self, observer: Weak<dyn SourceObserver>) -> SubscriptionId {
        self.inner.observers.borrow_mut().subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.borrow_mut().unsubscribe(id)
    }
}

// ---------------------------------------------------------------------------
// Incremental upkeep
// ---------------------------------------------------------------------------

enum MembershipChange {
    Entered,
    Left,
}

impl FilterInner {
    fn track(&self, entity: &Entity) {
        if self.state.borrow().tracked.contains_key(&entity.id()) {
            return;
        }
        let observer: Weak<dyn EntityObserver> = self.self_ref.clone();
        let subscription = entity.subscribe(observer);
        self.state
            .borrow_mut()
            .tracked
            .insert(entity.id(), subscription);
        self.evaluate(entity);
    }

    fn untrack(&self, entity: &Entity) {
        let subscription = self.state.borrow_mut().tracked.remove(&entity.id());
        if let Some(subscription) = subscription {
            entity.unsubscribe(subscription);
        }
        let was_member = self
            .state
            .borrow_mut()
            .members
            .remove(&entity.id())
            .is_some();
        if was_member {
            trace!(entity = %entity.id(), "filter: member left (source removal)");
            self.notify_removed(entity);
        }
    }

    /// Re-run the predicate and apply the membership transition, if any.
    /// The only externally observable effects are the filter's own
    /// add/remove events.
    fn evaluate(&self, entity: &Entity) {
        let matched = (self.predicate)(entity);
        let change = {
            let mut state = self.state.borrow_mut();
            let is_member = state.members.contains_key(&entity.id());
            if matched && !is_member {
                state.members.insert(entity.id(), entity.clone());
                Some(MembershipChange::Entered)
            } else if !matched && is_member {
                state.members.remove(&entity.id());
                Some(MembershipChange::Left)
            } else {
                None
            }
        };
        match change {
            Some(MembershipChange::Entered) => {
                trace!(entity = %entity.id(), "filter: member entered");
                self.notify_added(entity);
            }
            Some(MembershipChange::Left) => {
                trace!(entity = %entity.id(), "filter: member left");
                self.notify_removed(entity);
            }
            None => {}
        }
    }

    fn notify_added(&self, entity: &Entity) {
        let observers = self.observers.borrow_mut().snapshot();
        for observer in observers {
            observer.on_entity_added(entity);
        }
    }

    fn notify_removed(&self, entity: &Entity) {
        let observers = self.observers.borrow_mut().snapshot();
        for observer in observers {
            observer.on_entity_removed(entity);
        }
    }
}

impl SourceObserver for FilterInner {
    fn on_entity_added(&self, entity: &Entity) {
        self.track(entity);
    }

    fn on_entity_removed(&self, entity: &Entity) {
        self.untrack(entity);
    }
}

impl EntityObserver for FilterInner {
    fn on_entity_event(&self, entity: &Entity, event: &EntityEvent) {
        if !self.trigger.matches(event) {
            return;
        }
        if !self.state.borrow().tracked.contains_key(&entity.id()) {
            return;
        }
        self.evaluate(entity);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use std::cell::Cell;

    const RED_TEAM: Tag = Tag(1);
    const HEALTH: ValueKey = ValueKey(1);
    const MANA: ValueKey = ValueKey(2);

    fn alive(entity: &Entity) -> bool {
        entity.try_value::<i32>(HEALTH).is_some_and(|h| h > 0)
    }

    fn ids(entities: &[Entity]) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = entities.iter().map(Entity::id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn construction_scans_existing_members() {
        let world = World::new();
        let hurt = Entity::new();
        hurt.add_value(HEALTH, 0i32).unwrap();
        let healthy = Entity::new();
        healthy.add_value(HEALTH, 10i32).unwrap();
        world.add(&hurt).unwrap();
        world.add(&healthy).unwrap();

        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);
        assert_eq!(ids(&filter.entities()), vec![healthy.id()]);
    }

    #[test]
    fn source_add_evaluates_predicate() {
        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);

        let e = Entity::new();
        e.add_value(HEALTH, 3i32).unwrap();
        world.add(&e).unwrap();
        assert!(filter.contains(&e));

        let dead = Entity::new();
        dead.add_value(HEALTH, -1i32).unwrap();
        world.add(&dead).unwrap();
        assert!(!filter.contains(&dead));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn trigger_event_flips_membership_both_ways() {
        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);

        let e = Entity::new();
        e.add_value(HEALTH, 10i32).unwrap();
        world.add(&e).unwrap();
        assert!(filter.contains(&e));

        e.set_value(HEALTH, 0i32).unwrap();
        assert!(!filter.contains(&e));

        e.set_value(HEALTH, 5i32).unwrap();
        assert!(filter.contains(&e));
    }

    #[test]
    fn nonmatching_entities_are_still_tracked() {
        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);

        // Joins the world failing the predicate (no health at all).
        let e = Entity::new();
        world.add(&e).unwrap();
        assert!(filter.is_empty());

        // A later trigger event must still be able to flip it in.
        e.set_value(HEALTH, 1i32).unwrap();
        assert!(filter.contains(&e));
    }

    #[test]
    fn source_removal_unsubscribes() {
        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);

        let e = Entity::new();
        e.add_value(HEALTH, 10i32).unwrap();
        world.add(&e).unwrap();
        world.remove(&e).unwrap();
        assert!(filter.is_empty());

        // Mutations after source removal must not resurrect membership.
        e.set_value(HEALTH, 99i32).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn narrow_trigger_skips_unrelated_events() {
        let world = World::new();
        let calls = Rc::new(Cell::new(0u32));
        let calls_probe = calls.clone();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), move |entity| {
            calls_probe.set(calls_probe.get() + 1);
            alive(entity)
        });

        let e = Entity::new();
        e.add_value(HEALTH, 10i32).unwrap();
        world.add(&e).unwrap();
        let after_add = calls.get();

        // Events under a different key must not re-evaluate.
        e.set_value(MANA, 50i32).unwrap();
        e.update_value::<i32, _>(MANA, |m| *m += 1).unwrap();
        e.add_tag(RED_TEAM).unwrap();
        assert_eq!(calls.get(), after_add);
        assert!(filter.contains(&e));
    }

    #[test]
    fn filters_compose() {
        let world = World::new();
        let red = Filter::new(&world, Trigger::Tag(RED_TEAM), |e| e.has_tag(RED_TEAM));
        let red_alive = Filter::new(&red, Trigger::Value(HEALTH), alive);

        let e = Entity::new();
        e.add_tag(RED_TEAM).unwrap();
        e.add_value(HEALTH, 10i32).unwrap();
        world.add(&e).unwrap();
        assert!(red.contains(&e));
        assert!(red_alive.contains(&e));

        // Dying drops out of the inner filter only.
        e.set_value(HEALTH, 0i32).unwrap();
        assert!(red.contains(&e));
        assert!(!red_alive.contains(&e));

        // Leaving the team drops out of both.
        e.set_value(HEALTH, 10i32).unwrap();
        e.del_tag(RED_TEAM);
        assert!(!red.contains(&e));
        assert!(!red_alive.contains(&e));
    }

    #[test]
    fn filter_raises_its_own_membership_events() {
        struct Recording {
            added: RefCell<Vec<EntityId>>,
            removed: RefCell<Vec<EntityId>>,
        }

        impl SourceObserver for Recording {
            fn on_entity_added(&self, entity: &Entity) {
                self.added.borrow_mut().push(entity.id());
            }
            fn on_entity_removed(&self, entity: &Entity) {
                self.removed.borrow_mut().push(entity.id());
            }
        }

        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);
        let recording = Rc::new(Recording {
            added: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        });
        EntitySource::subscribe(&filter, {
            let recording_dyn: Rc<dyn SourceObserver> = recording.clone();
            let weak: Weak<dyn SourceObserver> = Rc::downgrade(&recording_dyn);
            weak
        });

        let e = Entity::new();
        e.add_value(HEALTH, 1i32).unwrap();
        world.add(&e).unwrap();
        e.set_value(HEALTH, 0i32).unwrap();
        e.set_value(HEALTH, 2i32).unwrap();
        world.remove(&e).unwrap();

        assert_eq!(*recording.added.borrow(), vec![e.id(), e.id()]);
        assert_eq!(*recording.removed.borrow(), vec![e.id(), e.id()]);
    }

    #[test]
    fn snapshot_tolerates_mutation_during_iteration() {
        let world = World::new();
        let filter = Filter::new(&world, Trigger::Value(HEALTH), alive);
        for i in 0..4 {
            let e = Entity::new();
            e.add_value(HEALTH, i + 1).unwrap();
            world.add(&e).unwrap();
        }
        for entity in filter.entities() {
            // Kill mid-iteration; the in-progress snapshot stays valid.
            entity.set_value(HEALTH, 0i32).unwrap();
        }
        assert!(filter.is_empty());
    }
}
