//! The [`World`]: an indexed collection of live entities.
//!
//! A world holds non-owning handles to the entities added to it and keeps
//! two secondary indices current: tag -> entities holding that tag, and
//! value key -> entities holding that key. Index maintenance is incremental:
//! membership is paid for once at [`World::add`] (one scan of the entity's
//! current tags/keys plus one event subscription), after which each tag or
//! value change on a member costs an O(1) amortized index update. No
//! operation rescans the member set.
//!
//! Invariant: an entity appears in a tag/value index if and only if it is a
//! current member and currently holds that tag/key.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::entity::{Entity, EntityId};
use crate::event::{EntityEvent, EntityObserver, ObserverList, SourceObserver, SubscriptionId};
use crate::filter::EntitySource;
use crate::tag::Tag;
use crate::value::ValueKey;
use crate::AnimusError;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorldState {
    members: HashMap<EntityId, Entity>,
    /// Per-member subscription to the entity's change events, removed
    /// explicitly on [`World::remove`].
    subscriptions: HashMap<EntityId, SubscriptionId>,
    by_tag: HashMap<Tag, Vec<Entity>>,
    by_key: HashMap<ValueKey, Vec<Entity>>,
}

struct WorldInner {
    state: RefCell<WorldState>,
    observers: RefCell<ObserverList<dyn SourceObserver>>,
}

/// A mutable collection of live entities with tag/value-key lookup.
///
/// `World` is a cheap handle; clones share the same member set. Entity
/// lifetime is managed by the entities' creators (or a pool), never by the
/// world.
#[derive(Clone)]
pub struct World {
    inner: Rc<WorldInner>,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(WorldInner {
                state: RefCell::new(WorldState::default()),
                observers: RefCell::new(ObserverList::new()),
            }),
        }
    }

    /// Add an entity: index its current tags and value keys once and
    /// subscribe to its change events so the indices stay current.
    ///
    /// # Errors
    ///
    /// [`AnimusError::AlreadyMember`] if the entity is already a member.
    pub fn add(&self, entity: &Entity) -> Result<(), AnimusError> {
        if self.inner.state.borrow().members.contains_key(&entity.id()) {
            return Err(AnimusError::AlreadyMember {
                entity: entity.id(),
            });
        }
        let inner_dyn: Rc<dyn EntityObserver> = self.inner.clone();
        let observer: Weak<dyn EntityObserver> = Rc::downgrade(&inner_dyn);
        let subscription = entity.subscribe(observer);
        {
            let mut state = self.inner.state.borrow_mut();
            state.members.insert(entity.id(), entity.clone());
            state.subscriptions.insert(entity.id(), subscription);
            for tag in entity.tags() {
                state.by_tag.entry(tag).or_default().push(entity.clone());
            }
            for key in entity.value_keys() {
                state.by_key.entry(key).or_default().push(entity.clone());
            }
        }
        debug!(entity = %entity.id(), "world: entity added");
        self.notify_added(entity);
        Ok(())
    }

    /// Remove an entity: unsubscribe from its events and drop it from every
    /// index, then fire the removal notification.
    ///
    /// # Errors
    ///
    /// [`AnimusError::NotMember`] if the entity is not a member.
    pub fn remove(&self, entity: &Entity) -> Result<(), AnimusError> {
        let subscription = {
            let mut state = self.inner.state.borrow_mut();
            if state.members.remove(&entity.id()).is_none() {
                return Err(AnimusError::NotMember {
                    entity: entity.id(),
                });
            }
            let subscription = state.subscriptions.remove(&entity.id());
            // The membership invariant means the entity's current tags/keys
            // are exactly the index lists it sits in.
            for tag in entity.tags() {
                if let Some(list) = state.by_tag.get_mut(&tag) {
                    list.retain(|member| member.id() != entity.id());
                }
            }
            for key in entity.value_keys() {
                if let Some(list) = state.by_key.get_mut(&key) {
                    list.retain(|member| member.id() != entity.id());
                }
            }
            subscription
        };
        if let Some(subscription) = subscription {
            entity.unsubscribe(subscription);
        }
        debug!(entity = %entity.id(), "world: entity removed");
        self.notify_removed(entity);
        Ok(())
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.contains_id(entity.id())
    }

    pub fn contains_id(&self, id: EntityId) -> bool {
        self.inner.state.borrow().members.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().members.is_empty()
    }

    /// Snapshot of the current members, in unspecified order. Safe to
    /// iterate while members mutate or membership changes.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.state.borrow().members.values().cloned().collect()
    }

    /// Snapshot of the members currently holding `tag`. O(1) index lookup
    /// plus one defensive copy of the list.
    pub fn entities_by_tag(&self, tag: Tag) -> Vec<Entity> {
        self.inner
            .state
            .borrow()
            .by_tag
            .get(&tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the members currently holding a value under `key`.
    pub fn entities_by_key(&self, key: ValueKey) -> Vec<Entity> {
        self.inner
            .state
            .borrow()
            .by_key
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    fn notify_added(&self, entity: &Entity) {
        let observers = self.inner.observers.borrow_mut().snapshot();
        for observer in observers {
            observer.on_entity_added(entity);
        }
    }

    fn notify_removed(&self, entity: &Entity) {
        let observers = self.inner.observers.borrow_mut().snapshot();
        for observer in observers {
            observer.on_entity_removed(entity);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("World")
            .field("entity_count", &state.members.len())
            .field("tag_index_count", &state.by_tag.len())
            .field("key_index_count", &state.by_key.len())
            .finish()
    }
}

impl EntitySource for World {
    fn members(&self) -> Vec<Entity> {
        self.entities()
    }

    fn contains_id(&self, id: EntityId) -> bool {
        World::contains_id(self, id)
    }

    fn subscribe(&self, observer: Weak<dyn SourceObserver>) -> SubscriptionId {
        self.inner.observers.borrow_mut().subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.borrow_mut().unsubscribe(id)
    }
}

// ---------------------------------------------------------------------------
// Index maintenance
// ---------------------------------------------------------------------------

impl EntityObserver for WorldInner {
    fn on_entity_event(&self, entity: &Entity, event: &EntityEvent) {
        let mut state = self.state.borrow_mut();
        if !state.members.contains_key(&entity.id()) {
            // Stale delivery after removal; the subscription is already gone.
            return;
        }
        match event {
            EntityEvent::TagAdded(tag) => {
                trace!(entity = %entity.id(), tag = %tag, "world: index tag");
                state.by_tag.entry(*tag).or_default().push(entity.clone());
            }
            EntityEvent::TagRemoved(tag) => {
                if let Some(list) = state.by_tag.get_mut(tag) {
                    list.retain(|member| member.id() != entity.id());
                }
            }
            EntityEvent::TagsCleared(tags) => {
                for tag in tags {
                    if let Some(list) = state.by_tag.get_mut(tag) {
                        list.retain(|member| member.id() != entity.id());
                    }
                }
            }
            EntityEvent::ValueAdded(key) => {
                trace!(entity = %entity.id(), key = %key, "world: index value key");
                state.by_key.entry(*key).or_default().push(entity.clone());
            }
            EntityEvent::ValueRemoved(key) => {
                if let Some(list) = state.by_key.get_mut(key) {
                    list.retain(|member| member.id() != entity.id());
                }
            }
            EntityEvent::ValuesCleared(keys) => {
                for key in keys {
                    if let Some(list) = state.by_key.get_mut(key) {
                        list.retain(|member| member.id() != entity.id());
                    }
                }
            }
            // Value overwrites do not change index shape.
            EntityEvent::ValueChanged(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const COIN: Tag = Tag(1);
    const ENEMY: Tag = Tag(2);
    const MONEY: ValueKey = ValueKey(10);
    const HEALTH: ValueKey = ValueKey(11);

    fn ids(entities: &[Entity]) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = entities.iter().map(Entity::id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn add_indexes_existing_tags_and_keys() {
        let world = World::new();
        let e = Entity::new();
        e.add_tag(COIN).unwrap();
        e.add_value(MONEY, 10u32).unwrap();

        world.add(&e).unwrap();
        assert_eq!(ids(&world.entities_by_tag(COIN)), vec![e.id()]);
        assert_eq!(ids(&world.entities_by_key(MONEY)), vec![e.id()]);
        assert!(world.entities_by_tag(ENEMY).is_empty());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let world = World::new();
        let e = Entity::new();
        world.add(&e).unwrap();
        assert!(matches!(
            world.add(&e),
            Err(AnimusError::AlreadyMember { .. })
        ));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn remove_non_member_is_rejected() {
        let world = World::new();
        let e = Entity::new();
        assert!(matches!(
            world.remove(&e),
            Err(AnimusError::NotMember { .. })
        ));
    }

    #[test]
    fn member_mutations_keep_indices_current() {
        let world = World::new();
        let e = Entity::new();
        world.add(&e).unwrap();
        assert!(world.entities_by_tag(COIN).is_empty());

        e.add_tag(COIN).unwrap();
        assert_eq!(ids(&world.entities_by_tag(COIN)), vec![e.id()]);

        e.del_tag(COIN);
        assert!(world.entities_by_tag(COIN).is_empty());

        e.set_value(HEALTH, 5u32).unwrap();
        assert_eq!(ids(&world.entities_by_key(HEALTH)), vec![e.id()]);

        // Overwrites keep the entity indexed exactly once.
        e.set_value(HEALTH, 6u32).unwrap();
        assert_eq!(world.entities_by_key(HEALTH).len(), 1);

        e.del_value(HEALTH);
        assert!(world.entities_by_key(HEALTH).is_empty());
    }

    #[test]
    fn remove_unsubscribes_from_entity_events() {
        let world = World::new();
        let e = Entity::new();
        world.add(&e).unwrap();
        world.remove(&e).unwrap();

        // Mutations after removal must not resurrect index entries.
        e.add_tag(COIN).unwrap();
        e.add_value(MONEY, 1u32).unwrap();
        assert!(world.entities_by_tag(COIN).is_empty());
        assert!(world.entities_by_key(MONEY).is_empty());
        assert!(!world.contains(&e));
    }

    #[test]
    fn remove_drops_index_entries() {
        let world = World::new();
        let e = Entity::new();
        e.add_tag(COIN).unwrap();
        e.add_value(MONEY, 10u32).unwrap();
        world.add(&e).unwrap();
        world.remove(&e).unwrap();

        assert!(world.entities_by_tag(COIN).is_empty());
        assert!(world.entities_by_key(MONEY).is_empty());
    }

    #[test]
    fn disposing_a_member_empties_its_index_entries() {
        let world = World::new();
        let e = Entity::new();
        e.add_tag(COIN).unwrap();
        e.add_value(MONEY, 10u32).unwrap();
        world.add(&e).unwrap();

        // Dispose fires bulk cleared events; the world stays subscribed and
        // empties the entity's index entries, though membership remains.
        e.dispose().unwrap();
        assert!(world.entities_by_tag(COIN).is_empty());
        assert!(world.entities_by_key(MONEY).is_empty());
        assert!(world.contains(&e));
    }

    #[test]
    fn indices_cover_multiple_members() {
        let world = World::new();
        let a = Entity::new();
        let b = Entity::new();
        let c = Entity::new();
        a.add_tag(COIN).unwrap();
        b.add_tag(COIN).unwrap();
        c.add_tag(ENEMY).unwrap();

        world.add(&a).unwrap();
        world.add(&b).unwrap();
        world.add(&c).unwrap();

        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(ids(&world.entities_by_tag(COIN)), expected);
        assert_eq!(ids(&world.entities_by_tag(ENEMY)), vec![c.id()]);
        assert_eq!(world.len(), 3);
    }

    #[test]
    fn readd_after_remove_works() {
        let world = World::new();
        let e = Entity::new();
        e.add_tag(COIN).unwrap();
        world.add(&e).unwrap();
        world.remove(&e).unwrap();
        world.add(&e).unwrap();

        assert_eq!(ids(&world.entities_by_tag(COIN)), vec![e.id()]);
        e.del_tag(COIN);
        assert!(world.entities_by_tag(COIN).is_empty());
    }

    #[test]
    fn entities_snapshot_tolerates_mutation() {
        let world = World::new();
        for _ in 0..4 {
            world.add(&Entity::new()).unwrap();
        }
        for entity in world.entities() {
            // Structural change mid-iteration is observed next snapshot.
            world.remove(&entity).unwrap();
        }
        assert!(world.is_empty());
    }
}
