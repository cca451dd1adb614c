//! Animus -- an entity-composition runtime.
//!
//! Entities are data-oriented containers: a sparse set of integer
//! [`Tag`](tag::Tag)s, a store of integer-keyed typed values, and an ordered
//! collection of attached [`Behaviour`](behaviour::Behaviour)s, all driven
//! through an explicit lifecycle state machine (init -> enable ->
//! tick/fixed-tick/late-tick -> disable -> dispose, with spawn/despawn
//! framing for pooled reuse). A [`World`](world::World) indexes live
//! entities by tag and value key, and [`Filter`](filter::Filter)s maintain
//! predicate views over a world (or over other filters) incrementally, from
//! change notifications instead of rescans.
//!
//! Everything is single-threaded and synchronous; see the module docs of
//! [`entity`] for the re-entrancy rules.
//!
//! # Quick Start
//!
//! ```
//! use animus_core::prelude::*;
//!
//! const COIN: Tag = Tag(1);
//! const MONEY: ValueKey = ValueKey(1);
//!
//! let coin = Entity::named("coin");
//! coin.add_tag(COIN).unwrap();
//! coin.add_value(MONEY, 10i64).unwrap();
//!
//! let world = World::new();
//! world.add(&coin).unwrap();
//!
//! // A live view of every coin in the world.
//! let coins = Filter::new(&world, Trigger::Tag(COIN), |e| e.has_tag(COIN));
//! assert_eq!(coins.len(), 1);
//!
//! coin.del_tag(COIN);
//! assert!(coins.is_empty());
//! ```

#![deny(unsafe_code)]

pub mod behaviour;
pub mod entity;
pub mod event;
pub mod filter;
pub mod install;
pub mod tag;
pub mod value;
pub mod world;

use entity::{EntityId, EntityState};
use value::ValueKey;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity runtime operations.
///
/// Recoverable misses on hot paths go through bool/`Option`-returning try
/// variants instead ([`Entity::try_value`](entity::Entity::try_value),
/// [`Entity::del_tag`](entity::Entity::del_tag), ...); these variants cover
/// contract violations.
#[derive(Debug, thiserror::Error)]
pub enum AnimusError {
    /// A lifecycle method was called from a state that does not permit it.
    #[error("cannot {operation} entity {entity} while {state:?}")]
    InvalidStateTransition {
        entity: EntityId,
        operation: &'static str,
        state: EntityState,
    },

    /// An operation was attempted after `dispose()` completed.
    #[error("entity {entity} has been disposed")]
    Disposed { entity: EntityId },

    /// `add_value` on an occupied key.
    #[error("value key {key} is already occupied on entity {entity}")]
    DuplicateKey { entity: EntityId, key: ValueKey },

    /// A typed read on an empty key.
    #[error("no value under key {key} on entity {entity}")]
    KeyNotFound { entity: EntityId, key: ValueKey },

    /// A typed read with the wrong type argument.
    #[error("value under key {key} on entity {entity} is {found}, not {expected}")]
    TypeMismatch {
        entity: EntityId,
        key: ValueKey,
        expected: &'static str,
        found: &'static str,
    },

    /// `World::add` on an entity that is already a member.
    #[error("entity {entity} is already a member of this world")]
    AlreadyMember { entity: EntityId },

    /// `World::remove` on an entity that is not a member.
    #[error("entity {entity} is not a member of this world")]
    NotMember { entity: EntityId },

    /// Removal or query of a behaviour type that is not attached.
    #[error("no behaviour of type {type_name} attached to entity {entity}")]
    BehaviourNotFound {
        entity: EntityId,
        type_name: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::behaviour::{
        Behaviour, Despawn, Disable, Dispose, Enable, FixedTick, Init, LateTick, Spawn, Tick,
    };
    pub use crate::entity::{Entity, EntityId, EntityState};
    pub use crate::event::{EntityEvent, EntityObserver, SourceObserver, SubscriptionId};
    pub use crate::filter::{EntitySource, Filter, Trigger};
    pub use crate::install::Installer;
    pub use crate::tag::Tag;
    pub use crate::value::ValueKey;
    pub use crate::world::World;
    pub use crate::AnimusError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
