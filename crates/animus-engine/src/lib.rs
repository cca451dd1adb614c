//! Animus Engine -- the host-side driver layer for the
//! [`animus-core`](animus_core) entity runtime.
//!
//! Where `animus-core` defines what entities, worlds, and filters *are*,
//! this crate supplies the two pieces a host application wires them up with:
//!
//! - [`frame::FrameLoop`]: per-frame driving with fixed-timestep framing
//!   (`fixed_tick` passes, then `tick`, then `late_tick`).
//! - [`pool::EntityPool`]: pooled spawn/despawn reuse for high-churn
//!   entities.
//!
//! ```
//! use animus_core::prelude::*;
//! use animus_engine::{EntityPool, FrameConfig, FrameLoop};
//!
//! let world = World::new();
//! let pool_world = world.clone();
//! let mut bullets = EntityPool::new(move || {
//!     let bullet = Entity::named("bullet");
//!     pool_world.add(&bullet).unwrap();
//!     bullet
//! });
//!
//! let bullet = bullets.rent().unwrap();
//! let mut frame_loop = FrameLoop::new(world, FrameConfig::default());
//! frame_loop.advance(1.0 / 60.0);
//! bullets.give_back(bullet).unwrap();
//! ```

pub mod frame;
pub mod pool;

pub use frame::{FrameConfig, FrameLoop};
pub use pool::EntityPool;
