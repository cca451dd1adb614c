//! Per-frame driving of an entity world.
//!
//! The [`FrameLoop`] is the host-side driver: each call to
//! [`FrameLoop::advance`] performs zero or more fixed steps (one
//! `fixed_tick(fixed_dt)` pass per accumulated interval), then one `tick(dt)`
//! pass, then one `late_tick(dt)` pass over the world's members. Entities
//! that are not enabled drop the calls silently, so the driver never needs to
//! know individual lifecycle states.
//!
//! Each pass iterates a fresh snapshot of the member set, so behaviours may
//! add or remove entities mid-frame; entities added during a pass are picked
//! up by the next pass.
//!
//! # Example
//!
//! ```
//! use animus_core::prelude::*;
//! use animus_engine::frame::{FrameConfig, FrameLoop};
//!
//! let world = World::new();
//! let entity = Entity::new();
//! entity.spawn().unwrap();
//! world.add(&entity).unwrap();
//!
//! let mut frame_loop = FrameLoop::new(world, FrameConfig::default());
//! for _ in 0..10 {
//!     frame_loop.advance(1.0 / 60.0);
//! }
//! assert_eq!(frame_loop.frame_count(), 10);
//! ```

use animus_core::world::World;
use serde::{Deserialize, Serialize};
use tracing::trace;

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Configuration for the frame loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Fixed time step in seconds per `fixed_tick` pass. Must be positive
    /// and finite.
    pub fixed_dt: f32,
    /// Upper bound on fixed steps per frame. After a long stall the
    /// accumulator is clamped instead of catching up unboundedly.
    pub max_fixed_steps: u32,
}

impl Default for FrameConfig {
    /// Defaults to 60 Hz fixed stepping with at most 5 steps per frame.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_fixed_steps: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Drives `fixed_tick` / `tick` / `late_tick` over a [`World`] each frame.
pub struct FrameLoop {
    world: World,
    config: FrameConfig,
    accumulator: f32,
    frames: u64,
    fixed_steps: u64,
    elapsed: f64,
}

impl FrameLoop {
    /// Create a frame loop over `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite, or if
    /// `config.max_fixed_steps` is zero.
    pub fn new(world: World, config: FrameConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        assert!(
            config.max_fixed_steps > 0,
            "max_fixed_steps must be at least 1"
        );
        Self {
            world,
            config,
            accumulator: 0.0,
            frames: 0,
            fixed_steps: 0,
            elapsed: 0.0,
        }
    }

    /// Advance one frame by `dt` seconds of host time.
    ///
    /// Performs the accumulated fixed steps, then the variable passes, in
    /// the fixed -> tick -> late order.
    pub fn advance(&mut self, dt: f32) {
        self.accumulator += dt;

        let mut steps = 0;
        while self.accumulator >= self.config.fixed_dt && steps < self.config.max_fixed_steps {
            for entity in self.world.entities() {
                entity.fixed_tick(self.config.fixed_dt);
            }
            self.accumulator -= self.config.fixed_dt;
            steps += 1;
            self.fixed_steps += 1;
        }
        if steps == self.config.max_fixed_steps && self.accumulator > self.config.fixed_dt {
            // Stalled badly; drop the backlog rather than spiral.
            trace!(backlog = self.accumulator, "frame: clamping fixed-step backlog");
            self.accumulator = self.config.fixed_dt;
        }

        for entity in self.world.entities() {
            entity.tick(dt);
        }
        for entity in self.world.entities() {
            entity.late_tick(dt);
        }

        self.frames += 1;
        self.elapsed += f64::from(dt);
    }

    // -- accessors ----------------------------------------------------------

    /// Frames advanced so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Fixed steps performed so far.
    pub fn fixed_step_count(&self) -> u64 {
        self.fixed_steps
    }

    /// Total host time fed into the loop, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Total simulated fixed time, in seconds. Computed as
    /// `fixed_step_count * fixed_dt` to avoid drift from accumulation.
    pub fn fixed_time(&self) -> f64 {
        self.fixed_steps as f64 * f64::from(self.config.fixed_dt)
    }

    /// The driven world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The configuration this loop was created with.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
