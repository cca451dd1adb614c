//! Benchmarks for the per-frame hot paths: behaviour dispatch, world index
//! lookup, and incremental filter upkeep.
//!
//! Run with: `cargo bench --bench entity_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use animus_core::prelude::*;

const TEAM: Tag = Tag(1);
const SCORE: ValueKey = ValueKey(1);

// ---------------------------------------------------------------------------
// Benchmark behaviours
// ---------------------------------------------------------------------------

struct Accumulator {
    total: f32,
}

impl Tick for Accumulator {
    fn tick(&mut self, _entity: &Entity, dt: f32) {
        self.total += dt;
    }
}

impl Behaviour for Accumulator {
    fn as_tick(&mut self) -> Option<&mut dyn Tick> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An enabled entity with `behaviour_count` tick behaviours attached.
fn ticking_entity(behaviour_count: usize) -> Entity {
    let entity = Entity::new();
    for _ in 0..behaviour_count {
        entity.add_behaviour(Accumulator { total: 0.0 }).unwrap();
    }
    entity.init().unwrap();
    entity.enable().unwrap();
    entity
}

/// A world with `entity_count` members, half of them on the team.
fn populated_world(entity_count: usize) -> World {
    let world = World::new();
    for i in 0..entity_count {
        let entity = Entity::new();
        if i % 2 == 0 {
            entity.add_tag(TEAM).unwrap();
        }
        entity.add_value(SCORE, i as i64).unwrap();
        world.add(&entity).unwrap();
    }
    world
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_tick_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_dispatch");
    for behaviour_count in [1usize, 8, 64] {
        let entity = ticking_entity(behaviour_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(behaviour_count),
            &entity,
            |b, entity| {
                b.iter(|| {
                    entity.tick(black_box(1.0 / 60.0));
                });
            },
        );
    }
    group.finish();
}

fn bench_tag_index_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_index_lookup");
    for entity_count in [100usize, 1_000] {
        let world = populated_world(entity_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(entity_count),
            &world,
            |b, world| {
                b.iter(|| {
                    let members = world.entities_by_tag(black_box(TEAM));
                    black_box(members.len())
                });
            },
        );
    }
    group.finish();
}

fn bench_filter_upkeep(c: &mut Criterion) {
    // One tracked entity toggling in and out of the filter per iteration;
    // measures the event -> re-evaluate -> membership transition path.
    let world = populated_world(1_000);
    let entity = Entity::new();
    entity.add_value(SCORE, 0i64).unwrap();
    world.add(&entity).unwrap();
    let filter = Filter::new(&world, Trigger::Value(SCORE), |e| {
        e.try_value::<i64>(SCORE).is_some_and(|score| score > 0)
    });

    c.bench_function("filter_upkeep_toggle", |b| {
        let mut score = 0i64;
        b.iter(|| {
            score = if score > 0 { 0 } else { 1 };
            entity.set_value(SCORE, black_box(score)).unwrap();
            black_box(filter.len())
        });
    });
}

criterion_group!(
    benches,
    bench_tick_dispatch,
    bench_tag_index_lookup,
    bench_filter_upkeep
);
criterion_main!(benches);
