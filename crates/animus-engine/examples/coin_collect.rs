//! Minimal coin-collector wired through the full stack: an installer
//! configures entities, a world indexes them, a filter watches the coins,
//! and the frame loop drives a collector behaviour that recycles collected
//! coins through a pool.
//!
//! Run with: `cargo run --example coin_collect`

use std::cell::RefCell;
use std::rc::Rc;

use animus_core::prelude::*;
use animus_engine::{EntityPool, FrameConfig, FrameLoop};

const COIN: Tag = Tag(1);

const MONEY: ValueKey = ValueKey(1);
const WALLET: ValueKey = ValueKey(2);
const CELL: ValueKey = ValueKey(3);

struct CollectCoins {
    world: World,
    coins: Filter,
    pool: Rc<RefCell<EntityPool>>,
}

impl Tick for CollectCoins {
    fn tick(&mut self, player: &Entity, _dt: f32) {
        let Some(player_cell) = player.try_value::<i32>(CELL) else {
            return;
        };
        for coin in self.coins.entities() {
            if coin.try_value::<i32>(CELL) != Some(player_cell) {
                continue;
            }
            let payout = coin.value::<i64>(MONEY).unwrap();
            player
                .update_value::<i64, _>(WALLET, |wallet| *wallet += payout)
                .unwrap();
            self.world.remove(&coin).unwrap();
            self.pool.borrow_mut().give_back(coin).unwrap();
        }
    }
}

impl Behaviour for CollectCoins {
    fn as_tick(&mut self) -> Option<&mut dyn Tick> {
        Some(self)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let world = World::new();
    let coins = Filter::new(&world, Trigger::Tag(COIN), |e| e.has_tag(COIN));

    let mut pool = EntityPool::new(|| {
        let coin = Entity::named("coin");
        coin.add_tag(COIN).unwrap();
        coin.add_value(MONEY, 10i64).unwrap();
        coin
    });
    pool.warm(4);
    let pool = Rc::new(RefCell::new(pool));

    // Scatter four coins over cells 0..4.
    for cell in 0..4i32 {
        let coin = pool.borrow_mut().rent().unwrap();
        coin.set_value(CELL, cell).unwrap();
        world.add(&coin).unwrap();
    }

    let player = Entity::named("player");
    player.add_value(WALLET, 100i64).unwrap();
    player.add_value(CELL, 0i32).unwrap();
    player
        .add_behaviour(CollectCoins {
            world: world.clone(),
            coins: coins.clone(),
            pool: pool.clone(),
        })
        .unwrap();
    player.spawn().unwrap();
    world.add(&player).unwrap();

    // Walk the player across the four cells, one per frame.
    let mut frame_loop = FrameLoop::new(world.clone(), FrameConfig::default());
    for cell in 0..4i32 {
        player.set_value(CELL, cell).unwrap();
        frame_loop.advance(1.0 / 60.0);
        println!(
            "frame {}: wallet = {}, coins left = {}",
            frame_loop.frame_count(),
            player.value::<i64>(WALLET).unwrap(),
            coins.len(),
        );
    }

    assert_eq!(player.value::<i64>(WALLET).unwrap(), 140);
    assert_eq!(pool.borrow().idle_count(), 4);
    println!("collected everything; pool idle = {}", pool.borrow().idle_count());
}
