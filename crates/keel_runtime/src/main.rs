//! Keel Runtime
//!
//! Headless driver for the storage engine: loads a scene configuration,
//! runs a particle simulation for a number of frames and logs what the
//! scene measured.
//!
//! Usage: `keel [CONFIG.json] [FRAMES]`

use anyhow::{Context, Result};
use glam::Vec2;
use keel_core::ecs::{
    ComponentHooks, EcsScene, EntityId, FnSystem, HookContext, PostFrameQueue, QuerySystem,
};
use keel_core::SceneConfig;

const DEFAULT_FRAMES: u64 = 600;
const DT: f32 = 1.0 / 60.0;
const BOUNDS: f32 = 100.0;
const SPAWN_PER_FRAME: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct Position(Vec2);

#[derive(Debug, Clone, Copy)]
struct Velocity(Vec2);

/// Frames left before the particle is removed.
#[derive(Debug, Clone, Copy)]
struct Lifetime(u32);

/// Marks particles that have hit the boundary at least once.
#[derive(Debug, Clone, Copy)]
struct Bounced;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SceneConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => SceneConfig::default(),
    };
    let frames = match args.next() {
        Some(raw) => raw.parse::<u64>().with_context(|| format!("invalid frame count '{raw}'"))?,
        None => DEFAULT_FRAMES,
    };

    tracing::info!("Keel v{}", keel_core::VERSION);
    tracing::info!(?config, frames, metrics = keel_metrics::enabled(), "starting simulation");

    let mut scene = build_scene(config)?;
    for _ in 0..frames {
        scene.update()?;
    }

    report(&scene);
    Ok(())
}

fn build_scene(config: SceneConfig) -> Result<EcsScene> {
    let mut scene = EcsScene::with_config(config)?;
    scene.register_component::<Position>()?;
    scene.register_component::<Velocity>()?;
    scene.register_component::<Lifetime>()?;
    scene.register_component_with(ComponentHooks::<Bounced>::new().on_add(
        |ctx: &HookContext<'_>, _: &mut Bounced| {
            if let Some(Position(at)) = ctx.get::<Position>() {
                tracing::trace!(entity = %ctx.entity(), x = at.x, y = at.y, "first bounce");
            }
        },
    ))?;

    let mut seed: u32 = 0x9E37_79B9;
    scene.add_system(FnSystem::new("spawn", move |scene: &mut EcsScene| {
        for _ in 0..SPAWN_PER_FRAME {
            let angle = next_unit(&mut seed) * std::f32::consts::TAU;
            let speed = 10.0 + next_unit(&mut seed) * 40.0;
            let life = 60 + (next_unit(&mut seed) * 240.0) as u32;
            keel_core::spawn!(
                scene,
                Position(Vec2::ZERO),
                Velocity(Vec2::from_angle(angle) * speed),
                Lifetime(life)
            )?;
        }
        Ok(())
    }));

    scene.add_system(QuerySystem::<(Position, Velocity)>::new(
        "movement",
        |queue: &mut PostFrameQueue, entity: EntityId, pos: &mut Position, vel: &mut Velocity| {
            pos.0 += vel.0 * DT;
            let mut bounced = false;
            if pos.0.x.abs() > BOUNDS {
                vel.0.x = -vel.0.x;
                bounced = true;
            }
            if pos.0.y.abs() > BOUNDS {
                vel.0.y = -vel.0.y;
                bounced = true;
            }
            pos.0 = pos.0.clamp(Vec2::splat(-BOUNDS), Vec2::splat(BOUNDS));
            if bounced {
                queue.set_component(entity, Bounced);
            }
        },
    ));

    scene.add_system(QuerySystem::<(Lifetime,)>::new(
        "expire",
        |queue: &mut PostFrameQueue, entity: EntityId, life: &mut Lifetime| {
            life.0 = life.0.saturating_sub(1);
            if life.0 == 0 {
                queue.remove_entity(entity);
            }
        },
    ));

    Ok(scene)
}

/// xorshift32 mapped to [0, 1).
fn next_unit(state: &mut u32) -> f32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    (x >> 8) as f32 / (1u32 << 24) as f32
}

fn report(scene: &EcsScene) {
    let (min_ms, max_ms) = scene.frame_stats().min_max_ms();
    tracing::info!(
        frames = scene.frame(),
        entities = scene.entity_count(),
        tables = scene.entity_sets().len(),
        avg_ms = scene.frame_stats().average_ms(),
        min_ms,
        max_ms,
        "simulation finished"
    );

    for set in scene.entity_sets() {
        tracing::info!(archetype = %set.archetype(), rows = set.len(), capacity = set.capacity(), "table");
    }
    for (name, timing) in scene.profiler().iter() {
        tracing::info!(system = name, calls = timing.calls, avg = ?timing.average(), "system timing");
    }
    for (name, value) in scene.counters().iter() {
        tracing::info!(counter = name, value, "counter");
    }
    let pools = scene.pool_stats();
    tracing::info!(
        rented = pools.rented,
        reused = pools.reused,
        returned = pools.returned,
        retained = pools.retained,
        "array pools"
    );
}
