//! Weft Runtime
//!
//! Demo harness: loads the engine configuration, registers a handful of
//! systems and runs a fixed number of simulation ticks.

mod components;
mod systems;

use anyhow::{Context, Result};
use components::{Grounded, Label, Position, Velocity, HEALTH_ID};
use systems::{BoundsSystem, DamageSystem, LifecycleSystem, MotionSystem};
use weft_core::ecs::{SystemRegistry, World};
use weft_core::work::WorkManager;
use weft_core::EngineConfig;
use weft_metrics::TickTimer;

const TICKS: u64 = 600;
const REPORT_EVERY: u64 = 120;
const CHECKPOINT_TICK: u64 = TICKS / 2;

/// Create a world with every demo component registered.
pub(crate) fn build_world(config: EngineConfig) -> Result<World> {
    let world = World::try_new(config)?;
    world.register::<Position>();
    world.register::<Velocity>();
    world.register::<Grounded>();
    world.register::<Label>();
    world.register_raw(
        HEALTH_ID,
        "Health",
        std::mem::size_of::<components::Health>(),
        std::mem::align_of::<components::Health>(),
    );
    Ok(world)
}

fn load_config() -> Result<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading config from {path}")),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Weft v{}", weft_core::VERSION);
    let config = load_config()?;
    tracing::info!(
        chunk_size = config.storage.chunk_size,
        workers = config.work.worker_count,
        queue = config.work.queue_capacity,
        "configuration loaded"
    );

    let work = WorkManager::new(&config.work)?;
    let mut world = build_world(config)?;

    let mut damage = DamageSystem::new(0.5);
    damage.spawn_crate(&mut world, "supply", -20.0, 60.0)?;
    damage.spawn_crate(&mut world, "ammo", 0.0, 150.0)?;
    damage.spawn_crate(&mut world, "fuel", 20.0, 400.0)?;

    let mut systems = SystemRegistry::new();
    let motion = systems.register(MotionSystem::new(0.002), None)?;
    systems.register(BoundsSystem::new(), None)?;
    systems.register(damage, None)?;
    // Spawned particles should move on their first tick.
    systems.register(LifecycleSystem::new(64, 20_000), Some(motion))?;
    tracing::info!(order = ?systems.names(), "systems registered");

    let mut timer = TickTimer::new(REPORT_EVERY as usize);
    let mut checkpoint = None;
    for tick in 1..=TICKS {
        timer.begin();
        systems.update(&mut world, &work)?;
        timer.end();

        if tick == CHECKPOINT_TICK {
            checkpoint = Some(world.snapshot());
        }

        if tick % REPORT_EVERY == 0 {
            let (min, max) = timer.tick_time_range_ms();
            tracing::info!(
                tick,
                entities = world.entity_count(),
                archetypes = world.archetypes().len(),
                tick_ms = %format!("{:.3}", timer.tick_time_ms()),
                range_ms = %format!("{min:.3}..{max:.3}"),
                tps = %format!("{:.0}", timer.ticks_per_second()),
                "tick report"
            );
        }
    }

    for (name, timing) in systems.profiler().iter() {
        tracing::info!(
            system = name,
            calls = timing.calls,
            avg_us = timing.average().as_micros() as u64,
            "system timing"
        );
    }
    if let Some(checkpoint) = &checkpoint {
        tracing::info!(
            tick = CHECKPOINT_TICK,
            entities = checkpoint.entity_count(),
            archetypes = checkpoint.archetypes().len(),
            "checkpoint"
        );
    }
    tracing::info!(jobs = work.executed_jobs(), "shutting down");

    Ok(())
}
