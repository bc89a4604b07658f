// systems.rs - Demo systems driving the simulation
//
// Motion runs as a task graph: the clock advances, the wind field is
// recomputed in parallel, velocities are damped per entity and finally
// positions integrate. Lifecycle and damage systems make structural changes
// from the main thread through stable references.

use crate::components::{Grounded, Health, Label, Position, Velocity, HEALTH_ID};
use glam::Vec3;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use weft_core::ecs::{EntityBuilder, StableEntity, System, World};
use weft_core::spawn;
use weft_core::task::{
    CustomParallelTask, ParallelTask, ParallelTaskWithIndex, SingleTask, Task, TaskError,
};
use weft_core::work::WorkManager;

pub const TICK_SECONDS: f32 = 1.0 / 60.0;
pub const FLOOR_Y: f32 = 0.0;
pub const ARENA_HALF_WIDTH: f32 = 50.0;
const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);
const WIND_CELLS: usize = 64;

// ============================================================================
// Motion
// ============================================================================

/// Horizontal wind strength per column of the arena, rebuilt every tick.
struct WindField {
    tick: AtomicU64,
    cells: Vec<AtomicU32>,
}

impl WindField {
    fn new(cells: usize) -> Self {
        Self {
            tick: AtomicU64::new(0),
            cells: (0..cells).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn cell_for(&self, x: f32) -> usize {
        let t = ((x + ARENA_HALF_WIDTH) / (2.0 * ARENA_HALF_WIDTH)).clamp(0.0, 1.0);
        ((t * self.cells.len() as f32) as usize).min(self.cells.len() - 1)
    }

    fn strength_at(&self, x: f32) -> f32 {
        f32::from_bits(self.cells[self.cell_for(x)].load(Ordering::Relaxed))
    }
}

struct AdvanceClock(Arc<WindField>);

impl SingleTask for AdvanceClock {
    fn execute(&self) {
        self.0.tick.fetch_add(1, Ordering::Relaxed);
    }
}

struct RebuildWind(Arc<WindField>);

impl CustomParallelTask for RebuildWind {
    fn iterations(&self) -> usize {
        self.0.cells.len()
    }

    fn execute(&self, index: usize) {
        let tick = self.0.tick.load(Ordering::Relaxed) as f32;
        let strength = (index as f32 * 0.3 + tick * 0.05).sin() * 2.0;
        self.0.cells[index].store(strength.to_bits(), Ordering::Relaxed);
    }
}

struct Damping {
    wind: Arc<WindField>,
    drag: f32,
}

impl ParallelTask for Damping {
    type Components = (Position, Velocity);

    fn execute<'a>(&'a self, (position, velocity): (&'a mut Position, &'a mut Velocity)) {
        let wind = Vec3::new(self.wind.strength_at(position.0.x), 0.0, 0.0);
        velocity.0 = (velocity.0 + (GRAVITY + wind) * TICK_SECONDS) * (1.0 - self.drag);
    }
}

struct Integrate;

impl ParallelTask for Integrate {
    type Components = (Position, Velocity);

    fn execute<'a>(&'a self, (position, velocity): (&'a mut Position, &'a mut Velocity)) {
        position.0 += velocity.0 * TICK_SECONDS;
    }
}

pub struct MotionSystem {
    integrate: Task,
}

impl MotionSystem {
    pub fn new(drag: f32) -> Self {
        let wind = Arc::new(WindField::new(WIND_CELLS));

        let clock = Task::single("advance_clock", AdvanceClock(wind.clone()));
        let rebuild = Task::custom("rebuild_wind", RebuildWind(wind.clone()));
        let damping = Task::parallel("damping", Damping { wind, drag });
        let integrate = Task::parallel("integrate", Integrate);

        rebuild.depends_on(&clock);
        damping.depends_on(&rebuild).set_iterations_per_stride(256);
        integrate.depends_on(&damping).set_iterations_per_stride(256);

        Self { integrate }
    }
}

impl System for MotionSystem {
    fn name(&self) -> &str {
        "motion"
    }

    fn on_update(&mut self, world: &mut World, work: &WorkManager) -> Result<(), TaskError> {
        world.run(&self.integrate, work)
    }
}

// ============================================================================
// Bounds
// ============================================================================

struct Bounce;

impl ParallelTaskWithIndex for Bounce {
    type Components = (Position, Velocity);

    fn execute<'a>(&'a self, index: usize, (position, velocity): (&'a mut Position, &'a mut Velocity)) {
        // Vary restitution a little across rows so piles do not bounce in lockstep.
        let restitution = 0.4 + (index % 8) as f32 * 0.05;

        if position.0.y < FLOOR_Y {
            position.0.y = FLOOR_Y;
            velocity.0.y = -velocity.0.y * restitution;
        }
        if position.0.x.abs() > ARENA_HALF_WIDTH {
            position.0.x = position.0.x.clamp(-ARENA_HALF_WIDTH, ARENA_HALF_WIDTH);
            velocity.0.x = -velocity.0.x * restitution;
        }
    }
}

pub struct BoundsSystem {
    bounce: Task,
}

impl BoundsSystem {
    pub fn new() -> Self {
        Self {
            bounce: Task::parallel_with_index("bounce", Bounce),
        }
    }
}

impl Default for BoundsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BoundsSystem {
    fn name(&self) -> &str {
        "bounds"
    }

    fn on_update(&mut self, world: &mut World, work: &WorkManager) -> Result<(), TaskError> {
        world.run(&self.bounce, work)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Small deterministic generator for spawn positions.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

/// Spawns particles every tick, tags the ones at rest and retires the oldest
/// once the population cap is reached.
pub struct LifecycleSystem {
    particles: VecDeque<StableEntity>,
    spawn_per_tick: usize,
    max_live: usize,
    rng: Lcg,
}

impl LifecycleSystem {
    pub fn new(spawn_per_tick: usize, max_live: usize) -> Self {
        Self {
            particles: VecDeque::with_capacity(max_live),
            spawn_per_tick,
            max_live,
            rng: Lcg(0x5eed),
        }
    }

    fn launch_velocity(&mut self) -> Vec3 {
        Vec3::new(self.rng.range(-3.0, 3.0), self.rng.range(0.0, 5.0), 0.0)
    }
}

impl System for LifecycleSystem {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn on_update(&mut self, world: &mut World, _work: &WorkManager) -> Result<(), TaskError> {
        // One emitter per tick; the rest of the burst are copies of it with
        // their own launch velocity.
        if self.spawn_per_tick > 0 {
            let origin = Vec3::new(self.rng.range(-40.0, 40.0), self.rng.range(10.0, 30.0), 0.0);
            let emitter = spawn!(world, Position(origin), Velocity(self.launch_velocity()));
            self.particles.push_back(world.stable_reference(emitter));
            for _ in 1..self.spawn_per_tick {
                let Some(entity) = world.clone_entity(emitter) else {
                    break;
                };
                world.set_component(entity, Velocity(self.launch_velocity()));
                self.particles.push_back(world.stable_reference(entity));
            }
        }

        let mut grounded = 0;
        for particle in &self.particles {
            let id = particle.id();
            let resting = world
                .get_component::<Position>(id)
                .is_some_and(|p| p.0.y <= FLOOR_Y + 0.01);
            if resting && world.add_component(id, Grounded).is_some() {
                grounded += 1;
            }
        }
        if grounded > 0 {
            tracing::trace!(grounded, "particles came to rest");
        }

        while self.particles.len() > self.max_live {
            if let Some(oldest) = self.particles.pop_front() {
                world.despawn(oldest.id());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Damage
// ============================================================================

/// Crates lose health each tick and are removed once destroyed.
pub struct DamageSystem {
    crates: Vec<StableEntity>,
    damage_per_tick: f32,
}

impl DamageSystem {
    pub fn new(damage_per_tick: f32) -> Self {
        Self {
            crates: Vec::new(),
            damage_per_tick,
        }
    }

    /// Spawn a crate carrying the raw health component.
    pub fn spawn_crate(&mut self, world: &mut World, label: &str, x: f32, max_health: f32) -> anyhow::Result<()> {
        let builder = EntityBuilder::new()
            .with(Position(Vec3::new(x, FLOOR_Y, 0.0)))
            .with(Label(label.to_string()))
            .with_raw_bytes(HEALTH_ID, bytemuck::bytes_of(&Health::full(max_health)).to_vec());
        let entity = world.spawn_built(builder)?;
        self.crates.push(world.stable_reference(entity));
        Ok(())
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.crates.len()
    }
}

impl System for DamageSystem {
    fn name(&self) -> &str {
        "damage"
    }

    fn on_update(&mut self, world: &mut World, _work: &WorkManager) -> Result<(), TaskError> {
        let damage = self.damage_per_tick;
        self.crates.retain(|crate_ref| {
            let id = crate_ref.id();
            let Some(mut health) = world.get_raw_component::<Health>(id, HEALTH_ID) else {
                return false;
            };
            health.current -= damage;
            if health.current > 0.0 {
                world.set_raw_component(id, HEALTH_ID, health);
                return true;
            }

            let label = world
                .get_component::<Label>(id)
                .map(|l| l.0.clone())
                .unwrap_or_default();
            tracing::info!(crate_label = %label, max = health.max, "crate destroyed");
            world.despawn(id);
            false
        });
        Ok(())
    }
}
