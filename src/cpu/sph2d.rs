// smoothed particle hydrodynamics in 2D, data parallel over particles
use bevy::log::{debug, info};
use bevy::prelude::Resource;
use glam::Vec2;
use rayon::prelude::*;

use crate::cpu::kernels::{
    KernelFactors, derivative_spiky_pow2, derivative_spiky_pow3, poly6, spiky_pow3,
};
use crate::cpu::spatial_hash::{SpatialEntry, SpatialHash};
use crate::cpu::spawn::SpawnData;
use crate::cpu::store::{ParticleBuffer, ParticleStore};
use crate::error::Result;
use crate::settings::{FluidConfig, FluidSettings};

// keeps 1 / density finite for isolated particles
const DENSITY_FLOOR: f32 = 1e-5;

/// Pointer input for one frame. Positive strength pulls particles towards
/// `point`, negative pushes them away, zero disables it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InteractionInput {
    pub point: Vec2,
    pub strength: f32,
    pub radius: f32,
}

#[derive(Resource)]
pub struct SPHState {
    settings: FluidSettings,
    factors: KernelFactors,
    store: ParticleStore,
    spatial: SpatialHash,
    // particle index -> slot in sorted order, inverse of the sort permutation
    sorted_slot: Vec<u32>,
    velocity_scratch: Vec<Vec2>,
    interaction: InteractionInput,
    spawn_data: SpawnData,
    last_time_step: f32,
    steps: u64,
}

impl SPHState {
    pub fn initialize(spawn_data: SpawnData, settings: FluidSettings) -> Result<Self> {
        spawn_data.check()?;
        let settings = settings.validated()?;
        let iterations = settings.iterations_per_frame.max(1) as f32;

        let mut sph = Self {
            factors: KernelFactors::new(settings.smoothing_radius),
            settings,
            store: ParticleStore::default(),
            spatial: SpatialHash::new(0),
            sorted_slot: Vec::new(),
            velocity_scratch: Vec::new(),
            interaction: InteractionInput::default(),
            spawn_data,
            last_time_step: 1.0 / 60.0 / iterations,
            steps: 0,
        };
        sph.write_spawn_data();
        info!(
            "fluid initialised with {} particles (capacity {})",
            sph.particle_count(),
            sph.capacity()
        );
        Ok(sph)
    }

    pub fn from_config(config: &FluidConfig) -> Result<Self> {
        Self::initialize(config.spawner.spawn_data(), config.settings.clone())
    }

    // demo function ----------------------------------------------
    pub fn demo_block_5k() -> Result<Self> {
        let spawn = SpawnData::grid(71, 71, 0.12, Vec2::new(-4.2, -4.2));
        let settings = FluidSettings {
            bounds_size: Vec2::new(17.1, 9.6),
            ..Default::default()
        };
        Self::initialize(spawn, settings)
    }
    // ------------------------------------------------------------

    pub fn settings(&self) -> &FluidSettings {
        &self.settings
    }

    pub fn kernel_factors(&self) -> &KernelFactors {
        &self.factors
    }

    /// Scaling factors are only recomputed when the radius actually changes.
    pub fn update_settings(&mut self, settings: FluidSettings) -> Result<()> {
        let settings = settings.validated()?;
        if settings.smoothing_radius.to_bits() != self.settings.smoothing_radius.to_bits() {
            self.factors = KernelFactors::new(settings.smoothing_radius);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        self.store.count()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn buffer_generation(&self) -> u64 {
        self.store.generation()
    }

    /// Length of the most recent sub-step, also used by `reset`.
    pub fn last_time_step(&self) -> f32 {
        self.last_time_step
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps
    }

    pub fn spawn_data(&self) -> &SpawnData {
        &self.spawn_data
    }

    pub fn spatial_hash(&self) -> &SpatialHash {
        &self.spatial
    }

    pub fn positions(&self) -> &[Vec2] {
        self.store.positions()
    }

    pub fn predicted_positions(&self) -> &[Vec2] {
        self.store.predicted_positions()
    }

    pub fn velocities(&self) -> &[Vec2] {
        self.store.velocities()
    }

    /// (density, near density) per particle from the last step.
    pub fn densities(&self) -> &[Vec2] {
        self.store.densities()
    }

    /// (pressure, near pressure) derived from the last step's densities.
    pub fn pressures(&self) -> Vec<Vec2> {
        self.densities()
            .iter()
            .map(|d| pressure_from_density(*d, &self.settings))
            .collect()
    }

    pub fn interaction(&self) -> InteractionInput {
        self.interaction
    }

    pub fn set_interaction(&mut self, point: Vec2, strength: f32, radius: f32) {
        self.interaction = InteractionInput {
            point,
            strength,
            radius,
        };
    }

    /// Returns true when the particle buffers were reallocated. Everything
    /// derived from the old buffers has been rebound by the time this returns.
    pub fn set_particle_count(&mut self, count: usize) -> bool {
        let resized = self.store.set_particle_count(count);
        if resized {
            info!(
                "particle buffers grown to {} for {} particles",
                self.store.capacity(),
                count
            );
            self.rebind();
        }
        resized
    }

    /// Resizes everything that depends on the particle capacity. The hash
    /// table size follows the capacity so the grid starts from scratch.
    pub fn rebind(&mut self) {
        let capacity = self.store.capacity();
        self.spatial = SpatialHash::new(capacity);
        self.sorted_slot.resize(capacity, 0);
        self.velocity_scratch.resize(capacity, Vec2::ZERO);
        debug!(
            "rebound kernels to buffer generation {} (hash table size {})",
            self.store.generation(),
            self.spatial.table_size()
        );
    }

    pub fn add_particle(&mut self, position: Vec2, velocity: Vec2) -> bool {
        let index = self.store.count();
        let resized = self.set_particle_count(index + 1);
        self.store.particles.write(index, position, velocity);
        resized
    }

    fn write_spawn_data(&mut self) {
        self.set_particle_count(self.spawn_data.len());
        let spawn = &self.spawn_data;
        for (i, (&pos, &vel)) in spawn.positions.iter().zip(&spawn.velocities).enumerate() {
            self.store.particles.write(i, pos, vel);
        }
    }

    /// Back to the spawn layout. One step is run in between so densities are
    /// populated, but the physical state ends up exactly as spawned.
    pub fn reset(&mut self) {
        self.write_spawn_data();
        self.step(self.last_time_step);
        self.write_spawn_data();
        info!("fluid reset to {} spawned particles", self.particle_count());
    }

    /// Splits one frame into `iterations_per_frame` equal steps, calling
    /// `on_step` after each. Returns the number of steps taken.
    pub fn run_frame(&mut self, frame_time: f32, mut on_step: impl FnMut(&Self)) -> u32 {
        let iterations = self.settings.iterations_per_frame.max(0) as u32;
        if iterations == 0 {
            return 0;
        }
        let time_step = frame_time / iterations as f32;
        self.last_time_step = time_step;

        for _ in 0..iterations {
            self.step(time_step);
            on_step(self);
        }
        iterations
    }

    /// One pass of the full pipeline. Each kernel finishes before the next starts.
    pub fn step(&mut self, dt: f32) {
        let n = self.store.count();
        if n > 0 {
            let Self {
                settings,
                factors,
                store,
                spatial,
                sorted_slot,
                velocity_scratch,
                interaction,
                ..
            } = self;

            external_forces(&mut store.particles, n, settings, interaction, dt);
            spatial.build(&store.particles.predicted_position[..n], factors.radius);
            reorder(
                spatial.entries(),
                &store.particles,
                &mut store.sort_target,
                &mut sorted_slot[..n],
            );
            compute_densities(spatial, &mut store.sort_target, n, factors);
            apply_pressure(spatial, &mut store.sort_target, n, settings, factors, dt);
            apply_viscosity(
                spatial,
                &mut store.sort_target,
                velocity_scratch,
                n,
                settings,
                factors,
                dt,
            );
            update_positions(&mut store.sort_target, n, settings, dt);
            copyback(&store.sort_target, &mut store.particles, &sorted_slot[..n]);
        }
        self.steps += 1;
    }
}

pub fn pressure_from_density(density: Vec2, settings: &FluidSettings) -> Vec2 {
    Vec2::new(
        (density.x - settings.target_density) * settings.pressure_multiplier,
        density.y * settings.near_pressure_multiplier,
    )
}

/// Gravity plus pointer interaction. Inside the interaction radius gravity is
/// faded out while pulling and the particle's own velocity is damped, both
/// weighted towards the centre, which keeps a held blob of fluid steady.
pub fn external_acceleration(
    pos: Vec2,
    vel: Vec2,
    gravity: Vec2,
    interaction: &InteractionInput,
) -> Vec2 {
    if interaction.strength == 0.0 || interaction.radius <= 0.0 {
        return gravity;
    }
    let to_point = interaction.point - pos;
    let sqr_dst = to_point.length_squared();
    if sqr_dst >= interaction.radius * interaction.radius {
        return gravity;
    }

    let dst = sqr_dst.sqrt();
    let centre_t = 1.0 - dst / interaction.radius;
    let dir = if dst > 0.0 { to_point / dst } else { Vec2::ZERO };
    let gravity_weight = 1.0 - centre_t * (interaction.strength / 10.0).clamp(0.0, 1.0);

    gravity * gravity_weight + dir * centre_t * interaction.strength - vel * centre_t
}

/// Walls are a box of `bounds_size` centred on the origin. The obstacle only
/// exists when both of its extents are positive.
pub fn resolve_collisions(pos: &mut Vec2, vel: &mut Vec2, settings: &FluidSettings) {
    let damping = settings.collision_damping;
    let half = settings.bounds_size * 0.5;
    let edge = half - pos.abs();
    if edge.x <= 0.0 {
        pos.x = half.x * pos.x.signum();
        vel.x *= -damping;
    }
    if edge.y <= 0.0 {
        pos.y = half.y * pos.y.signum();
        vel.y *= -damping;
    }

    let obstacle_half = settings.obstacle_size * 0.5;
    if obstacle_half.x <= 0.0 || obstacle_half.y <= 0.0 {
        return;
    }
    let rel = *pos - settings.obstacle_centre;
    let obstacle_edge = obstacle_half - rel.abs();
    if obstacle_edge.x >= 0.0 && obstacle_edge.y >= 0.0 {
        // leave through the nearest face
        if obstacle_edge.x < obstacle_edge.y {
            pos.x = obstacle_half.x * rel.x.signum() + settings.obstacle_centre.x;
            vel.x *= -damping;
        } else {
            pos.y = obstacle_half.y * rel.y.signum() + settings.obstacle_centre.y;
            vel.y *= -damping;
        }
    }
}

// ========================== kernels ==================================

fn external_forces(
    particles: &mut ParticleBuffer,
    n: usize,
    settings: &FluidSettings,
    interaction: &InteractionInput,
    dt: f32,
) {
    let gravity = Vec2::new(0.0, -settings.gravity);
    let ParticleBuffer {
        position,
        predicted_position,
        velocity,
        ..
    } = particles;

    velocity[..n]
        .par_iter_mut()
        .zip(predicted_position[..n].par_iter_mut())
        .zip(position[..n].par_iter())
        .for_each(|((vel, predicted), &pos)| {
            *vel += external_acceleration(pos, *vel, gravity, interaction) * dt;
            // look ahead so neighbour search sees where the particle is heading
            *predicted = pos + *vel * dt;
        });
}

fn reorder(
    entries: &[SpatialEntry],
    from: &ParticleBuffer,
    to: &mut ParticleBuffer,
    sorted_slot: &mut [u32],
) {
    let n = entries.len();
    let ParticleBuffer {
        position,
        predicted_position,
        velocity,
        ..
    } = to;

    position[..n]
        .par_iter_mut()
        .zip(predicted_position[..n].par_iter_mut())
        .zip(velocity[..n].par_iter_mut())
        .zip(entries.par_iter())
        .for_each(|(((pos, predicted), vel), entry)| {
            let src = entry.particle_index as usize;
            *pos = from.position[src];
            *predicted = from.predicted_position[src];
            *vel = from.velocity[src];
        });

    for (slot, entry) in entries.iter().enumerate() {
        sorted_slot[entry.particle_index as usize] = slot as u32;
    }
}

// gather through the inverse permutation so every work item owns its output slot
fn copyback(from: &ParticleBuffer, to: &mut ParticleBuffer, sorted_slot: &[u32]) {
    let n = sorted_slot.len();
    let ParticleBuffer {
        position,
        predicted_position,
        velocity,
        density,
    } = to;

    position[..n]
        .par_iter_mut()
        .zip(predicted_position[..n].par_iter_mut())
        .zip(velocity[..n].par_iter_mut())
        .zip(density[..n].par_iter_mut())
        .zip(sorted_slot.par_iter())
        .for_each(|((((pos, predicted), vel), dens), &slot)| {
            let src = slot as usize;
            *pos = from.position[src];
            *predicted = from.predicted_position[src];
            *vel = from.velocity[src];
            *dens = from.density[src];
        });
}

fn compute_densities(
    spatial: &SpatialHash,
    sorted: &mut ParticleBuffer,
    n: usize,
    k: &KernelFactors,
) {
    let ParticleBuffer {
        predicted_position,
        density,
        ..
    } = sorted;
    let predicted = &predicted_position[..n];

    density[..n].par_iter_mut().enumerate().for_each(|(i, out)| {
        let mut sum = Vec2::ZERO;
        spatial.for_each_neighbour(predicted, predicted[i], k.radius, |_, _, dst| {
            sum.x += poly6(dst, k);
            sum.y += spiky_pow3(dst, k);
        });
        *out = sum;
    });
}

fn apply_pressure(
    spatial: &SpatialHash,
    sorted: &mut ParticleBuffer,
    n: usize,
    settings: &FluidSettings,
    k: &KernelFactors,
    dt: f32,
) {
    let ParticleBuffer {
        predicted_position,
        velocity,
        density,
        ..
    } = sorted;
    let predicted = &predicted_position[..n];
    let density = &density[..n];
    let floor = Vec2::splat(DENSITY_FLOOR);

    velocity[..n].par_iter_mut().enumerate().for_each(|(i, vel)| {
        let own_density = density[i].max(floor);
        let own_pressure = pressure_from_density(own_density, settings);
        let mut force = Vec2::ZERO;

        spatial.for_each_neighbour(predicted, predicted[i], k.radius, |j, offset, dst| {
            if j == i {
                return;
            }
            let dir = if dst > 0.0 { offset / dst } else { Vec2::Y };
            let neighbour_density = density[j].max(floor);
            let shared = (own_pressure + pressure_from_density(neighbour_density, settings)) * 0.5;

            force += dir * derivative_spiky_pow3(dst, k) * shared.x / neighbour_density.x;
            force += dir * derivative_spiky_pow2(dst, k) * shared.y / neighbour_density.y;
        });

        *vel += force / own_density.x * dt;
    });
}

// reads neighbour velocities, so it writes into the scratch buffer and swaps
fn apply_viscosity(
    spatial: &SpatialHash,
    sorted: &mut ParticleBuffer,
    scratch: &mut Vec<Vec2>,
    n: usize,
    settings: &FluidSettings,
    k: &KernelFactors,
    dt: f32,
) {
    let predicted = &sorted.predicted_position[..n];
    let velocity = &sorted.velocity[..n];

    scratch[..n].par_iter_mut().enumerate().for_each(|(i, out)| {
        let own = velocity[i];
        let mut force = Vec2::ZERO;
        spatial.for_each_neighbour(predicted, predicted[i], k.radius, |j, _, dst| {
            if j == i {
                return;
            }
            force += (velocity[j] - own) * poly6(dst, k);
        });
        *out = own + force * settings.viscosity_strength * dt;
    });

    std::mem::swap(&mut sorted.velocity, scratch);
}

fn update_positions(sorted: &mut ParticleBuffer, n: usize, settings: &FluidSettings, dt: f32) {
    let ParticleBuffer {
        position, velocity, ..
    } = sorted;

    position[..n]
        .par_iter_mut()
        .zip(velocity[..n].par_iter_mut())
        .for_each(|(pos, vel)| {
            *pos += *vel * dt;
            resolve_collisions(pos, vel, settings);
        });
}
