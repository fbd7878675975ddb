use bytemuck::{Pod, Zeroable};

use crate::cpu::sph2d::SPHState;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GPUParticle {
    // not using glam to make sure WGSL compatibility
    pub position: [f32; 2],
    pub predicted_position: [f32; 2],
    pub velocity: [f32; 2],
}

// uniform block, keep it a multiple of 16 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GPUSimParams {
    pub bounds_size: [f32; 2],
    pub obstacle_size: [f32; 2],
    pub obstacle_centre: [f32; 2],
    pub interaction_point: [f32; 2],

    pub smoothing_radius: f32,
    pub target_density: f32,
    pub pressure_multiplier: f32,
    pub near_pressure_multiplier: f32,

    pub viscosity_strength: f32,
    pub gravity: f32,
    pub collision_damping: f32,
    pub delta_time: f32,

    pub interaction_strength: f32,
    pub interaction_radius: f32,
    pub num_particles: u32,
    pub _pad0: u32,

    pub poly6_scaling_factor: f32,
    pub spiky_pow3_scaling_factor: f32,
    pub spiky_pow2_scaling_factor: f32,
    pub spiky_pow3_derivative_scaling_factor: f32,

    pub spiky_pow2_derivative_scaling_factor: f32,
    pub _pad1: [f32; 3],
}

impl GPUSimParams {
    pub fn from_state(sph: &SPHState, delta_time: f32) -> Self {
        let s = sph.settings();
        let k = sph.kernel_factors();
        let interaction = sph.interaction();
        Self {
            bounds_size: s.bounds_size.to_array(),
            obstacle_size: s.obstacle_size.to_array(),
            obstacle_centre: s.obstacle_centre.to_array(),
            interaction_point: interaction.point.to_array(),
            smoothing_radius: s.smoothing_radius,
            target_density: s.target_density,
            pressure_multiplier: s.pressure_multiplier,
            near_pressure_multiplier: s.near_pressure_multiplier,
            viscosity_strength: s.viscosity_strength,
            gravity: s.gravity,
            collision_damping: s.collision_damping,
            delta_time,
            interaction_strength: interaction.strength,
            interaction_radius: interaction.radius,
            num_particles: sph.particle_count() as u32,
            _pad0: 0,
            poly6_scaling_factor: k.poly6,
            spiky_pow3_scaling_factor: k.spiky_pow3,
            spiky_pow2_scaling_factor: k.spiky_pow2,
            spiky_pow3_derivative_scaling_factor: k.spiky_pow3_derivative,
            spiky_pow2_derivative_scaling_factor: k.spiky_pow2_derivative,
            _pad1: [0.0; 3],
        }
    }
}

/// Live particles in external order, padded with zeroes up to `capacity`.
pub fn pack_particles(sph: &SPHState) -> Vec<GPUParticle> {
    let mut gpu_particles = Vec::with_capacity(sph.capacity());
    let particles = sph
        .positions()
        .iter()
        .zip(sph.predicted_positions())
        .zip(sph.velocities());
    for ((pos, predicted), vel) in particles {
        gpu_particles.push(GPUParticle {
            position: pos.to_array(),
            predicted_position: predicted.to_array(),
            velocity: vel.to_array(),
        });
    }
    gpu_particles.resize(sph.capacity(), GPUParticle::default());
    gpu_particles
}

pub fn pack_densities(sph: &SPHState) -> Vec<[f32; 2]> {
    let mut densities: Vec<[f32; 2]> = sph.densities().iter().map(|d| d.to_array()).collect();
    densities.resize(sph.capacity(), [0.0; 2]);
    densities
}
