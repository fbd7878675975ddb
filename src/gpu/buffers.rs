use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::cpu::sph2d::SPHState;
use crate::gpu::ffi::{GPUSimParams, pack_densities, pack_particles};
use crate::plugin::FluidSimSet;

// ==================== resources ======================================

/* interface of resources for a shader -> actual resource binding via BindGroup
binding(0): particles, binding(1): densities, binding(2): sim params */
#[derive(Resource, Clone)]
pub struct ParticleBindGroupLayout(pub BindGroupLayout);

// responsible for render resources --> accessible in the pipeline
/// Render-world bind group over the mirrored buffers. Nothing in this crate
/// draws with it; it is there for an external render node or material to bind
/// (the bundled demo draws sprites straight from `SPHState`).
#[derive(Resource, Clone)]
pub struct ParticleBindGroup(pub BindGroup);

/// GPU copy of the particle store. Sized to the store capacity, so it has to
/// be recreated whenever the store's buffer generation moves on.
#[derive(Resource)]
pub struct ParticleBuffers {
    pub particle_buffer: Buffer,
    pub density_buffer: Buffer,
    pub params_buffer: Buffer,
    pub num_particles: u32,
    pub capacity: u32,
    pub generation: u64,
}

// Rendering world Copy
#[derive(Resource, Clone, ExtractResource)]
pub struct ExtractedParticleBuffer {
    pub particle_buffer: Buffer,
    pub density_buffer: Buffer,
    pub params_buffer: Buffer,
    pub num_particles: u32,
    pub generation: u64,
}

// =====================================================================

// ========================== systems ==================================

// Startup systems that have to run only once

fn init_particle_bind_group_layout(mut commands: Commands, render_device: Res<RenderDevice>) {
    let storage = |binding| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE | ShaderStages::VERTEX,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    let layout = render_device.create_bind_group_layout(
        Some("particle_bind_group_layout"),
        &[
            storage(0),
            storage(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::COMPUTE | ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    );
    commands.insert_resource(ParticleBindGroupLayout(layout));
}

// Update systems that have to run per frame

/// Uploads the live particles after the simulation ran. A new buffer
/// generation means the store was reallocated, so the buffers are recreated
/// instead of written.
pub fn sync_particle_buffers(
    mut commands: Commands,
    sph: Option<Res<SPHState>>,
    particle_buffers: Option<ResMut<ParticleBuffers>>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
) {
    let Some(sph) = sph else {
        return;
    };

    match particle_buffers {
        Some(mut buffers) if buffers.generation == sph.buffer_generation() => {
            render_queue.write_buffer(
                &buffers.particle_buffer,
                0,
                bytemuck::cast_slice(&pack_particles(&sph)),
            );
            render_queue.write_buffer(
                &buffers.density_buffer,
                0,
                bytemuck::cast_slice(&pack_densities(&sph)),
            );
            render_queue.write_buffer(
                &buffers.params_buffer,
                0,
                bytemuck::bytes_of(&GPUSimParams::from_state(&sph, sph.last_time_step())),
            );
            buffers.num_particles = sph.particle_count() as u32;
        }
        _ => {
            let buffers = ParticleBuffers::new(&render_device, &sph);
            info!(
                "gpu particle buffers (re)created: capacity {}, generation {}",
                buffers.capacity, buffers.generation
            );
            commands.insert_resource(buffers);
        }
    }
}

// Extract systems that send from App to Render

fn extract_particle_buffer(
    mut commands: Commands,
    particle_buffers: Extract<Option<Res<ParticleBuffers>>>,
) {
    let Some(particle_buffers) = particle_buffers.as_ref() else {
        return;
    };
    commands.insert_resource(ExtractedParticleBuffer {
        particle_buffer: particle_buffers.particle_buffer.clone(),
        density_buffer: particle_buffers.density_buffer.clone(),
        params_buffer: particle_buffers.params_buffer.clone(),
        num_particles: particle_buffers.num_particles,
        generation: particle_buffers.generation,
    });
}

fn extract_bind_group_layout(
    mut commands: Commands,
    layout: Extract<Option<Res<ParticleBindGroupLayout>>>,
) {
    if let Some(layout) = layout.as_ref() {
        commands.insert_resource(ParticleBindGroupLayout(layout.0.clone()));
    }
}

// Systems in Render

// only rebuilt when the buffers behind it changed
fn prepare_particle_bind_group(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layout: Option<Res<ParticleBindGroupLayout>>,
    extracted: Option<Res<ExtractedParticleBuffer>>,
    existing: Option<Res<ParticleBindGroup>>,
    mut bound_generation: Local<Option<u64>>,
) {
    let (Some(layout), Some(extracted)) = (layout, extracted) else {
        return;
    };
    if existing.is_some() && *bound_generation == Some(extracted.generation) {
        return;
    }

    let bind_group = render_device.create_bind_group(
        Some("particle_bind_group"),
        &layout.0,
        &[
            BindGroupEntry {
                binding: 0,
                resource: extracted.particle_buffer.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: extracted.density_buffer.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 2,
                resource: extracted.params_buffer.as_entire_binding(),
            },
        ],
    );
    commands.insert_resource(ParticleBindGroup(bind_group));
    *bound_generation = Some(extracted.generation);
}

// Implementations

impl ParticleBuffers {
    pub fn new(render_device: &RenderDevice, sph: &SPHState) -> Self {
        // storage buffers with the init data, at least one element so binding never fails
        let mut gpu_particles = pack_particles(sph);
        if gpu_particles.is_empty() {
            gpu_particles.push(Default::default());
        }
        let mut densities = pack_densities(sph);
        if densities.is_empty() {
            densities.push([0.0; 2]);
        }

        let particle_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("Particle Buffer"),
            contents: bytemuck::cast_slice(&gpu_particles),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        });
        let density_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("Density Buffer"),
            contents: bytemuck::cast_slice(&densities),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        });
        let params_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("Sim Params Buffer"),
            contents: bytemuck::bytes_of(&GPUSimParams::from_state(sph, sph.last_time_step())),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        Self {
            particle_buffer,
            density_buffer,
            params_buffer,
            num_particles: sph.particle_count() as u32,
            capacity: gpu_particles.len() as u32,
            generation: sph.buffer_generation(),
        }
    }
}

// =====================================================================

// Plugin

/// Mirrors the simulation into GPU storage buffers for renderers outside this
/// crate, which read them through [`ParticleBindGroup`] in the render world.
/// Needs the render app, add it after `DefaultPlugins` and `FluidSimPlugin`.
pub struct GpuParticleBufferPlugin;

impl Plugin for GpuParticleBufferPlugin {
    fn build(&self, app: &mut App) {
        // Render
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            warn!("GpuParticleBufferPlugin added without a render app, particles stay on the CPU");
            return;
        };
        render_app
            .add_systems(
                ExtractSchedule,
                (extract_particle_buffer, extract_bind_group_layout),
            )
            .add_systems(
                Render,
                prepare_particle_bind_group.in_set(RenderSet::PrepareBindGroups),
            );

        // App
        app.add_systems(Startup, init_particle_bind_group_layout)
            .add_systems(Update, sync_particle_buffers.after(FluidSimSet));
    }
}
