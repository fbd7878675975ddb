use bevy::prelude::*;
use bevy::sprite::Sprite;
use bevy_sph2d::cpu::emitter::{EmitterSettings, ParticleEmitter};
use bevy_sph2d::cpu::sph2d::SPHState;
use bevy_sph2d::gpu::buffers::GpuParticleBufferPlugin;
use bevy_sph2d::plugin::{FluidSimPlugin, FluidSimSet, SimulationView};
use bevy_sph2d::settings::{FluidConfig, FluidSettings};

#[derive(Component)]
struct ParticleVisual(usize);

const CONFIG_PATH: &str = "config/fluid2d.ron";
const RENDER_SCALE: f32 = 50.0;
const PARTICLE_SIZE: f32 = 5.0;

fn load_simulation() -> bevy_sph2d::Result<(SPHState, FluidSettings, Vec<EmitterSettings>)> {
    let config = FluidConfig::load(CONFIG_PATH)?;
    Ok((SPHState::from_config(&config)?, config.settings, config.emitters))
}

fn main() {
    let (sph, settings, emitters) = match load_simulation() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("could not load {CONFIG_PATH} ({err}), using the demo block");
            let sph = SPHState::demo_block_5k().expect("demo block settings are valid");
            let settings = sph.settings().clone();
            (sph, settings, Vec::new())
        }
    };

    // space: pause, right arrow: single step, R: reset, S: spawn at cursor
    // (hold to keep spawning), left / right mouse: attract / repel
    let mut app = App::new();
    app
        .add_plugins(DefaultPlugins)
        .insert_resource(settings)
        .insert_resource(sph)
        .insert_resource(SimulationView {
            pixels_per_unit: RENDER_SCALE,
        })
        .add_plugins((FluidSimPlugin, GpuParticleBufferPlugin))
        .add_systems(Startup, setup)
        .add_systems(Update, (spawn_visuals, sync_particles).chain().after(FluidSimSet));
    for emitter in emitters {
        app.world_mut().spawn(ParticleEmitter::new(emitter));
    }
    app.run();
}

fn density_color(t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        let u = t * 2.0;
        Color::srgb(0.0, u, 1.0)
    } else if t < 0.75 {
        let u = (t - 0.5) / 0.25;
        Color::srgb(u, 1.0, 1.0 - u)
    } else {
        let u = (t - 0.75) / 0.25;
        Color::srgb(1.0, 1.0 - u, 0.0)
    }
}

fn setup(mut commands: Commands, sph: Res<SPHState>) {
    commands.spawn(Camera2d);

    // outline of the bounds
    let bounds = sph.settings().bounds_size;
    commands.spawn((
        Sprite {
            color: Color::srgb(0.08, 0.08, 0.1),
            custom_size: Some(Vec2::new(bounds.x, bounds.y) * RENDER_SCALE),
            ..Default::default()
        },
        Transform::from_xyz(0.0, 0.0, -1.0),
    ));
}

// particles can be added at runtime, so visuals are spawned lazily
fn spawn_visuals(mut commands: Commands, sph: Res<SPHState>, mut spawned: Local<usize>) {
    for i in *spawned..sph.particle_count() {
        let p = sph.positions()[i];
        commands.spawn((
            Sprite {
                color: Color::srgb(0.0, 1.0, 1.0),
                custom_size: Some(Vec2::splat(PARTICLE_SIZE)),
                ..Default::default()
            },
            Transform::from_translation(Vec3::new(p.x * RENDER_SCALE, p.y * RENDER_SCALE, 0.0)),
            ParticleVisual(i),
        ));
    }
    *spawned = (*spawned).max(sph.particle_count());
}

fn sync_particles(
    sph: Res<SPHState>,
    mut query: Query<(&ParticleVisual, &mut Transform, &mut Sprite, &mut Visibility)>,
) {
    let target = sph.settings().target_density;
    let densities = sph.densities();

    for (visual, mut transform, mut sprite, mut visibility) in query.iter_mut() {
        // a reset can drop particles added after spawning
        if visual.0 >= sph.particle_count() {
            *visibility = Visibility::Hidden;
            continue;
        }
        *visibility = Visibility::Inherited;

        let pos = sph.positions()[visual.0];
        transform.translation.x = pos.x * RENDER_SCALE;
        transform.translation.y = pos.y * RENDER_SCALE;

        let t = densities[visual.0].x / (2.0 * target);
        sprite.color = density_color(t);
    }
}
