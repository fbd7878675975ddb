//! Bevy plugin driving an [`SPHState`] resource once per frame.

use bevy::input::ButtonInput;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use glam::Vec2 as GVec2;

use crate::cpu::emitter::ParticleEmitter;
use crate::cpu::sph2d::SPHState;
use crate::cpu::time::SimulationClock;
use crate::settings::FluidSettings;

/// Everything the plugin runs per frame lives in this set, so renderers can
/// order themselves after it.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct FluidSimSet;

#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub enum SimulationCommand {
    TogglePause,
    StepOnce,
    /// Back to the spawn layout, paused.
    Reset,
    /// Adds a particle at rest at this point in simulation space. The frame
    /// it happens in is skipped and its time carried into the next one.
    SpawnAt(GVec2),
    /// Adds a particle at rest without skipping the frame, sent every frame
    /// while the spawn key stays held.
    SpawnStream(GVec2),
}

/// Sent after every sub-step.
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct SimulationStepCompleted {
    pub step: u64,
    pub time_step: f32,
}

/// Pointer state in simulation space. Strength is positive while attracting,
/// negative while repelling and zero otherwise.
///
/// Without a primary window the position is left alone, so headless hosts
/// can drive it themselves.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerInteraction {
    pub world_position: Option<GVec2>,
    pub strength: f32,
    pub radius: f32,
}

/// How many world units (pixels for a default 2D camera) one simulation unit spans.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct SimulationView {
    pub pixels_per_unit: f32,
}

impl Default for SimulationView {
    fn default() -> Self {
        Self {
            pixels_per_unit: 100.0,
        }
    }
}

#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Frames in which the simulation advanced.
    pub frames: u64,
    pub steps_completed: u64,
}

/// Steps the `SPHState` resource with frame time, maps keyboard and mouse
/// input, runs `ParticleEmitter` components and keeps the simulation in sync
/// with the `FluidSettings` resource.
///
/// The `SPHState` itself is inserted by the app, nothing runs without it.
/// When the `SPHState` first shows up its settings are copied into
/// `FluidSettings`; edits to the resource after that flow into the simulation.
///
/// ```rust,ignore
/// App::new()
///     .add_plugins((DefaultPlugins, FluidSimPlugin))
///     .insert_resource(SPHState::from_config(&config)?)
///     .run();
/// ```
pub struct FluidSimPlugin;

impl Plugin for FluidSimPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FluidSettings>()
            .init_resource::<SimulationClock>()
            .init_resource::<PointerInteraction>()
            .init_resource::<SimulationView>()
            .init_resource::<SimulationStats>()
            .add_event::<SimulationCommand>()
            .add_event::<SimulationStepCompleted>();

        app.add_systems(
            Update,
            (
                adopt_simulation_settings,
                keyboard_commands,
                pointer_input,
                apply_commands,
                sync_settings,
                run_simulation_frame,
            )
                .chain()
                .in_set(FluidSimSet),
        );
    }
}

fn keyboard_commands(
    keys: Option<Res<ButtonInput<KeyCode>>>,
    pointer: Res<PointerInteraction>,
    mut commands: EventWriter<SimulationCommand>,
) {
    let Some(keys) = keys else {
        return;
    };

    if keys.just_pressed(KeyCode::Space) {
        commands.write(SimulationCommand::TogglePause);
    }
    if keys.just_pressed(KeyCode::ArrowRight) {
        commands.write(SimulationCommand::StepOnce);
    }
    if keys.just_pressed(KeyCode::KeyR) {
        commands.write(SimulationCommand::Reset);
    }
    if let Some(point) = pointer.world_position {
        if keys.just_pressed(KeyCode::KeyS) {
            commands.write(SimulationCommand::SpawnAt(point));
        } else if keys.pressed(KeyCode::KeyS) {
            commands.write(SimulationCommand::SpawnStream(point));
        }
    }
}

fn pointer_input(
    buttons: Option<Res<ButtonInput<MouseButton>>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    view: Res<SimulationView>,
    settings: Res<FluidSettings>,
    mut pointer: ResMut<PointerInteraction>,
) {
    if let Ok(window) = windows.single() {
        pointer.world_position = cursor_world_position(window, &cameras)
            .map(|p| GVec2::new(p.x, p.y) / view.pixels_per_unit);
    }

    let (attract, repel) = buttons
        .as_deref()
        .map(|b| (b.pressed(MouseButton::Left), b.pressed(MouseButton::Right)))
        .unwrap_or_default();
    pointer.strength = match (attract, repel) {
        (true, false) => settings.interaction_strength,
        (false, true) => -settings.interaction_strength,
        _ => 0.0,
    };
    pointer.radius = settings.interaction_radius;
}

fn cursor_world_position(
    window: &Window,
    cameras: &Query<(&Camera, &GlobalTransform)>,
) -> Option<Vec2> {
    let cursor = window.cursor_position()?;
    let (camera, transform) = cameras.iter().find(|(camera, _)| camera.is_active)?;
    camera.viewport_to_world_2d(transform, cursor).ok()
}

fn apply_commands(
    mut events: EventReader<SimulationCommand>,
    mut clock: ResMut<SimulationClock>,
    sph: Option<ResMut<SPHState>>,
) {
    let Some(mut sph) = sph else {
        events.clear();
        return;
    };

    for command in events.read() {
        match *command {
            SimulationCommand::TogglePause => clock.toggle_pause(),
            SimulationCommand::StepOnce => clock.step_once(),
            SimulationCommand::Reset => {
                clock.pause();
                sph.reset();
            }
            SimulationCommand::SpawnAt(point) => {
                sph.add_particle(point, GVec2::ZERO);
                clock.defer_frame();
            }
            SimulationCommand::SpawnStream(point) => {
                sph.add_particle(point, GVec2::ZERO);
            }
        }
    }
}

fn adopt_simulation_settings(sph: Option<Res<SPHState>>, mut settings: ResMut<FluidSettings>) {
    let Some(sph) = sph else {
        return;
    };
    if sph.is_added() && sph.settings() != &*settings {
        *settings = sph.settings().clone();
    }
}

fn sync_settings(settings: Res<FluidSettings>, sph: Option<ResMut<SPHState>>) {
    let Some(mut sph) = sph else {
        return;
    };
    if !settings.is_changed() || sph.settings() == &*settings {
        return;
    }
    if let Err(err) = sph.update_settings((*settings).clone()) {
        warn!("fluid settings rejected, keeping the previous ones: {err}");
    }
}

fn run_simulation_frame(
    time: Res<Time>,
    mut clock: ResMut<SimulationClock>,
    pointer: Res<PointerInteraction>,
    mut stats: ResMut<SimulationStats>,
    mut step_completed: EventWriter<SimulationStepCompleted>,
    mut emitters: Query<&mut ParticleEmitter>,
    sph: Option<ResMut<SPHState>>,
) {
    let Some(mut sph) = sph else {
        return;
    };

    match pointer.world_position {
        Some(point) => sph.set_interaction(point, pointer.strength, pointer.radius),
        None => sph.set_interaction(GVec2::ZERO, 0.0, pointer.radius),
    }

    let Some(frame_time) = clock.frame_time_step(time.delta_secs(), sph.settings()) else {
        return;
    };
    for mut emitter in &mut emitters {
        emitter.emit(frame_time, &mut sph);
    }
    let steps = sph.run_frame(frame_time, |sph| {
        step_completed.write(SimulationStepCompleted {
            step: sph.steps_completed(),
            time_step: sph.last_time_step(),
        });
    });

    stats.frames += 1;
    stats.steps_completed += u64::from(steps);
}
