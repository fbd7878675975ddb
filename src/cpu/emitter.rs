// nozzle that keeps adding particles to a running simulation
use std::f32::consts::TAU;

use bevy::prelude::Component;
use glam::Vec2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::cpu::spawn::SpawnData;
use crate::cpu::sph2d::SPHState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterSettings {
    pub position: Vec2,
    /// Ejection direction before swinging, straight down by default.
    pub direction: Vec2,
    /// Particles start spread along a segment this wide, across the direction.
    pub nozzle_width: f32,
    /// Particles per second.
    pub flow_rate: f32,
    pub eject_speed: f32,
    /// Each particle's speed is scaled by a random factor in `[min, max)`.
    /// Ignored unless `max > min >= 0`.
    pub eject_speed_range: Vec2,
    /// Maximum swing away from `direction`, in degrees. 0 disables swinging.
    pub swing_angle: f32,
    /// Full swings per second.
    pub swing_speed: f32,
    /// Seconds between `start` and the first particle.
    pub start_delay: f32,
    /// Seconds of emission before the emitter stops itself, 0 runs forever.
    pub duration: f32,
    pub start_active: bool,
    pub seed: u64,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            direction: Vec2::NEG_Y,
            nozzle_width: 1.0,
            flow_rate: 60.0,
            eject_speed: 4.0,
            eject_speed_range: Vec2::new(0.9, 1.2),
            swing_angle: 0.0,
            swing_speed: 0.2,
            start_delay: 2.0,
            duration: 0.0,
            start_active: true,
            seed: 7,
        }
    }
}

/// Flow-rate driven particle source. Time is fed in with `update`, which
/// returns the particles due in that time; `emit` adds them to a simulation.
#[derive(Component, Clone, Debug)]
pub struct ParticleEmitter {
    pub settings: EmitterSettings,
    active: bool,
    delay_elapsed: f32,
    started: bool,
    flow_timer: f32,
    swing_time: f32,
    emitting_for: f32,
    rng: StdRng,
}

impl ParticleEmitter {
    pub fn new(settings: EmitterSettings) -> Self {
        Self {
            active: settings.start_active,
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            delay_elapsed: 0.0,
            started: false,
            flow_timer: 0.0,
            swing_time: 0.0,
            emitting_for: 0.0,
        }
    }

    pub fn is_emitting(&self) -> bool {
        self.active
    }

    /// Restarts from scratch, including the start delay.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.started = false;
        self.delay_elapsed = 0.0;
        self.flow_timer = 0.0;
        self.emitting_for = 0.0;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Ejection direction including the current swing offset.
    pub fn current_direction(&self) -> Vec2 {
        let s = &self.settings;
        let base = s.direction.normalize_or(Vec2::NEG_Y);
        if s.swing_angle <= 0.0 || s.swing_speed <= 0.0 {
            return base;
        }
        let angle = (self.swing_time * s.swing_speed * TAU).sin() * s.swing_angle.to_radians();
        Vec2::from_angle(angle).rotate(base)
    }

    /// Advances the emitter by `dt` seconds.
    pub fn update(&mut self, mut dt: f32) -> SpawnData {
        let mut spawned = SpawnData::default();
        if !self.active || dt <= 0.0 {
            return spawned;
        }

        if !self.started {
            self.delay_elapsed += dt;
            // only the time past the delay counts towards emission
            let overshoot = self.delay_elapsed - self.settings.start_delay;
            if overshoot < 0.0 {
                return spawned;
            }
            self.started = true;
            dt = overshoot;
        }

        if self.settings.duration > 0.0 {
            dt = dt.min(self.settings.duration - self.emitting_for);
            self.emitting_for += dt;
            if self.emitting_for >= self.settings.duration {
                self.active = false;
            }
        }

        if self.settings.swing_angle > 0.0 && self.settings.swing_speed > 0.0 {
            self.swing_time += dt;
        }

        if self.settings.flow_rate > 0.0 {
            self.flow_timer += dt;
            let interval = 1.0 / self.settings.flow_rate;
            while self.flow_timer >= interval {
                self.flow_timer -= interval;
                let (pos, vel) = self.eject_one();
                spawned.positions.push(pos);
                spawned.velocities.push(vel);
            }
        }
        spawned
    }

    /// Runs `update` and adds the result to `sph`. Returns how many particles were added.
    pub fn emit(&mut self, dt: f32, sph: &mut SPHState) -> usize {
        let spawned = self.update(dt);
        for (&pos, &vel) in spawned.positions.iter().zip(&spawned.velocities) {
            sph.add_particle(pos, vel);
        }
        spawned.len()
    }

    fn eject_one(&mut self) -> (Vec2, Vec2) {
        let dir = self.current_direction();
        let normal = dir.perp();
        let half_width = self.settings.nozzle_width * 0.5;
        let offset = if half_width > 0.0 {
            self.rng.gen_range(-half_width..half_width)
        } else {
            0.0
        };

        let range = self.settings.eject_speed_range;
        let mut speed = self.settings.eject_speed;
        if range.y > range.x && range.x >= 0.0 {
            speed *= self.rng.gen_range(range.x..range.y);
        }
        (self.settings.position + normal * offset, dir * speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(flow_rate: f32) -> EmitterSettings {
        EmitterSettings {
            nozzle_width: 0.0,
            flow_rate,
            eject_speed: 3.0,
            eject_speed_range: Vec2::ONE,
            start_delay: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn flow_rate_accumulates_across_frames() {
        let mut emitter = ParticleEmitter::new(steady(2.0));
        assert_eq!(emitter.update(0.25).len(), 0);
        assert_eq!(emitter.update(0.25).len(), 1);
        assert_eq!(emitter.update(1.0).len(), 2);

        let mut emitter = ParticleEmitter::new(steady(64.0));
        assert_eq!(emitter.update(0.5).len(), 32);
    }

    #[test]
    fn ejects_along_direction() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            position: Vec2::new(1.0, 2.0),
            ..steady(4.0)
        });
        let spawned = emitter.update(0.25);
        assert_eq!(spawned.positions, vec![Vec2::new(1.0, 2.0)]);
        assert_eq!(spawned.velocities, vec![Vec2::new(0.0, -3.0)]);
    }

    #[test]
    fn nozzle_width_and_speed_range() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            nozzle_width: 2.0,
            eject_speed_range: Vec2::new(0.5, 1.5),
            ..steady(100.0)
        });
        let spawned = emitter.update(1.0);
        assert!(spawned.len() >= 99);
        for (pos, vel) in spawned.positions.iter().zip(&spawned.velocities) {
            // straight down, so the nozzle spreads along x
            assert!(pos.x.abs() <= 1.0 && pos.y == 0.0);
            assert!(vel.x.abs() < 1e-6);
            assert!(vel.y <= -1.5 + 1e-5 && vel.y >= -4.5 - 1e-5);
        }
    }

    #[test]
    fn waits_for_start_delay() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            start_delay: 1.0,
            ..steady(2.0)
        });
        assert!(emitter.update(0.5).is_empty());
        assert!(emitter.update(0.5).is_empty());
        assert_eq!(emitter.update(0.5).len(), 1);
    }

    #[test]
    fn stops_after_duration() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            duration: 1.0,
            ..steady(4.0)
        });
        let total: usize = (0..8).map(|_| emitter.update(0.25).len()).sum();
        assert_eq!(total, 4);
        assert!(!emitter.is_emitting());

        emitter.start();
        assert_eq!(emitter.update(0.5).len(), 2);
    }

    #[test]
    fn stopped_emitter_is_silent() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            start_active: false,
            ..steady(64.0)
        });
        assert!(emitter.update(1.0).is_empty());
        emitter.start();
        assert_eq!(emitter.update(0.5).len(), 32);
        emitter.stop();
        assert!(emitter.update(1.0).is_empty());
    }

    #[test]
    fn swings_around_direction() {
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            swing_angle: 90.0,
            swing_speed: 0.25,
            ..steady(0.0)
        });
        assert_eq!(emitter.current_direction(), Vec2::NEG_Y);
        // a quarter of a swing period puts it at the full angle
        emitter.update(1.0);
        assert!((emitter.current_direction() - Vec2::X).length() < 1e-5);
    }

    #[test]
    fn emits_into_a_simulation() {
        let spawn = SpawnData::grid(2, 2, 0.2, Vec2::ZERO);
        let mut sph = SPHState::initialize(spawn, Default::default()).unwrap();
        let mut emitter = ParticleEmitter::new(EmitterSettings {
            position: Vec2::new(0.0, 3.0),
            ..steady(8.0)
        });

        assert_eq!(emitter.emit(0.5, &mut sph), 4);
        assert_eq!(sph.particle_count(), 8);
        assert_eq!(sph.positions()[7], Vec2::new(0.0, 3.0));
        assert_eq!(sph.velocities()[7], Vec2::new(0.0, -3.0));
        sph.step(1.0 / 180.0);
        assert!(sph.positions().iter().all(|p| p.is_finite()));
    }
}
