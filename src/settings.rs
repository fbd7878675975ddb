//! Simulation settings and the RON config file that carries them.

use std::path::Path;

use bevy::prelude::Resource;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::cpu::emitter::EmitterSettings;
use crate::cpu::spawn::Spawner;
use crate::error::{FluidError, Result};

/// Tunables of the fluid. Defaults give a calm water tank.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidSettings {
    pub time_scale: f32,
    /// If a frame takes longer than 1 / this, the simulation slows down
    /// instead of taking one huge step. 0 disables the cap.
    pub max_timestep_fps: f32,
    pub iterations_per_frame: i32,
    /// Downward acceleration, positive pulls towards -y.
    pub gravity: f32,
    /// 1 = perfectly elastic walls, 0 = walls absorb the normal velocity.
    pub collision_damping: f32,
    pub smoothing_radius: f32,
    pub target_density: f32,
    pub pressure_multiplier: f32,
    pub near_pressure_multiplier: f32,
    pub viscosity_strength: f32,
    pub bounds_size: Vec2,
    pub obstacle_size: Vec2,
    pub obstacle_centre: Vec2,
    pub interaction_radius: f32,
    pub interaction_strength: f32,
}

impl Default for FluidSettings {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_timestep_fps: 60.0,
            iterations_per_frame: 3,
            gravity: 12.0,
            collision_damping: 0.95,
            smoothing_radius: 0.35,
            target_density: 55.0,
            pressure_multiplier: 500.0,
            near_pressure_multiplier: 18.0,
            viscosity_strength: 0.06,
            bounds_size: Vec2::new(17.1, 9.3),
            obstacle_size: Vec2::ZERO,
            obstacle_centre: Vec2::ZERO,
            interaction_radius: 2.0,
            interaction_strength: 90.0,
        }
    }
}

impl FluidSettings {
    /// Rejects settings the solver cannot run with and clamps the bounded sliders.
    /// The smoothing radius is never clamped, a bad radius is always an error.
    pub fn validated(mut self) -> Result<Self> {
        if !self.smoothing_radius.is_finite() || self.smoothing_radius <= 0.0 {
            return Err(FluidError::InvalidConfiguration {
                field: "smoothing_radius",
                reason: "must be positive and finite",
            });
        }
        if self.iterations_per_frame < 0 {
            return Err(FluidError::InvalidConfiguration {
                field: "iterations_per_frame",
                reason: "must not be negative",
            });
        }
        if !self.bounds_size.is_finite() {
            return Err(FluidError::InvalidConfiguration {
                field: "bounds_size",
                reason: "must be finite",
            });
        }

        self.collision_damping = self.collision_damping.clamp(0.0, 1.0);
        self.time_scale = self.time_scale.max(0.0);
        self.max_timestep_fps = self.max_timestep_fps.max(0.0);
        Ok(self)
    }

    /// Longest frame the simulation is allowed to advance in one go.
    pub fn max_frame_time(&self) -> f32 {
        if self.max_timestep_fps > 0.0 {
            1.0 / self.max_timestep_fps
        } else {
            f32::INFINITY
        }
    }
}

/// Settings, initial particle layout and runtime emitters, as stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidConfig {
    pub settings: FluidSettings,
    pub spawner: Spawner,
    pub emitters: Vec<EmitterSettings>,
}

impl FluidConfig {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        let settings = config.settings.validated()?;
        Ok(Self { settings, ..config })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_radius() {
        for radius in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let settings = FluidSettings {
                smoothing_radius: radius,
                ..Default::default()
            };
            assert!(matches!(
                settings.validated(),
                Err(FluidError::InvalidConfiguration {
                    field: "smoothing_radius",
                    ..
                })
            ));
        }
    }

    #[test]
    fn rejects_negative_iterations() {
        let settings = FluidSettings {
            iterations_per_frame: -1,
            ..Default::default()
        };
        assert!(settings.validated().is_err());
    }

    #[test]
    fn clamps_damping() {
        let settings = FluidSettings {
            collision_damping: 1.7,
            ..Default::default()
        };
        assert_eq!(settings.validated().unwrap().collision_damping, 1.0);

        let settings = FluidSettings {
            collision_damping: -0.2,
            ..Default::default()
        };
        assert_eq!(settings.validated().unwrap().collision_damping, 0.0);
    }

    #[test]
    fn max_frame_time() {
        let mut settings = FluidSettings::default();
        assert!((settings.max_frame_time() - 1.0 / 60.0).abs() < 1e-7);
        settings.max_timestep_fps = 0.0;
        assert_eq!(settings.max_frame_time(), f32::INFINITY);
    }

    #[test]
    fn parses_shipped_config() {
        let config = FluidConfig::from_ron_str(include_str!("../config/fluid2d.ron")).unwrap();
        assert_eq!(config.settings.iterations_per_frame, 3);
        assert_eq!(config.settings.bounds_size, Vec2::new(17.1, 9.3));
        assert_eq!(config.spawner.regions.len(), 1);
        assert_eq!(config.spawner.spawn_data().len(), 2000);
        assert_eq!(config.emitters.len(), 1);
        assert_eq!(config.emitters[0].flow_rate, 30.0);
        assert_eq!(config.emitters[0].duration, 4.0);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config = FluidConfig::from_ron_str("(settings: (gravity: 3.0))").unwrap();
        assert_eq!(config.settings.gravity, 3.0);
        assert_eq!(config.settings.smoothing_radius, 0.35);
        assert!(config.spawner.regions.is_empty());
        assert!(config.emitters.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = FluidConfig::from_ron_str("(settings: (smoothing_radius: 0.0))").unwrap_err();
        assert!(matches!(err, FluidError::InvalidConfiguration { .. }));
        let err = FluidConfig::from_ron_str("(settings: (gravity: ").unwrap_err();
        assert!(matches!(err, FluidError::Ron(_)));
    }
}
