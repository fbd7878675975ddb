// frame time -> simulation time, plus play / pause / single step
use bevy::prelude::Resource;

use crate::settings::FluidSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Playing,
    Paused,
    /// Runs the next frame, then drops back to `Paused`.
    SteppingOnce,
}

#[derive(Resource, Clone, Debug, Default)]
pub struct SimulationClock {
    pub state: PlaybackState,
    /// Frame time carried over from frames that were skipped on purpose.
    pub pending_delta_time: f32,
    defer_frame: bool,
}

impl SimulationClock {
    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            PlaybackState::Paused => PlaybackState::Playing,
            PlaybackState::Playing | PlaybackState::SteppingOnce => PlaybackState::Paused,
        };
    }

    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
    }

    pub fn step_once(&mut self) {
        self.state = PlaybackState::SteppingOnce;
    }

    /// Skip the coming frame but keep its time for the next simulated one.
    pub fn defer_frame(&mut self) {
        self.defer_frame = true;
    }

    /// Simulation time to advance this frame, `None` while paused or deferred.
    pub fn frame_time_step(&mut self, frame_delta: f32, settings: &FluidSettings) -> Option<f32> {
        if std::mem::take(&mut self.defer_frame) {
            if !self.is_paused() {
                self.pending_delta_time += frame_delta;
            }
            return None;
        }
        match self.state {
            PlaybackState::Paused => return None,
            PlaybackState::SteppingOnce => self.state = PlaybackState::Paused,
            PlaybackState::Playing => {}
        }
        let dt = effective_frame_time(frame_delta + self.pending_delta_time, settings);
        self.pending_delta_time = 0.0;
        Some(dt)
    }
}

pub fn effective_frame_time(frame_delta: f32, settings: &FluidSettings) -> f32 {
    (frame_delta * settings.time_scale).min(settings.max_frame_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_long_frames() {
        let settings = FluidSettings::default();
        assert!((effective_frame_time(0.5, &settings) - 1.0 / 60.0).abs() < 1e-7);
        assert!((effective_frame_time(0.01, &settings) - 0.01).abs() < 1e-7);

        let uncapped = FluidSettings {
            max_timestep_fps: 0.0,
            time_scale: 2.0,
            ..Default::default()
        };
        assert!((effective_frame_time(0.5, &uncapped) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn paused_never_advances() {
        let settings = FluidSettings::default();
        let mut clock = SimulationClock::default();
        clock.toggle_pause();
        assert_eq!(clock.frame_time_step(0.01, &settings), None);
        clock.toggle_pause();
        assert!(clock.frame_time_step(0.01, &settings).is_some());
    }

    #[test]
    fn step_once_returns_to_paused() {
        let settings = FluidSettings::default();
        let mut clock = SimulationClock::default();
        clock.pause();
        clock.step_once();
        assert!(clock.frame_time_step(0.01, &settings).is_some());
        assert!(clock.is_paused());
        assert_eq!(clock.frame_time_step(0.01, &settings), None);
    }

    #[test]
    fn deferred_time_is_consumed_once() {
        let settings = FluidSettings {
            max_timestep_fps: 0.0,
            ..Default::default()
        };
        let mut clock = SimulationClock::default();
        clock.defer_frame();
        assert_eq!(clock.frame_time_step(0.004, &settings), None);
        let dt = clock.frame_time_step(0.006, &settings).unwrap();
        assert!((dt - 0.01).abs() < 1e-7);
        let dt = clock.frame_time_step(0.006, &settings).unwrap();
        assert!((dt - 0.006).abs() < 1e-7);
    }
}
