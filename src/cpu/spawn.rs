// initial particle layouts
use std::f32::consts::TAU;

use glam::Vec2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};

/// Positions and velocities the simulation starts from, and returns to on reset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnData {
    pub positions: Vec<Vec2>,
    pub velocities: Vec<Vec2>,
}

impl SpawnData {
    pub fn new(positions: Vec<Vec2>, velocities: Vec<Vec2>) -> Result<Self> {
        let data = Self { positions, velocities };
        data.check()?;
        Ok(data)
    }

    pub fn at_rest(positions: Vec<Vec2>) -> Self {
        let velocities = vec![Vec2::ZERO; positions.len()];
        Self { positions, velocities }
    }

    /// `n_x` by `n_y` particles at rest, row by row starting at `origin`.
    pub fn grid(n_x: usize, n_y: usize, spacing: f32, origin: Vec2) -> Self {
        let mut positions = Vec::with_capacity(n_x * n_y);
        for iy in 0..n_y {
            for ix in 0..n_x {
                positions.push(origin + Vec2::new(ix as f32, iy as f32) * spacing);
            }
        }
        Self::at_rest(positions)
    }

    pub fn check(&self) -> Result<()> {
        if self.positions.len() != self.velocities.len() {
            return Err(FluidError::SpawnDataMismatch {
                positions: self.positions.len(),
                velocities: self.velocities.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnRegion {
    pub centre: Vec2,
    pub size: Vec2,
    pub particle_count: u32,
}

/// Fills rectangular regions with a jittered grid of particles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spawner {
    pub regions: Vec<SpawnRegion>,
    pub initial_velocity: Vec2,
    pub jitter_strength: f32,
    pub seed: u64,
}

impl Default for Spawner {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            initial_velocity: Vec2::ZERO,
            jitter_strength: 0.03,
            seed: 42,
        }
    }
}

impl Spawner {
    pub fn spawn_data(&self) -> SpawnData {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut positions = Vec::new();

        for region in &self.regions {
            for point in grid_points(region) {
                let angle = rng.r#gen::<f32>() * TAU;
                let dir = Vec2::new(angle.cos(), angle.sin());
                let jitter = dir * self.jitter_strength * (rng.r#gen::<f32>() - 0.5);
                positions.push(point + jitter);
            }
        }

        let velocities = vec![self.initial_velocity; positions.len()];
        SpawnData { positions, velocities }
    }
}

// rows and columns chosen so the spacing is roughly square for the region's aspect ratio
fn grid_points(region: &SpawnRegion) -> Vec<Vec2> {
    let count = region.particle_count as usize;
    if count == 0 {
        return Vec::new();
    }
    let s = region.size;
    let (num_x, num_y) = if s.y > 0.0 {
        let aspect = s.x / s.y;
        let shift = (s.x - s.y) / (2.0 * s.y);
        let nx = ((aspect * count as f32 + shift * shift).sqrt() - shift).ceil().max(1.0) as usize;
        (nx, count.div_ceil(nx))
    } else {
        (count, 1)
    };

    let mut points = Vec::with_capacity(count);
    'rows: for y in 0..num_y {
        for x in 0..num_x {
            if points.len() == count {
                break 'rows;
            }
            let tx = if num_x <= 1 { 0.5 } else { x as f32 / (num_x - 1) as f32 };
            let ty = if num_y <= 1 { 0.5 } else { y as f32 / (num_y - 1) as f32 };
            points.push((Vec2::new(tx, ty) - 0.5) * s + region.centre);
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(count: u32) -> SpawnRegion {
        SpawnRegion {
            centre: Vec2::new(1.0, -2.0),
            size: Vec2::new(4.0, 2.0),
            particle_count: count,
        }
    }

    #[test]
    fn exact_count_inside_region() {
        for count in [1, 2, 17, 500] {
            let points = grid_points(&region(count));
            assert_eq!(points.len(), count as usize);
            for p in points {
                assert!(p.x >= -1.0 - 1e-5 && p.x <= 3.0 + 1e-5);
                assert!(p.y >= -3.0 - 1e-5 && p.y <= -1.0 + 1e-5);
            }
        }
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let spawner = Spawner {
            regions: vec![region(64)],
            initial_velocity: Vec2::new(0.5, 0.0),
            ..Default::default()
        };
        let a = spawner.spawn_data();
        let b = spawner.spawn_data();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.velocities.iter().all(|&v| v == Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = SpawnData::new(vec![Vec2::ZERO; 3], vec![Vec2::ZERO; 2]).unwrap_err();
        assert!(matches!(
            err,
            FluidError::SpawnDataMismatch {
                positions: 3,
                velocities: 2
            }
        ));
    }
}
