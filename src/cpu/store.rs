// particle buffers and the grow-only capacity manager
use glam::Vec2;

/// Struct-of-arrays particle storage, every array has `capacity` slots.
/// `density` holds (density, near density).
#[derive(Clone, Debug, Default)]
pub struct ParticleBuffer {
    pub position: Vec<Vec2>,
    pub predicted_position: Vec<Vec2>,
    pub velocity: Vec<Vec2>,
    pub density: Vec<Vec2>,
}

impl ParticleBuffer {
    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    // Vec::resize keeps the existing prefix, which is the bulk copy on reallocation
    fn grow(&mut self, capacity: usize) {
        self.position.resize(capacity, Vec2::ZERO);
        self.predicted_position.resize(capacity, Vec2::ZERO);
        self.velocity.resize(capacity, Vec2::ZERO);
        self.density.resize(capacity, Vec2::ZERO);
    }

    pub fn write(&mut self, index: usize, position: Vec2, velocity: Vec2) {
        self.position[index] = position;
        self.predicted_position[index] = position;
        self.velocity[index] = velocity;
    }
}

/// Particle data in stable external order plus the hash-sorted shadow copy
/// the kernels work on.
#[derive(Clone, Debug, Default)]
pub struct ParticleStore {
    pub particles: ParticleBuffer,
    pub sort_target: ParticleBuffer,
    count: usize,
    generation: u64,
}

impl ParticleStore {
    pub fn new(count: usize) -> Self {
        let mut store = Self::default();
        store.set_particle_count(count);
        store
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.particles.capacity()
    }

    /// Bumped on every reallocation. Anything holding onto buffer
    /// contents (GPU mirrors, hash tables) must rebind when it changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true when the buffers were reallocated.
    pub fn set_particle_count(&mut self, count: usize) -> bool {
        if count == self.count && count <= self.capacity() {
            return false;
        }
        self.count = count;
        if count <= self.capacity() {
            return false;
        }

        let capacity = count.next_power_of_two();
        self.particles.grow(capacity);
        self.sort_target.grow(capacity);
        self.generation += 1;
        true
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.particles.position[..self.count]
    }

    pub fn predicted_positions(&self) -> &[Vec2] {
        &self.particles.predicted_position[..self.count]
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.particles.velocity[..self.count]
    }

    pub fn densities(&self) -> &[Vec2] {
        &self.particles.density[..self.count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_to_power_of_two_and_keeps_data() {
        let mut store = ParticleStore::new(3);
        assert_eq!(store.capacity(), 4);
        for i in 0..3 {
            store.particles.write(i, Vec2::splat(i as f32), Vec2::X);
        }

        assert!(!store.set_particle_count(4));
        store.particles.write(3, Vec2::new(9.0, 9.0), Vec2::Y);
        assert_eq!(store.generation(), 1);

        assert!(store.set_particle_count(5));
        store.particles.write(4, Vec2::new(7.0, 7.0), Vec2::ZERO);
        assert_eq!(store.count(), 5);
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.generation(), 2);
        assert_eq!(store.positions()[1], Vec2::ONE);
        assert_eq!(store.positions()[3], Vec2::new(9.0, 9.0));
        assert_eq!(store.predicted_positions()[4], Vec2::new(7.0, 7.0));
        assert_eq!(store.velocities()[0], Vec2::X);
    }

    #[test]
    fn same_count_is_a_no_op() {
        let mut store = ParticleStore::new(5);
        store.particles.write(2, Vec2::new(1.0, 2.0), Vec2::ONE);
        let before = store.particles.position.as_ptr();
        let generation = store.generation();

        assert!(!store.set_particle_count(5));
        assert_eq!(store.particles.position.as_ptr(), before);
        assert_eq!(store.generation(), generation);
        assert_eq!(store.positions()[2], Vec2::new(1.0, 2.0));
    }

    #[test]
    fn never_shrinks() {
        let mut store = ParticleStore::new(10);
        assert!(!store.set_particle_count(2));
        assert_eq!(store.count(), 2);
        assert_eq!(store.capacity(), 16);
        assert_eq!(store.positions().len(), 2);
    }

    #[test]
    fn empty_store() {
        let store = ParticleStore::new(0);
        assert_eq!(store.count(), 0);
        assert!(store.positions().is_empty());
    }
}
