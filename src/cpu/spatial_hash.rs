//! Spatial hash grid used for fixed-radius neighbour search.
//!
//! Every step the grid is rebuilt from scratch in three passes: hash each
//! particle's predicted position into a bucket key, sort the
//! `(key, particle_index)` entries, then derive a per-bucket offset table
//! pointing into the sorted entries. Neighbour queries scan the 3x3 block of
//! cells around a position, which is complete as long as the cell size equals
//! the smoothing radius.

use std::ops::Range;

use glam::{IVec2, Vec2};
use rayon::prelude::*;

use crate::cpu::sort::bitonic_sort;

pub const CELL_OFFSETS: [IVec2; 9] = [
    IVec2::new(-1, 1),
    IVec2::new(0, 1),
    IVec2::new(1, 1),
    IVec2::new(-1, 0),
    IVec2::new(0, 0),
    IVec2::new(1, 0),
    IVec2::new(-1, -1),
    IVec2::new(0, -1),
    IVec2::new(1, -1),
];

const HASH_K1: u32 = 15823;
const HASH_K2: u32 = 9737333;

#[inline]
pub fn cell_coord(pos: Vec2, radius: f32) -> IVec2 {
    (pos / radius).floor().as_ivec2()
}

// negative coordinates wrap, that is fine since only equality matters
#[inline]
pub fn hash_cell(cell: IVec2) -> u32 {
    (cell.x as u32)
        .wrapping_mul(HASH_K1)
        .wrapping_add((cell.y as u32).wrapping_mul(HASH_K2))
}

#[inline]
pub fn key_from_hash(hash: u32, table_size: u32) -> u32 {
    hash % table_size
}

/// One entry per particle. Ordering is by key first and particle index
/// second so a sort is fully deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpatialEntry {
    pub key: u32,
    pub particle_index: u32,
}

impl SpatialEntry {
    const PADDING: Self = Self {
        key: u32::MAX,
        particle_index: u32::MAX,
    };
}

#[derive(Clone, Debug)]
pub struct SpatialHash {
    table_size: u32,
    len: usize,
    entries: Vec<SpatialEntry>,
    offsets: Vec<u32>,
    sort_scratch: Vec<SpatialEntry>,
}

impl SpatialHash {
    /// Table size follows the particle capacity, so this has to be rebuilt
    /// whenever the particle buffers are reallocated.
    pub fn new(capacity: usize) -> Self {
        let table_size = capacity.max(1);
        Self {
            table_size: table_size as u32,
            len: 0,
            entries: Vec::with_capacity(capacity),
            offsets: vec![0; table_size],
            sort_scratch: Vec::with_capacity(capacity.next_power_of_two()),
        }
    }

    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    pub fn key_for(&self, pos: Vec2, radius: f32) -> u32 {
        key_from_hash(hash_cell(cell_coord(pos, radius)), self.table_size)
    }

    /// Sorted entries of the last build.
    pub fn entries(&self) -> &[SpatialEntry] {
        &self.entries[..self.len]
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Runs the hash, sort and offset passes over `positions`.
    pub fn build(&mut self, positions: &[Vec2], radius: f32) {
        self.len = positions.len();
        self.hash_pass(positions, radius);
        self.sort_pass();
        self.offset_pass();
    }

    fn hash_pass(&mut self, positions: &[Vec2], radius: f32) {
        let table_size = self.table_size;
        self.entries.clear();
        self.entries.par_extend(positions.par_iter().enumerate().map(|(i, &pos)| SpatialEntry {
            key: key_from_hash(hash_cell(cell_coord(pos, radius)), table_size),
            particle_index: i as u32,
        }));
    }

    fn sort_pass(&mut self) {
        let padded = self.len.next_power_of_two();
        self.sort_scratch.clear();
        self.sort_scratch.extend_from_slice(&self.entries);
        self.sort_scratch.resize(padded, SpatialEntry::PADDING);

        bitonic_sort(&mut self.sort_scratch);

        self.entries.copy_from_slice(&self.sort_scratch[..self.len]);
    }

    // offsets[h] = first sorted slot with key >= h, one work item per bucket
    fn offset_pass(&mut self) {
        let entries = &self.entries[..self.len];
        self.offsets.par_iter_mut().enumerate().for_each(|(h, offset)| {
            *offset = entries.partition_point(|e| e.key < h as u32) as u32;
        });
    }

    /// Sorted slots holding entries of bucket `key`.
    pub fn bucket(&self, key: u32) -> Range<usize> {
        let start = self.offsets[key as usize] as usize;
        let end = self
            .offsets
            .get(key as usize + 1)
            .map_or(self.len, |&end| end as usize);
        start..end
    }

    /// Calls `f` with every sorted slot whose bucket belongs to one of the
    /// 9 cells around `pos`. Buckets shared by several of those cells are
    /// only visited once. Candidates still need a distance check.
    pub fn for_each_candidate(&self, pos: Vec2, radius: f32, mut f: impl FnMut(usize)) {
        let origin = cell_coord(pos, radius);
        let mut visited = [u32::MAX; 9];
        for (i, offset) in CELL_OFFSETS.iter().enumerate() {
            let key = key_from_hash(hash_cell(origin + *offset), self.table_size);
            if visited[..i].contains(&key) {
                continue;
            }
            visited[i] = key;
            for slot in self.bucket(key) {
                f(slot);
            }
        }
    }

    /// Neighbour scan in sorted order. `sorted_positions[slot]` must be the
    /// position the grid was built from. `f` gets the neighbour slot, the offset
    /// from `pos` to the neighbour and the distance.
    pub fn for_each_neighbour(
        &self,
        sorted_positions: &[Vec2],
        pos: Vec2,
        radius: f32,
        mut f: impl FnMut(usize, Vec2, f32),
    ) {
        let sqr_radius = radius * radius;
        self.for_each_candidate(pos, radius, |slot| {
            let offset = sorted_positions[slot] - pos;
            let sqr_dst = offset.length_squared();
            if sqr_dst > sqr_radius {
                return;
            }
            f(slot, offset, sqr_dst.sqrt());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn sorted_positions(hash: &SpatialHash, positions: &[Vec2]) -> Vec<Vec2> {
        hash.entries()
            .iter()
            .map(|e| positions[e.particle_index as usize])
            .collect()
    }

    #[test]
    fn entries_are_a_sorted_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        let positions: Vec<Vec2> = (0..300)
            .map(|_| Vec2::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0)))
            .collect();
        let mut hash = SpatialHash::new(512);
        hash.build(&positions, 0.5);

        let entries = hash.entries();
        assert!(entries.windows(2).all(|w| w[0] < w[1]));
        let mut seen: Vec<u32> = entries.iter().map(|e| e.particle_index).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn offsets_are_monotone_and_count_buckets() {
        let mut rng = StdRng::seed_from_u64(2);
        let positions: Vec<Vec2> = (0..200)
            .map(|_| Vec2::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)))
            .collect();
        let mut hash = SpatialHash::new(256);
        hash.build(&positions, 0.4);

        assert!(hash.offsets().windows(2).all(|w| w[0] <= w[1]));
        for key in 0..hash.table_size() {
            let expected = hash.entries().iter().filter(|e| e.key == key).count();
            assert_eq!(hash.bucket(key).len(), expected);
        }
    }

    #[test]
    fn neighbour_scan_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(3);
        for round in 0..20 {
            let n = 200;
            let radius = rng.gen_range(0.2..1.0);
            let extent = rng.gen_range(1.0..6.0);
            let positions: Vec<Vec2> = (0..n)
                .map(|_| Vec2::new(rng.gen_range(-extent..extent), rng.gen_range(-extent..extent)))
                .collect();
            // small tables on purpose in some rounds to force collisions
            let capacity = if round % 2 == 0 { n } else { 7 };
            let mut hash = SpatialHash::new(capacity);
            hash.build(&positions, radius);
            let sorted = sorted_positions(&hash, &positions);

            for (i, &pos) in positions.iter().enumerate() {
                let mut found = Vec::new();
                hash.for_each_neighbour(&sorted, pos, radius, |slot, _, _| {
                    found.push(hash.entries()[slot].particle_index as usize);
                });
                found.sort_unstable();

                let expected: Vec<usize> = (0..n)
                    .filter(|&j| (positions[j] - pos).length_squared() <= radius * radius)
                    .collect();
                assert_eq!(found, expected, "round {round}, particle {i}");
            }
        }
    }

    #[test]
    fn empty_build() {
        let mut hash = SpatialHash::new(0);
        hash.build(&[], 1.0);
        assert!(hash.entries().is_empty());
        assert_eq!(hash.bucket(0), 0..0);
    }

    #[test]
    fn adjacent_cells_never_miss() {
        // two particles straddling a cell border at negative coordinates
        let positions = [Vec2::new(-0.01, -0.01), Vec2::new(0.01, 0.01)];
        let mut hash = SpatialHash::new(2);
        hash.build(&positions, 1.0);
        let sorted = sorted_positions(&hash, &positions);

        let mut count = 0;
        hash.for_each_neighbour(&sorted, positions[0], 1.0, |_, _, _| count += 1);
        assert_eq!(count, 2);
    }
}
