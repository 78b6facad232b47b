// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Linear-probe space hash keyed by integer-quantised coordinates.

use std::hash::Hash;

use glam::DVec3;
use krill_geom::Aabb;
use rustc_hash::FxHashSet;

use super::PositionalIndex;

const INITIAL_CAPACITY: usize = 256;
const MAX_LOAD_NUM: usize = 7;
const MAX_LOAD_DEN: usize = 10;

#[derive(Debug, Clone)]
struct Bucket<I> {
    cell: (i32, i32, i32),
    items: Vec<I>,
}

/// An unbounded spatial hash over quantised cell coordinates.
///
/// Collisions resolve by linear probing; the table grows when its load
/// factor passes 0.7. An item may be registered in many cells; queries
/// deduplicate per call.
#[derive(Debug)]
pub struct SpaceHash<I> {
    cell_size: f64,
    buckets: Vec<Option<Bucket<I>>>,
    occupied: usize,
}

impl<I: Copy + Eq + Hash> SpaceHash<I> {
    /// Creates an empty hash with the given cell edge length.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            buckets: vec![None; INITIAL_CAPACITY],
            occupied: 0,
        }
    }

    /// Cell edge length in metres.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Quantises one space coordinate to a hash-table coordinate.
    #[must_use]
    pub fn space_to_hash(&self, v: f64) -> i32 {
        (v / self.cell_size).floor() as i32
    }

    /// Maps a hash-table coordinate back to the space coordinate of the
    /// cell's lower corner.
    #[must_use]
    pub fn hash_to_space(&self, c: i32) -> f64 {
        f64::from(c) * self.cell_size
    }

    fn slot_for(&self, cell: (i32, i32, i32)) -> usize {
        // Standard spatial-hash mix of the three quantised coordinates.
        let h = (cell.0.wrapping_mul(73_856_093)
            ^ cell.1.wrapping_mul(19_349_663)
            ^ cell.2.wrapping_mul(83_492_791)) as u32;
        h as usize & (self.buckets.len() - 1)
    }

    /// Registers `item` in the cell at integer coordinates `(i, j, k)`.
    pub fn update_cell(&mut self, i: i32, j: i32, k: i32, item: I) {
        if (self.occupied + 1) * MAX_LOAD_DEN > self.buckets.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let cell = (i, j, k);
        let mut slot = self.slot_for(cell);
        loop {
            match &mut self.buckets[slot] {
                Some(bucket) if bucket.cell == cell => {
                    if bucket.items.last() != Some(&item) {
                        bucket.items.push(item);
                    }
                    return;
                }
                Some(_) => {
                    slot = (slot + 1) & (self.buckets.len() - 1);
                }
                empty @ None => {
                    *empty = Some(Bucket {
                        cell,
                        items: vec![item],
                    });
                    self.occupied += 1;
                    return;
                }
            }
        }
    }

    fn grow(&mut self) {
        let old = std::mem::replace(&mut self.buckets, vec![None; 0]);
        self.buckets = vec![None; old.len() * 2];
        self.occupied = 0;
        for bucket in old.into_iter().flatten() {
            let mut slot = self.slot_for(bucket.cell);
            loop {
                if self.buckets[slot].is_none() {
                    self.buckets[slot] = Some(bucket);
                    self.occupied += 1;
                    break;
                }
                slot = (slot + 1) & (self.buckets.len() - 1);
            }
        }
    }

    fn cell_items(&self, cell: (i32, i32, i32)) -> Option<&[I]> {
        let mut slot = self.slot_for(cell);
        let mut probed = 0;
        while probed < self.buckets.len() {
            match &self.buckets[slot] {
                Some(bucket) if bucket.cell == cell => return Some(&bucket.items),
                Some(_) => {
                    slot = (slot + 1) & (self.buckets.len() - 1);
                    probed += 1;
                }
                None => return None,
            }
        }
        None
    }

    /// Registers an embodied item over every cell its bounding box touches.
    pub fn update_embodied(&mut self, item: I, bounding_box: &Aabb) {
        let min = bounding_box.min();
        let max = bounding_box.max();
        let (min_i, min_j, min_k) = (
            self.space_to_hash(min.x),
            self.space_to_hash(min.y),
            self.space_to_hash(min.z),
        );
        let (max_i, max_j, max_k) = (
            self.space_to_hash(max.x),
            self.space_to_hash(max.y),
            self.space_to_hash(max.z),
        );
        for k in min_k..=max_k {
            for j in min_j..=max_j {
                for i in min_i..=max_i {
                    self.update_cell(i, j, k, item);
                }
            }
        }
    }

    /// Registers a range-limited emitter over every cell within `range` of
    /// `centre`: each octant cell `(i, j, k)` with `i² + j² + k² ≤ r²` (in
    /// cell units) is mirrored across the three axes in one pass, with zero
    /// axes guarded against double counting.
    pub fn update_emitter_sphere(&mut self, item: I, centre: DVec3, range: f64) {
        let ci = self.space_to_hash(centre.x);
        let cj = self.space_to_hash(centre.y);
        let ck = self.space_to_hash(centre.z);
        let rc = range / self.cell_size;
        let rc2 = rc * rc;
        let reach = rc.floor() as i32;
        for i in 0..=reach {
            for j in 0..=reach {
                if f64::from(i * i + j * j) > rc2 {
                    break;
                }
                for k in 0..=reach {
                    if f64::from(i * i + j * j + k * k) > rc2 {
                        break;
                    }
                    for (si, sj, sk) in OCTANTS {
                        // Mirroring a zero offset would revisit the cell.
                        if (si < 0 && i == 0) || (sj < 0 && j == 0) || (sk < 0 && k == 0) {
                            continue;
                        }
                        self.update_cell(ci + si * i, cj + sj * j, ck + sk * k, item);
                    }
                }
            }
        }
    }
}

const OCTANTS: [(i32, i32, i32); 8] = [
    (1, 1, 1),
    (1, 1, -1),
    (1, -1, 1),
    (1, -1, -1),
    (-1, 1, 1),
    (-1, 1, -1),
    (-1, -1, 1),
    (-1, -1, -1),
];

impl<I: Copy + Eq + Hash> PositionalIndex<I> for SpaceHash<I> {
    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = None;
        }
        self.occupied = 0;
    }

    fn for_entities_in_box_range(
        &self,
        centre: DVec3,
        half_extents: DVec3,
        op: &mut dyn FnMut(I) -> bool,
    ) {
        let min = centre - half_extents;
        let max = centre + half_extents;
        let mut visited: FxHashSet<I> = FxHashSet::default();
        for k in self.space_to_hash(min.z)..=self.space_to_hash(max.z) {
            for j in self.space_to_hash(min.y)..=self.space_to_hash(max.y) {
                for i in self.space_to_hash(min.x)..=self.space_to_hash(max.x) {
                    if let Some(items) = self.cell_items((i, j, k)) {
                        for &item in items {
                            if visited.insert(item) && !op(item) {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    fn for_entities_in_sphere_range(
        &self,
        centre: DVec3,
        radius: f64,
        op: &mut dyn FnMut(I) -> bool,
    ) {
        let ci = self.space_to_hash(centre.x);
        let cj = self.space_to_hash(centre.y);
        let ck = self.space_to_hash(centre.z);
        let rc = radius / self.cell_size;
        let rc2 = rc * rc;
        let reach = rc.ceil() as i32;
        let mut visited: FxHashSet<I> = FxHashSet::default();
        for dk in -reach..=reach {
            for dj in -reach..=reach {
                for di in -reach..=reach {
                    if f64::from(di * di + dj * dj + dk * dk) > rc2 + 1.0 {
                        continue;
                    }
                    if let Some(items) = self.cell_items((ci + di, cj + dj, ck + dk)) {
                        for &item in items {
                            if visited.insert(item) && !op(item) {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
