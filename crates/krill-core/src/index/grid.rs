// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bounded uniform grid index.

use std::hash::Hash;

use glam::DVec3;
use krill_geom::Aabb;
use rustc_hash::FxHashSet;

use super::PositionalIndex;

/// A dense cell grid over a fixed arena volume.
///
/// Positions outside the volume clamp to the border cells, so items near
/// the arena walls are never lost; an unbounded world wants
/// [`super::SpaceHash`] instead.
#[derive(Debug)]
pub struct UniformGrid<I> {
    origin: DVec3,
    cell_size: f64,
    dims: [usize; 3],
    cells: Vec<Vec<I>>,
}

impl<I: Copy + Eq + Hash> UniformGrid<I> {
    /// Creates a grid covering `volume` with cubic cells of `cell_size`.
    #[must_use]
    pub fn new(volume: &Aabb, cell_size: f64) -> Self {
        let span = volume.max() - volume.min();
        let dims = [
            ((span.x / cell_size).ceil() as usize).max(1),
            ((span.y / cell_size).ceil() as usize).max(1),
            ((span.z / cell_size).ceil() as usize).max(1),
        ];
        Self {
            origin: volume.min(),
            cell_size,
            dims,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        }
    }

    fn cell_coord(&self, p: DVec3) -> [usize; 3] {
        let rel = (p - self.origin) / self.cell_size;
        [
            (rel.x.floor().max(0.0) as usize).min(self.dims[0] - 1),
            (rel.y.floor().max(0.0) as usize).min(self.dims[1] - 1),
            (rel.z.floor().max(0.0) as usize).min(self.dims[2] - 1),
        ]
    }

    fn cell_index(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    /// Registers `item` at a single point.
    pub fn insert_point(&mut self, item: I, position: DVec3) {
        let idx = self.cell_index(self.cell_coord(position));
        self.cells[idx].push(item);
    }

    /// Registers `item` over every cell its bounding box overlaps.
    pub fn insert_aabb(&mut self, item: I, bounding_box: &Aabb) {
        let lo = self.cell_coord(bounding_box.min());
        let hi = self.cell_coord(bounding_box.max());
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let idx = self.cell_index([x, y, z]);
                    self.cells[idx].push(item);
                }
            }
        }
    }

    fn visit_range(&self, lo: [usize; 3], hi: [usize; 3], op: &mut dyn FnMut(I) -> bool) {
        let mut visited: FxHashSet<I> = FxHashSet::default();
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    for &item in &self.cells[self.cell_index([x, y, z])] {
                        if visited.insert(item) && !op(item) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl<I: Copy + Eq + Hash> PositionalIndex<I> for UniformGrid<I> {
    fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    fn for_entities_in_box_range(
        &self,
        centre: DVec3,
        half_extents: DVec3,
        op: &mut dyn FnMut(I) -> bool,
    ) {
        let lo = self.cell_coord(centre - half_extents);
        let hi = self.cell_coord(centre + half_extents);
        self.visit_range(lo, hi, op);
    }

    fn for_entities_in_sphere_range(
        &self,
        centre: DVec3,
        radius: f64,
        op: &mut dyn FnMut(I) -> bool,
    ) {
        let half = DVec3::splat(radius);
        let lo = self.cell_coord(centre - half);
        let hi = self.cell_coord(centre + half);
        self.visit_range(lo, hi, op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> UniformGrid<u32> {
        UniformGrid::new(
            &Aabb::new(DVec3::new(-2.0, -2.0, 0.0), DVec3::new(2.0, 2.0, 2.0)),
            0.5,
        )
    }

    #[test]
    fn point_queries_find_their_cell() {
        let mut g = grid();
        g.insert_point(1, DVec3::new(0.1, 0.1, 0.1));
        g.insert_point(2, DVec3::new(1.6, 1.6, 0.1));
        let mut out = Vec::new();
        g.for_entities_in_box_range(DVec3::new(0.0, 0.0, 0.25), DVec3::splat(0.3), &mut |i| {
            out.push(i);
            true
        });
        assert_eq!(out, [1]);
    }

    #[test]
    fn out_of_bounds_positions_clamp_to_border_cells() {
        let mut g = grid();
        g.insert_point(5, DVec3::new(100.0, 100.0, 100.0));
        let mut out = Vec::new();
        g.for_entities_in_box_range(DVec3::new(1.9, 1.9, 1.9), DVec3::splat(0.2), &mut |i| {
            out.push(i);
            true
        });
        assert_eq!(out, [5]);
    }

    #[test]
    fn aabb_insertion_deduplicates_in_queries() {
        let mut g = grid();
        g.insert_aabb(9, &Aabb::new(DVec3::new(-1.0, -1.0, 0.0), DVec3::new(1.0, 1.0, 1.0)));
        let mut count = 0;
        g.for_entities_in_sphere_range(DVec3::ZERO, 1.5, &mut |_| {
            count += 1;
            true
        });
        assert_eq!(count, 1);
    }
}
