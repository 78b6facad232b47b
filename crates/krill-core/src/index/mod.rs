// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Positional indices: spatial acceleration structures over entity keys.
//!
//! Two backends implement the same query contract: a bounded uniform grid
//! and an unbounded linear-probe space hash. Indices are rebuilt between the
//! physics and sense phases and frozen for the rest of the tick, so
//! concurrent reads during media/sense need no locking beyond the rebuild
//! point.
//!
//! Queries are cell-granular: a sphere query visits every item registered in
//! a cell whose integer offset lies within the radius. Callers that need
//! exact ranges filter on true distance afterwards.

pub mod grid;
pub mod space_hash;

use std::hash::Hash;

use glam::DVec3;

pub use grid::UniformGrid;
pub use space_hash::SpaceHash;

/// Query contract shared by every positional index.
///
/// The visitor returns `true` to continue and `false` to stop the query
/// early. Each registered item is visited at most once per query, no matter
/// how many cells it spans.
pub trait PositionalIndex<I: Copy + Eq + Hash> {
    /// Removes every registered item.
    fn clear(&mut self);

    /// Visits the items registered in cells overlapping the axis-aligned
    /// box `centre ± half_extents`.
    fn for_entities_in_box_range(
        &self,
        centre: DVec3,
        half_extents: DVec3,
        op: &mut dyn FnMut(I) -> bool,
    );

    /// Visits the items registered in cells within `radius` of `centre`.
    fn for_entities_in_sphere_range(&self, centre: DVec3, radius: f64, op: &mut dyn FnMut(I) -> bool);
}
