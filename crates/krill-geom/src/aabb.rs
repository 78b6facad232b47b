// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

use glam::{DQuat, DVec3};

/// Axis-aligned bounding box in world coordinates.
///
/// Invariants:
/// - `min` components are less than or equal to `max` components.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: DVec3,
    max: DVec3,
}

impl Aabb {
    /// Constructs an AABB from its minimum and maximum corners.
    ///
    /// # Panics
    /// Panics if any component of `min` is greater than its counterpart in
    /// `max`.
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "invalid AABB: min > max"
        );
        Self { min, max }
    }

    /// Builds an AABB centred at `centre` with the given half-extents.
    #[must_use]
    pub fn from_centre_half_extents(centre: DVec3, half_extents: DVec3) -> Self {
        Self::new(centre - half_extents, centre + half_extents)
    }

    /// Builds the box covering an oriented body: half-extents are projected
    /// through the rotation so the result bounds the rotated volume.
    #[must_use]
    pub fn from_oriented_half_extents(
        centre: DVec3,
        half_extents: DVec3,
        orientation: DQuat,
    ) -> Self {
        // Project each local axis; the bound per world axis is the sum of the
        // absolute contributions.
        let ax = (orientation * DVec3::new(half_extents.x, 0.0, 0.0)).abs();
        let ay = (orientation * DVec3::new(0.0, half_extents.y, 0.0)).abs();
        let az = (orientation * DVec3::new(0.0, 0.0, half_extents.z)).abs();
        let extent = ax + ay + az;
        Self::new(centre - extent, centre + extent)
    }

    /// Minimum corner.
    #[must_use]
    pub const fn min(&self) -> DVec3 {
        self.min
    }

    /// Maximum corner.
    #[must_use]
    pub const fn max(&self) -> DVec3 {
        self.max
    }

    /// Centre of the box.
    #[must_use]
    pub fn centre(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents of the box.
    #[must_use]
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns `true` if this box overlaps another.
    ///
    /// Touching faces do not count as an overlap; collision checks want
    /// actual interpenetration.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Returns `true` if `point` lies inside or on the boundary of the box.
    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Returns the union of two boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Inflates the box by a uniform margin in all directions.
    #[must_use]
    pub fn inflate(&self, margin: f64) -> Self {
        let delta = DVec3::splat(margin);
        Self {
            min: self.min - delta,
            max: self.max + delta,
        }
    }
}
