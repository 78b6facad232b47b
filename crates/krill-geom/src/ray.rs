// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

use glam::DVec3;

/// A finite ray in world space, stored as its two end points.
///
/// Intersection parameters `t` are always normalised to the segment: `t = 0`
/// is the start point, `t = 1` the end point. Storing end points rather than
/// origin + direction keeps the common sensor path (start at an anchor, end
/// at anchor + range) free of normalisation round-trips.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray3 {
    start: DVec3,
    end: DVec3,
}

impl Ray3 {
    /// Creates a ray from its start and end points.
    #[must_use]
    pub const fn new(start: DVec3, end: DVec3) -> Self {
        Self { start, end }
    }

    /// Creates a ray from a start point, a direction, and a length.
    ///
    /// The direction does not need to be normalised.
    #[must_use]
    pub fn from_direction(start: DVec3, direction: DVec3, length: f64) -> Self {
        let end = start + direction.normalize_or_zero() * length;
        Self { start, end }
    }

    /// Start point of the ray.
    #[must_use]
    pub const fn start(&self) -> DVec3 {
        self.start
    }

    /// End point of the ray.
    #[must_use]
    pub const fn end(&self) -> DVec3 {
        self.end
    }

    /// The vector from start to end (unnormalised).
    #[must_use]
    pub fn to_vector(&self) -> DVec3 {
        self.end - self.start
    }

    /// Unit direction of the ray, or zero for a degenerate ray.
    #[must_use]
    pub fn direction(&self) -> DVec3 {
        self.to_vector().normalize_or_zero()
    }

    /// Length of the ray.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.to_vector().length()
    }

    /// Squared length of the ray.
    #[must_use]
    pub fn length_squared(&self) -> f64 {
        self.to_vector().length_squared()
    }

    /// Returns the point on the segment at parameter `t ∈ [0, 1]`.
    ///
    /// Values outside the range extrapolate along the carrying line.
    #[must_use]
    pub fn point_at(&self, t: f64) -> DVec3 {
        self.start + self.to_vector() * t
    }

    /// Distance from the start to the point at parameter `t`.
    #[must_use]
    pub fn distance_at(&self, t: f64) -> f64 {
        (self.to_vector() * t).length()
    }
}
