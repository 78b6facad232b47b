// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ray-intersectable primitive shapes.
//!
//! Every intersection follows the same contract: the returned `t` is
//! normalised to the ray length and lies in `(0, 1]`. A ray that starts on
//! or inside a shape reports the first surface crossing with `t > 0`;
//! tangential grazes count as hits; degenerate (zero-length) rays miss.

use glam::{DQuat, DVec3};

use crate::ray::Ray3;

/// Tolerance below which a direction component is treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-10;

/// A shape that can answer segment-intersection queries.
pub trait RayIntersect {
    /// Returns the smallest `t ∈ (0, 1]` at which `ray` crosses the shape
    /// surface, or `None` if the segment misses it.
    fn intersects_ray(&self, ray: &Ray3) -> Option<f64>;
}

/// An oriented box.
#[derive(Debug, Copy, Clone)]
pub struct Box3 {
    centre: DVec3,
    half_extents: DVec3,
    orientation: DQuat,
}

impl Box3 {
    /// Creates a box from its centre, half-extents, and orientation.
    #[must_use]
    pub fn new(centre: DVec3, half_extents: DVec3, orientation: DQuat) -> Self {
        Self {
            centre,
            half_extents,
            orientation,
        }
    }

    /// Box centre.
    #[must_use]
    pub const fn centre(&self) -> DVec3 {
        self.centre
    }

    /// Box half-extents.
    #[must_use]
    pub const fn half_extents(&self) -> DVec3 {
        self.half_extents
    }
}

impl RayIntersect for Box3 {
    fn intersects_ray(&self, ray: &Ray3) -> Option<f64> {
        if ray.length_squared() == 0.0 {
            return None;
        }
        // Work in the box frame; with the unnormalised segment vector the
        // slab parameters are already in ray-length units.
        let inv = self.orientation.inverse();
        let start = inv * (ray.start() - self.centre);
        let vec = inv * ray.to_vector();
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            let s = start[axis];
            let d = vec[axis];
            let h = self.half_extents[axis];
            if d.abs() < PARALLEL_EPSILON {
                if s < -h || s > h {
                    return None;
                }
            } else {
                let t0 = (-h - s) / d;
                let t1 = (h - s) / d;
                let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
                t_enter = t_enter.max(lo);
                t_exit = t_exit.min(hi);
                if t_enter > t_exit {
                    return None;
                }
            }
        }
        let t = if t_enter > 0.0 { t_enter } else { t_exit };
        (t > 0.0 && t <= 1.0).then_some(t)
    }
}

/// A finite cylinder described by its base centre, unit axis, radius, and
/// height.
#[derive(Debug, Copy, Clone)]
pub struct Cylinder {
    base: DVec3,
    axis: DVec3,
    radius: f64,
    height: f64,
}

impl Cylinder {
    /// Creates a cylinder; the axis is normalised internally.
    #[must_use]
    pub fn new(base: DVec3, axis: DVec3, radius: f64, height: f64) -> Self {
        Self {
            base,
            axis: axis.normalize_or_zero(),
            radius,
            height,
        }
    }

    /// Base-centre position.
    #[must_use]
    pub const fn base(&self) -> DVec3 {
        self.base
    }

    /// Cylinder radius.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Cylinder height.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }
}

impl RayIntersect for Cylinder {
    fn intersects_ray(&self, ray: &Ray3) -> Option<f64> {
        if ray.length_squared() == 0.0 {
            return None;
        }
        let w0 = ray.start() - self.base;
        let v = ray.to_vector();
        // Split into axial and radial components.
        let s0 = w0.dot(self.axis);
        let sv = v.dot(self.axis);
        let w_perp = w0 - self.axis * s0;
        let v_perp = v - self.axis * sv;
        let r2 = self.radius * self.radius;
        let mut best = f64::INFINITY;

        let a = v_perp.length_squared();
        if a > PARALLEL_EPSILON {
            // Lateral surface: |w_perp + t v_perp|² = r².
            let b = w_perp.dot(v_perp);
            let c = w_perp.length_squared() - r2;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                for t in [(-b - sq) / a, (-b + sq) / a] {
                    if t > 0.0 && t <= 1.0 {
                        let s = s0 + t * sv;
                        if (0.0..=self.height).contains(&s) {
                            best = best.min(t);
                        }
                    }
                }
            }
        } else if w_perp.length_squared() > r2 {
            // Parallel to the axis and radially outside.
            return None;
        }

        if sv.abs() > PARALLEL_EPSILON {
            // Caps at axial coordinates 0 and height.
            for plane_s in [0.0, self.height] {
                let t = (plane_s - s0) / sv;
                if t > 0.0 && t <= 1.0 {
                    let radial = (w0 + v * t) - self.axis * (s0 + t * sv);
                    if radial.length_squared() <= r2 {
                        best = best.min(t);
                    }
                }
            }
        }

        best.is_finite().then_some(best)
    }
}

/// A sphere.
#[derive(Debug, Copy, Clone)]
pub struct Sphere {
    centre: DVec3,
    radius: f64,
}

impl Sphere {
    /// Creates a sphere from centre and radius.
    #[must_use]
    pub const fn new(centre: DVec3, radius: f64) -> Self {
        Self { centre, radius }
    }

    /// Sphere centre.
    #[must_use]
    pub const fn centre(&self) -> DVec3 {
        self.centre
    }

    /// Sphere radius.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }
}

impl RayIntersect for Sphere {
    fn intersects_ray(&self, ray: &Ray3) -> Option<f64> {
        if ray.length_squared() == 0.0 {
            return None;
        }
        let v = ray.to_vector();
        let w = ray.start() - self.centre;
        let a = v.length_squared();
        let b = w.dot(v);
        let c = w.length_squared() - self.radius * self.radius;
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        for t in [(-b - sq) / a, (-b + sq) / a] {
            if t > 0.0 && t <= 1.0 {
                return Some(t);
            }
        }
        None
    }
}

/// An infinite plane described by a point and a normal.
#[derive(Debug, Copy, Clone)]
pub struct Plane3 {
    position: DVec3,
    normal: DVec3,
}

impl Plane3 {
    /// Creates a plane; the normal is normalised internally.
    #[must_use]
    pub fn new(position: DVec3, normal: DVec3) -> Self {
        Self {
            position,
            normal: normal.normalize_or_zero(),
        }
    }

    /// Creates the plane through three points, oriented by their winding.
    #[must_use]
    pub fn from_three_points(p1: DVec3, p2: DVec3, p3: DVec3) -> Self {
        let normal = (p3 - p2).cross(p1 - p2).normalize_or_zero();
        Self {
            position: p2,
            normal,
        }
    }

    /// A point on the plane.
    #[must_use]
    pub const fn position(&self) -> DVec3 {
        self.position
    }

    /// Unit plane normal.
    #[must_use]
    pub const fn normal(&self) -> DVec3 {
        self.normal
    }
}

impl RayIntersect for Plane3 {
    fn intersects_ray(&self, ray: &Ray3) -> Option<f64> {
        if ray.length_squared() == 0.0 {
            return None;
        }
        let v = ray.to_vector();
        let denom = v.dot(self.normal);
        if denom.abs() < PARALLEL_EPSILON {
            // Parallel (or coincident) rays never report a t > 0 crossing.
            return None;
        }
        let t = (self.position - ray.start()).dot(self.normal) / denom;
        (t > 0.0 && t <= 1.0).then_some(t)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn x_ray(from: f64, to: f64, y: f64, z: f64) -> Ray3 {
        Ray3::new(DVec3::new(from, y, z), DVec3::new(to, y, z))
    }

    #[test]
    fn box_hit_reports_entry_face() {
        let b = Box3::new(DVec3::new(2.0, 0.0, 0.0), DVec3::splat(0.5), DQuat::IDENTITY);
        let t = b.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0));
        assert!((t.unwrap() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn box_from_inside_reports_exit_face() {
        let b = Box3::new(DVec3::ZERO, DVec3::splat(1.0), DQuat::IDENTITY);
        let t = b.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0));
        assert!((t.unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn rotated_box_is_hit_through_its_diagonal() {
        use std::f64::consts::FRAC_PI_4;
        let b = Box3::new(
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(0.5, 0.5, 0.5),
            DQuat::from_rotation_z(FRAC_PI_4),
        );
        // Corner now points at the ray; first hit is at x = 2 - sqrt(0.5).
        let t = b.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0)).unwrap();
        let expected = (2.0 - 0.5f64.sqrt()) / 10.0;
        assert!((t - expected).abs() < 1e-9);
    }

    #[test]
    fn cylinder_side_hit_respects_height() {
        let c = Cylinder::new(DVec3::new(1.0, 0.0, 0.0), DVec3::Z, 0.25, 0.5);
        assert!(c.intersects_ray(&x_ray(0.0, 5.0, 0.0, 0.1)).is_some());
        // Above the cylinder top.
        assert!(c.intersects_ray(&x_ray(0.0, 5.0, 0.0, 0.9)).is_none());
    }

    #[test]
    fn cylinder_cap_hit_from_above() {
        let c = Cylinder::new(DVec3::ZERO, DVec3::Z, 0.25, 0.5);
        let ray = Ray3::new(DVec3::new(0.1, 0.0, 2.0), DVec3::new(0.1, 0.0, -2.0));
        let t = c.intersects_ray(&ray).unwrap();
        // Top cap is at z = 0.5, reached at t = 1.5 / 4.
        assert!((t - 0.375).abs() < 1e-12);
    }

    #[test]
    fn sphere_tangential_hit_counts() {
        let s = Sphere::new(DVec3::new(2.0, 1.0, 0.0), 1.0);
        let t = s.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0));
        assert!((t.unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn sphere_behind_start_is_not_hit() {
        let s = Sphere::new(DVec3::new(-2.0, 0.0, 0.0), 1.0);
        assert!(s.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn plane_parallel_ray_misses() {
        let p = Plane3::new(DVec3::ZERO, DVec3::Z);
        assert!(p.intersects_ray(&x_ray(0.0, 10.0, 0.0, 1.0)).is_none());
        assert!(p.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn plane_crossing_reports_normalised_t() {
        let p = Plane3::new(DVec3::new(0.0, 0.0, 1.0), DVec3::Z);
        let ray = Ray3::new(DVec3::ZERO, DVec3::new(0.0, 0.0, 4.0));
        assert!((p.intersects_ray(&ray).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_length_rays_miss_everything() {
        let ray = Ray3::new(DVec3::ZERO, DVec3::ZERO);
        assert!(Box3::new(DVec3::ZERO, DVec3::ONE, DQuat::IDENTITY)
            .intersects_ray(&ray)
            .is_none());
        assert!(Sphere::new(DVec3::ZERO, 1.0).intersects_ray(&ray).is_none());
        assert!(Cylinder::new(DVec3::ZERO, DVec3::Z, 1.0, 1.0)
            .intersects_ray(&ray)
            .is_none());
        assert!(Plane3::new(DVec3::ZERO, DVec3::Z).intersects_ray(&ray).is_none());
    }

    #[test]
    fn beyond_segment_end_is_a_miss() {
        let s = Sphere::new(DVec3::new(20.0, 0.0, 0.0), 1.0);
        assert!(s.intersects_ray(&x_ray(0.0, 10.0, 0.0, 0.0)).is_none());
    }
}
