// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Geometry primitives for Krill.
//!
//! This crate provides:
//! - Finite rays expressed as start/end segments (`Ray3`).
//! - Axis-aligned bounding boxes (`Aabb`).
//! - Ray-intersectable primitive shapes (`Box3`, `Cylinder`, `Sphere`,
//!   `Plane3`).
//!
//! Conventions:
//! - All coordinates are `f64` meters in world space.
//! - Ray intersections report `t` normalised to the ray length: a hit exists
//!   only for `t ∈ (0, 1]`. Tangential hits count; zero-length rays never
//!   hit anything.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

mod aabb;
mod ray;
mod shapes;

pub use aabb::Aabb;
pub use ray::Ray3;
pub use shapes::{Box3, Cylinder, Plane3, RayIntersect, Sphere};
