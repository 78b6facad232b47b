// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Embodied entity state: pose, anchors, bounding box, collision flags.

use std::sync::RwLock;

use glam::{DQuat, DVec3};
use krill_geom::{Aabb, Box3, Cylinder, Ray3, RayIntersect, Sphere};

use crate::entity::anchor::AnchorSet;
use crate::ident::EntityKey;

/// The collision volume an engine simulates for a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    /// Upright cylinder; the body position is the centre of its base.
    Cylinder {
        /// Cylinder radius.
        radius: f64,
        /// Cylinder height.
        height: f64,
    },
    /// Oriented box centred on the body position.
    Box {
        /// Half-extents along the body axes.
        half_extents: DVec3,
    },
    /// Sphere centred on the body position.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
}

impl BodyShape {
    /// Axis-aligned box bounding the shape at the given pose.
    #[must_use]
    pub fn bounding_box(&self, position: DVec3, orientation: DQuat) -> Aabb {
        match *self {
            Self::Cylinder { radius, height } => {
                let axis = orientation * DVec3::Z;
                let centre = position + axis * (height * 0.5);
                Aabb::from_oriented_half_extents(
                    centre,
                    DVec3::new(radius, radius, height * 0.5),
                    orientation,
                )
            }
            Self::Box { half_extents } => {
                Aabb::from_oriented_half_extents(position, half_extents, orientation)
            }
            Self::Sphere { radius } => {
                Aabb::from_centre_half_extents(position, DVec3::splat(radius))
            }
        }
    }

    /// Intersects `ray` with the shape at the given pose.
    #[must_use]
    pub fn intersects_ray(&self, position: DVec3, orientation: DQuat, ray: &Ray3) -> Option<f64> {
        match *self {
            Self::Cylinder { radius, height } => {
                Cylinder::new(position, orientation * DVec3::Z, radius, height).intersects_ray(ray)
            }
            Self::Box { half_extents } => {
                Box3::new(position, half_extents, orientation).intersects_ray(ray)
            }
            Self::Sphere { radius } => Sphere::new(position, radius).intersects_ray(ray),
        }
    }
}

/// Command pushed by actuators during `act`, consumed by the owning physics
/// model during `physics`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveCommand {
    /// No actuation this tick.
    Idle,
    /// Differential-drive wheel velocities, metres per second.
    Wheels {
        /// Left wheel ground speed.
        left: f64,
        /// Right wheel ground speed.
        right: f64,
    },
    /// Direct velocity command (e.g. flying robots).
    Velocity {
        /// Linear velocity in world coordinates.
        linear: DVec3,
        /// Angular velocity about the world z axis, radians per second.
        angular_z: f64,
    },
}

/// Per-tick mutable state of a body.
///
/// Lives behind the body's `RwLock`; written by exactly one physics model
/// during the physics phase (plus actuators writing `command` during act),
/// read everywhere else.
#[derive(Debug)]
pub struct BodyState {
    /// World-space position.
    pub position: DVec3,
    /// World-space orientation.
    pub orientation: DQuat,
    /// Anchor frames; `origin` mirrors the body pose.
    pub anchors: AnchorSet,
    /// Linear velocity at the end of the last physics phase; drives the
    /// scheduler's sub-step choice.
    pub linear_velocity: DVec3,
    /// Pending actuator command.
    pub command: DriveCommand,
    /// `true` while the owning engine reports an overlap.
    pub collision_detected: bool,
    /// Cumulative number of collision flags since the last reset.
    pub collision_count: u32,
    /// The other body of the most recent collision, if any.
    pub colliding_with: Option<EntityKey>,
    bounding_box: Aabb,
    bbox_dirty: bool,
}

impl BodyState {
    fn new(shape: &BodyShape, position: DVec3, orientation: DQuat) -> Self {
        Self {
            position,
            orientation,
            anchors: AnchorSet::new(position, orientation),
            linear_velocity: DVec3::ZERO,
            command: DriveCommand::Idle,
            collision_detected: false,
            collision_count: 0,
            colliding_with: None,
            bounding_box: shape.bounding_box(position, orientation),
            bbox_dirty: false,
        }
    }

    /// Sets the pose, syncing the origin anchor and deferring the bounding
    /// box recalculation to the next read.
    pub fn set_pose(&mut self, position: DVec3, orientation: DQuat) {
        self.position = position;
        self.orientation = orientation;
        let origin = self.anchors.origin_mut();
        origin.position = position;
        origin.orientation = orientation;
        self.bbox_dirty = true;
    }

    /// The bounding box, recalculated lazily after a pose mutation.
    pub fn bounding_box(&mut self, shape: &BodyShape) -> Aabb {
        if self.bbox_dirty {
            self.bounding_box = shape.bounding_box(self.position, self.orientation);
            self.bbox_dirty = false;
        }
        self.bounding_box
    }

    /// Flags a collision with another entity.
    pub fn flag_collision(&mut self, with: Option<EntityKey>) {
        self.collision_detected = true;
        self.colliding_with = with;
        self.collision_count += 1;
    }

    /// Clears the per-step collision flag (the cumulative count stays).
    pub fn clear_collision(&mut self) {
        self.collision_detected = false;
        self.colliding_with = None;
    }
}

/// An embodied entity's body record.
#[derive(Debug)]
pub struct Body {
    /// The entity-tree node this body belongs to.
    pub entity: EntityKey,
    /// Collision volume.
    pub shape: BodyShape,
    /// Immovable bodies ignore commands and are never integrated.
    pub movable: bool,
    /// Differential-drive axle length, metres.
    pub wheel_base: f64,
    /// Pose at scene init, restored by reset.
    pub init_position: DVec3,
    /// Orientation at scene init.
    pub init_orientation: DQuat,
    /// Ids of the engines currently holding a model for this body; at most
    /// one model per engine. Populated at engine-add, drained at remove.
    pub(crate) bound_engines: Vec<String>,
    /// Hot per-tick state.
    pub state: RwLock<BodyState>,
}

impl Body {
    /// Creates a body at its initial pose.
    #[must_use]
    pub fn new(
        entity: EntityKey,
        shape: BodyShape,
        position: DVec3,
        orientation: DQuat,
        movable: bool,
    ) -> Self {
        Self {
            entity,
            shape,
            movable,
            wheel_base: 0.14,
            init_position: position,
            init_orientation: orientation,
            bound_engines: Vec::new(),
            state: RwLock::new(BodyState::new(&shape, position, orientation)),
        }
    }

    /// Ids of the engines bound to this body.
    #[must_use]
    pub fn bound_engines(&self) -> &[String] {
        &self.bound_engines
    }

    pub(crate) fn bind_engine(&mut self, id: &str) {
        if !self.bound_engines.iter().any(|e| e == id) {
            self.bound_engines.push(id.to_owned());
        }
    }

    pub(crate) fn unbind_engine(&mut self, id: &str) {
        self.bound_engines.retain(|e| e != id);
    }

    /// Restores the initial pose and clears velocities and collision state.
    pub(crate) fn reset_state(&self) {
        let mut state = crate::lock::write(&self.state);
        state.set_pose(self.init_position, self.init_orientation);
        state.linear_velocity = DVec3::ZERO;
        state.command = DriveCommand::Idle;
        state.clear_collision();
        state.collision_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_mutation_defers_bounding_box_recalculation() {
        let mut state = BodyState::new(
            &BodyShape::Sphere { radius: 1.0 },
            DVec3::ZERO,
            DQuat::IDENTITY,
        );
        state.set_pose(DVec3::new(5.0, 0.0, 0.0), DQuat::IDENTITY);
        // The next read reflects the new pose.
        let bb = state.bounding_box(&BodyShape::Sphere { radius: 1.0 });
        assert_eq!(bb.centre(), DVec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn origin_anchor_tracks_the_pose() {
        let mut state = BodyState::new(
            &BodyShape::Sphere { radius: 0.1 },
            DVec3::ZERO,
            DQuat::IDENTITY,
        );
        let pose = DVec3::new(1.0, 2.0, 0.0);
        state.set_pose(pose, DQuat::from_rotation_z(1.0));
        assert_eq!(state.anchors.origin().position, pose);
    }

    #[test]
    fn cylinder_bounding_box_spans_base_to_top() {
        let shape = BodyShape::Cylinder {
            radius: 0.2,
            height: 1.0,
        };
        let bb = shape.bounding_box(DVec3::ZERO, DQuat::IDENTITY);
        assert!((bb.min().z - 0.0).abs() < 1e-12);
        assert!((bb.max().z - 1.0).abs() < 1e-12);
        assert!((bb.max().x - 0.2).abs() < 1e-12);
    }

    #[test]
    fn collision_flags_accumulate_but_clear_per_step() {
        let mut state = BodyState::new(
            &BodyShape::Sphere { radius: 0.1 },
            DVec3::ZERO,
            DQuat::IDENTITY,
        );
        state.flag_collision(None);
        state.clear_collision();
        state.flag_collision(None);
        assert!(state.collision_detected);
        assert_eq!(state.collision_count, 2);
    }
}
