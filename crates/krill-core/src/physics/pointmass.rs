// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference point-mass engine: kinematic integration of differential-drive
//! ground robots.
//!
//! Each model is a single point mass with a collision volume. Integration is
//! explicit Euler over the engine's sub-steps; collisions are flagged, not
//! resolved (robots interpenetrate and the controller is expected to react).
//! This is deliberately the simplest engine that exercises the full
//! contract: commands in, poses and anchors out, transfer marks, ray
//! queries, volume predicate.

use glam::{DQuat, DVec3};
use krill_geom::{Aabb, Ray3};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use tracing::debug;

use crate::entity::body::{Body, BodyShape, DriveCommand};
use crate::error::BoxedError;
use crate::ident::{BodyKey, EntityKey};
use crate::lock;

use super::{EngineContext, PhysicsEngine, PhysicsModel};

/// Per-anchor updater: writes one anchor from the model state.
type AnchorUpdater = fn(&PointMassModel, &mut crate::entity::anchor::Anchor);

/// A point-mass model of one body.
pub struct PointMassModel {
    body: BodyKey,
    entity: EntityKey,
    shape: BodyShape,
    wheel_base: f64,
    movable: bool,
    position: DVec3,
    yaw: f64,
    linear_velocity: DVec3,
    command: DriveCommand,
    colliding: bool,
    colliding_with: Option<EntityKey>,
    anchor_updaters: Vec<(usize, AnchorUpdater)>,
}

impl PointMassModel {
    fn new(key: BodyKey, body: &Body) -> Self {
        let state = lock::read(&body.state);
        let (yaw, ..) = state.orientation.to_euler(glam::EulerRot::ZYX);
        let mut model = Self {
            body: key,
            entity: body.entity,
            shape: body.shape,
            wheel_base: body.wheel_base,
            movable: body.movable,
            position: state.position,
            yaw,
            linear_velocity: state.linear_velocity,
            command: state.command,
            colliding: false,
            colliding_with: None,
            anchor_updaters: Vec::new(),
        };
        // The origin anchor is owned by this model.
        model.register_anchor_updater(0, |m, anchor| {
            anchor.position = m.position;
            anchor.orientation = m.orientation();
        });
        model
    }

    /// Registers an updater for the anchor at `index`; updaters run in
    /// registration order during `update_entity_status`.
    pub fn register_anchor_updater(&mut self, index: usize, updater: AnchorUpdater) {
        self.anchor_updaters.push((index, updater));
    }

    fn orientation(&self) -> DQuat {
        DQuat::from_rotation_z(self.yaw)
    }

    fn integrate(&mut self, dt: f64) {
        if !self.movable {
            return;
        }
        match self.command {
            DriveCommand::Idle => {
                self.linear_velocity = DVec3::ZERO;
            }
            DriveCommand::Wheels { left, right } => {
                let forward = (left + right) * 0.5;
                let omega = (right - left) / self.wheel_base;
                self.yaw += omega * dt;
                let heading = DVec3::new(self.yaw.cos(), self.yaw.sin(), 0.0);
                self.linear_velocity = heading * forward;
                self.position += self.linear_velocity * dt;
            }
            DriveCommand::Velocity { linear, angular_z } => {
                self.yaw += angular_z * dt;
                self.linear_velocity = linear;
                self.position += linear * dt;
            }
        }
    }

    fn bounding_box(&self) -> Aabb {
        self.shape.bounding_box(self.position, self.orientation())
    }

    fn overlaps(&self, other: &Self) -> bool {
        if !self.bounding_box().intersects(&other.bounding_box()) {
            return false;
        }
        // Cylinder pairs get an exact horizontal disc test on top of the
        // box filter; everything else keeps the box verdict.
        if let (
            BodyShape::Cylinder { radius: r1, .. },
            BodyShape::Cylinder { radius: r2, .. },
        ) = (self.shape, other.shape)
        {
            let d = self.position - other.position;
            return d.truncate().length() < r1 + r2;
        }
        true
    }
}

impl PhysicsModel for PointMassModel {
    fn body(&self) -> BodyKey {
        self.body
    }

    fn move_to(&mut self, position: DVec3, orientation: DQuat) {
        self.position = position;
        let (yaw, ..) = orientation.to_euler(glam::EulerRot::ZYX);
        self.yaw = yaw;
    }

    fn update_from_entity_status(&mut self, body: &Body) {
        let state = lock::read(&body.state);
        self.command = state.command;
    }

    fn update_entity_status(&self, body: &Body) {
        let mut state = lock::write(&body.state);
        state.set_pose(self.position, self.orientation());
        state.linear_velocity = self.linear_velocity;
        if self.colliding {
            state.flag_collision(self.colliding_with);
        } else {
            state.clear_collision();
        }
        for (index, updater) in &self.anchor_updaters {
            if let Some(anchor) = state.anchors.get_mut(*index) {
                if anchor.enabled {
                    updater(self, anchor);
                }
            }
        }
    }

    fn is_colliding(&self) -> bool {
        self.colliding
    }

    fn check_intersection_with_ray(&self, ray: &Ray3) -> Option<f64> {
        self.shape
            .intersects_ray(self.position, self.orientation(), ray)
    }
}

/// The reference engine.
pub struct PointMassEngine {
    id: String,
    models: Vec<PointMassModel>,
    index_of: FxHashMap<BodyKey, usize>,
    volume: Option<Aabb>,
    iterations: u32,
    sim_tick: f64,
    transfer_marks: Vec<BodyKey>,
}

impl PointMassEngine {
    /// Creates an engine.
    ///
    /// `volume` bounds the region this engine simulates; `None` means the
    /// whole space. `iterations` is the engine's own sub-step count per
    /// simulation tick of `sim_tick` seconds.
    #[must_use]
    pub fn new(id: impl Into<String>, sim_tick: f64, iterations: u32, volume: Option<Aabb>) -> Self {
        Self {
            id: id.into(),
            models: Vec::new(),
            index_of: FxHashMap::default(),
            volume,
            iterations: iterations.max(1),
            sim_tick,
            transfer_marks: Vec::new(),
        }
    }

    /// Mutable access to the model for `key`, for anchor-updater
    /// registration at construction time.
    pub fn model_mut(&mut self, key: BodyKey) -> Option<&mut PointMassModel> {
        self.index_of.get(&key).map(|&i| &mut self.models[i])
    }

    fn rebuild_index(&mut self) {
        self.index_of = self
            .models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.body, i))
            .collect();
    }
}

impl PhysicsEngine for PointMassEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self, bodies: &SlotMap<BodyKey, Body>) {
        self.transfer_marks.clear();
        for model in &mut self.models {
            if let Some(body) = bodies.get(model.body) {
                let state = lock::read(&body.state);
                model.position = state.position;
                let (yaw, ..) = state.orientation.to_euler(glam::EulerRot::ZYX);
                model.yaw = yaw;
                model.linear_velocity = DVec3::ZERO;
                model.command = DriveCommand::Idle;
                model.colliding = false;
                model.colliding_with = None;
            }
        }
    }

    fn add_entity(&mut self, key: BodyKey, body: &Body) -> bool {
        if self.index_of.contains_key(&key) {
            return false;
        }
        let position = lock::read(&body.state).position;
        if !self.is_point_contained(position) {
            return false;
        }
        self.models.push(PointMassModel::new(key, body));
        self.index_of.insert(key, self.models.len() - 1);
        true
    }

    fn remove_entity(&mut self, key: BodyKey) -> bool {
        let Some(index) = self.index_of.remove(&key) else {
            return false;
        };
        self.models.remove(index);
        self.transfer_marks.retain(|k| *k != key);
        self.rebuild_index();
        true
    }

    fn update(&mut self, ctx: &EngineContext<'_>) -> Result<(), BoxedError> {
        let steps = self.iterations * ctx.substeps.max(1);
        let dt = self.sim_tick / f64::from(steps);

        // Actuator commands flow in.
        for model in &mut self.models {
            if let Some(body) = ctx.bodies.get(model.body) {
                model.update_from_entity_status(body);
            }
            model.colliding = false;
            model.colliding_with = None;
        }

        for _ in 0..steps {
            for model in &mut self.models {
                model.integrate(dt);
            }
        }

        // Collision flags are per engine and per tick.
        for i in 0..self.models.len() {
            for j in (i + 1)..self.models.len() {
                let (a, b) = self.models.split_at_mut(j);
                let (ma, mb) = (&mut a[i], &mut b[0]);
                if ma.overlaps(mb) {
                    ma.colliding = true;
                    ma.colliding_with = Some(mb.entity);
                    mb.colliding = true;
                    mb.colliding_with = Some(ma.entity);
                }
            }
        }

        // Poses and anchors flow out; leavers get marked for transfer.
        for model in &self.models {
            if let Some(body) = ctx.bodies.get(model.body) {
                model.update_entity_status(body);
            }
            if !self.is_point_contained(model.position)
                && !self.transfer_marks.contains(&model.body)
            {
                debug!(engine = %self.id, "model left engine volume, marking for transfer");
                self.transfer_marks.push(model.body);
            }
        }
        Ok(())
    }

    fn is_entity_transfer_needed(&self) -> bool {
        !self.transfer_marks.is_empty()
    }

    fn take_transfers(&mut self) -> Vec<BodyKey> {
        std::mem::take(&mut self.transfer_marks)
    }

    fn is_point_contained(&self, point: DVec3) -> bool {
        self.volume.map_or(true, |v| v.contains_point(point))
    }

    fn check_intersection_with_ray(
        &self,
        _bodies: &SlotMap<BodyKey, Body>,
        ray: &Ray3,
    ) -> Vec<(BodyKey, f64)> {
        let mut hits: Vec<(BodyKey, f64)> = self
            .models
            .iter()
            .filter_map(|m| m.check_intersection_with_ray(ray).map(|t| (m.body, t)))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    fn would_collide(
        &self,
        _bodies: &SlotMap<BodyKey, Body>,
        key: BodyKey,
        position: DVec3,
        orientation: DQuat,
    ) -> bool {
        let Some(&index) = self.index_of.get(&key) else {
            return false;
        };
        let candidate = self.models[index].shape.bounding_box(position, orientation);
        self.models
            .iter()
            .enumerate()
            .any(|(i, m)| i != index && candidate.intersects(&m.bounding_box()))
    }

    fn move_model(
        &mut self,
        bodies: &SlotMap<BodyKey, Body>,
        key: BodyKey,
        position: DVec3,
        orientation: DQuat,
        check_only: bool,
    ) -> bool {
        if self.would_collide(bodies, key, position, orientation) {
            return false;
        }
        let Some(&index) = self.index_of.get(&key) else {
            return false;
        };
        if !check_only {
            let model = &mut self.models[index];
            model.move_to(position, orientation);
            if let Some(body) = bodies.get(key) {
                model.update_entity_status(body);
            }
        }
        true
    }

    fn num_models(&self) -> usize {
        self.models.len()
    }

    fn iterations(&self) -> u32 {
        self.iterations
    }

    fn physics_clock_tick(&self) -> f64 {
        self.sim_tick / f64::from(self.iterations)
    }

    fn simulation_clock_tick(&self) -> f64 {
        self.sim_tick
    }
}

impl std::fmt::Debug for PointMassEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointMassEngine")
            .field("id", &self.id)
            .field("models", &self.models.len())
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}
