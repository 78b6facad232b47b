// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The physics-engine contract.
//!
//! Engines are opaque: they own rigid-body models for the entities they
//! accepted, advance them by a fixed timestep during the physics phase, and
//! answer ray queries against them. Engines are mutually independent;
//! cross-engine influence happens only through entity transfer, which the
//! space coordinates on the main thread between the physics and media
//! phases.

pub mod pointmass;

use glam::{DQuat, DVec3};
use krill_geom::Ray3;
use slotmap::SlotMap;

use crate::entity::body::Body;
use crate::error::BoxedError;
use crate::ident::{BodyKey, SimClock};

/// Read-only view handed to an engine for one physics phase.
pub struct EngineContext<'a> {
    /// Every body in the world; the engine touches only the ones it owns.
    pub bodies: &'a SlotMap<BodyKey, Body>,
    /// Scheduler-chosen sub-step multiplier for this tick (≥ 1).
    pub substeps: u32,
    /// The simulation clock at the start of the tick.
    pub clock: SimClock,
}

/// One engine's representation of one embodied entity.
///
/// A model owns the native bodies and constraints; it mediates every data
/// flow between the entity and the engine: actuator commands flow in
/// through [`PhysicsModel::update_from_entity_status`], poses flow out
/// through [`PhysicsModel::update_entity_status`], which runs the per-anchor
/// updaters registered at construction, in registration order.
pub trait PhysicsModel: Send {
    /// The body this model simulates.
    fn body(&self) -> BodyKey;

    /// Teleports the model to a new pose.
    fn move_to(&mut self, position: DVec3, orientation: DQuat);

    /// Pulls actuator-written state from the entity into the model.
    fn update_from_entity_status(&mut self, body: &Body);

    /// Pushes the model state back into the entity: pose, velocity,
    /// collision flags, and every registered anchor.
    fn update_entity_status(&self, body: &Body);

    /// Whether the model currently overlaps another model of its engine.
    fn is_colliding(&self) -> bool;

    /// Intersects `ray` with this model's collision volume.
    fn check_intersection_with_ray(&self, ray: &Ray3) -> Option<f64>;
}

/// A physics engine.
pub trait PhysicsEngine: Send {
    /// Stable engine identifier.
    fn id(&self) -> &str;

    /// Re-syncs every model from its body's (already reset) state.
    fn reset(&mut self, bodies: &SlotMap<BodyKey, Body>);

    /// Offers a body to the engine. Returns `true` if the engine accepted
    /// it and created a model.
    fn add_entity(&mut self, key: BodyKey, body: &Body) -> bool;

    /// Removes the model for `key`. Returns `true` if one existed.
    fn remove_entity(&mut self, key: BodyKey) -> bool;

    /// Advances all owned models by one physics tick (times the
    /// scheduler's sub-step multiplier).
    fn update(&mut self, ctx: &EngineContext<'_>) -> Result<(), BoxedError>;

    /// Whether any model left the engine's volume this tick.
    fn is_entity_transfer_needed(&self) -> bool;

    /// Drains the bodies marked for transfer. The space removes each from
    /// this engine and re-homes it via [`PhysicsEngine::is_point_contained`].
    fn take_transfers(&mut self) -> Vec<BodyKey>;

    /// Spatial volume predicate: `true` if this engine simulates the region
    /// containing `point`.
    fn is_point_contained(&self, point: DVec3) -> bool;

    /// Intersects `ray` with every owned model; hits are `(body, t)` with
    /// `t ∈ (0, 1]`, ordered by increasing `t`.
    fn check_intersection_with_ray(&self, bodies: &SlotMap<BodyKey, Body>, ray: &Ray3)
        -> Vec<(BodyKey, f64)>;

    /// Evaluates whether `key` would overlap another model at a candidate
    /// pose, without committing anything.
    fn would_collide(
        &self,
        _bodies: &SlotMap<BodyKey, Body>,
        _key: BodyKey,
        _position: DVec3,
        _orientation: DQuat,
    ) -> bool {
        false
    }

    /// Teleports the model for `key` to a new pose, refusing poses that
    /// would overlap another model. With `check_only` the pose is only
    /// evaluated, never committed. Returns `true` if the pose is (or would
    /// be) collision-free.
    fn move_model(
        &mut self,
        _bodies: &SlotMap<BodyKey, Body>,
        _key: BodyKey,
        _position: DVec3,
        _orientation: DQuat,
        _check_only: bool,
    ) -> bool {
        false
    }

    /// Number of models currently owned.
    fn num_models(&self) -> usize;

    /// Configured sub-step iterations per simulation tick.
    fn iterations(&self) -> u32;

    /// Duration of one physics sub-step, seconds.
    fn physics_clock_tick(&self) -> f64;

    /// Duration of one simulation tick, seconds.
    fn simulation_clock_tick(&self) -> f64;
}
