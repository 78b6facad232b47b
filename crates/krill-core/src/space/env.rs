// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The read view a phase task gets of the tick state.

use std::sync::Mutex;

use glam::DVec3;
use krill_geom::Ray3;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::entity::body::Body;
use crate::entity::controllable::ControllableEntity;
use crate::entity::EntityArena;
use crate::ident::{BodyKey, EntityKey, LedKey, RabKey, SimClock};
use crate::index::SpaceHash;
use crate::lock;
use crate::medium::rab::RabDevice;
use crate::medium::{LedDevice, Medium};
use crate::physics::PhysicsEngine;

/// Entities excluded from a ray query (typically the caster itself).
pub type ExcludeSet = FxHashSet<EntityKey>;

/// Borrowed view of the shared tick state, constructed once per phase and
/// handed to every task.
///
/// All collections are read-locked for the duration of the phase; per-item
/// mutability goes through the embedded mutexes and body locks, which the
/// strategies keep contention-free by assigning each task to exactly one
/// worker.
pub struct PhaseEnv<'a> {
    /// The entity tree.
    pub entities: &'a EntityArena,
    /// Every body record.
    pub bodies: &'a SlotMap<BodyKey, Body>,
    /// Range-and-bearing devices.
    pub rab: &'a SlotMap<RabKey, Mutex<RabDevice>>,
    /// LED devices.
    pub leds: &'a SlotMap<LedKey, Mutex<LedDevice>>,
    /// The controllable entities, in stable order.
    pub controllables: &'a [Mutex<ControllableEntity>],
    /// The physics engines, in stable order.
    pub engines: &'a [Mutex<Box<dyn PhysicsEngine>>],
    /// The media, in stable order.
    pub media: &'a [Mutex<Box<dyn Medium>>],
    /// Positional index over embodied entities; frozen for the phase.
    pub embodied_index: &'a SpaceHash<BodyKey>,
    /// The simulation clock at the start of the tick.
    pub clock: SimClock,
    /// Scheduler-chosen physics sub-step multiplier for this tick.
    pub substeps: u32,
}

impl PhaseEnv<'_> {
    /// Routes `ray` through every engine and returns the closest embodied
    /// hit, as `(entity, t)` with `t ∈ (0, 1]`.
    ///
    /// Entities in `exclude` are filtered out. Stale hits (an engine
    /// reporting a body that vanished) are skipped rather than surfaced:
    /// a ray query against a destroyed actor is a recoverable condition.
    #[must_use]
    pub fn closest_intersection(
        &self,
        ray: &Ray3,
        exclude: &ExcludeSet,
    ) -> Option<(EntityKey, f64)> {
        let mut best: Option<(EntityKey, f64)> = None;
        for cell in self.engines {
            let engine = lock::lock(cell);
            for (body_key, t) in engine.check_intersection_with_ray(self.bodies, ray) {
                let Some(body) = self.bodies.get(body_key) else {
                    continue;
                };
                if exclude.contains(&body.entity) {
                    continue;
                }
                if best.map_or(true, |(_, best_t)| t < best_t) {
                    best = Some((body.entity, t));
                }
            }
        }
        best
    }

    /// All embodied hits along `ray` across every engine, ordered by
    /// increasing `t`.
    #[must_use]
    pub fn all_intersections(&self, ray: &Ray3, exclude: &ExcludeSet) -> Vec<(EntityKey, f64)> {
        let mut hits: Vec<(EntityKey, f64)> = Vec::new();
        for cell in self.engines {
            let engine = lock::lock(cell);
            for (body_key, t) in engine.check_intersection_with_ray(self.bodies, ray) {
                let Some(body) = self.bodies.get(body_key) else {
                    continue;
                };
                if !exclude.contains(&body.entity) {
                    hits.push((body.entity, t));
                }
            }
        }
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    /// Position of a body's origin anchor, if the key is live.
    #[must_use]
    pub fn body_position(&self, key: BodyKey) -> Option<DVec3> {
        self.bodies
            .get(key)
            .map(|b| lock::read(&b.state).position)
    }
}
