// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Range-and-bearing medium.
//!
//! Every registered device is a transceiver: it broadcasts a fixed-size
//! payload within its range and hears every unoccluded emitter whose range
//! covers it. Bearings are expressed in the receiver's frame.

use std::any::Any;

use glam::{DQuat, DVec3};
use krill_geom::Ray3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::BoxedError;
use crate::ident::{BodyKey, EntityKey, RabKey};
use crate::index::{PositionalIndex, SpaceHash};
use crate::lock;
use crate::medium::Medium;
use crate::space::PhaseEnv;

/// A range-and-bearing transceiver mounted on a body.
#[derive(Debug, Clone)]
pub struct RabDevice {
    /// The device's entity-tree node.
    pub entity: EntityKey,
    /// The body the device is mounted on.
    pub body: BodyKey,
    /// Mounting offset in the body frame.
    pub offset: DVec3,
    /// Mounting rotation in the body frame.
    pub rot_offset: DQuat,
    /// Transmission range, metres.
    pub range: f64,
    /// Fixed payload size, bytes.
    pub msg_size: usize,
    /// Payload broadcast this tick.
    pub data: Vec<u8>,
    /// Disabled devices neither transmit nor receive.
    pub enabled: bool,
    /// World pose, refreshed every media phase.
    pub position: DVec3,
    /// World orientation, refreshed every media phase.
    pub orientation: DQuat,
}

impl RabDevice {
    /// Recomputes the world pose from the reference body's origin anchor;
    /// called by the entity-tree update cascade after every physics phase.
    pub fn refresh_pose(&mut self, state: &crate::entity::body::BodyState) {
        self.position = state.position + state.orientation * self.offset;
        self.orientation = state.orientation * self.rot_offset;
    }

    /// Creates an enabled device with a zeroed payload.
    #[must_use]
    pub fn new(entity: EntityKey, body: BodyKey, offset: DVec3, range: f64, msg_size: usize) -> Self {
        Self {
            entity,
            body,
            offset,
            rot_offset: DQuat::IDENTITY,
            range,
            msg_size,
            data: vec![0; msg_size],
            enabled: true,
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
        }
    }

    /// Zeroes the payload.
    pub fn clear_data(&mut self) {
        self.data.fill(0);
    }
}

/// One received message.
#[derive(Debug, Clone, PartialEq)]
pub struct RabReading {
    /// Entity of the emitting device.
    pub source: EntityKey,
    /// Payload bytes as sent.
    pub data: Vec<u8>,
    /// Distance from receiver to emitter, metres.
    pub range: f64,
    /// Bearing in the receiver's horizontal plane, radians.
    pub horizontal_bearing: f64,
    /// Elevation of the emitter above the receiver's horizontal plane,
    /// radians.
    pub vertical_bearing: f64,
}

/// The range-and-bearing channel registry.
pub struct RabMedium {
    id: String,
    registered: Vec<RabKey>,
    index: SpaceHash<RabKey>,
    readings: FxHashMap<RabKey, Vec<RabReading>>,
    check_occlusions: bool,
}

impl RabMedium {
    /// Creates a medium indexing emitters on a hash with `cell_size` cells.
    #[must_use]
    pub fn new(id: impl Into<String>, cell_size: f64, check_occlusions: bool) -> Self {
        Self {
            id: id.into(),
            registered: Vec::new(),
            index: SpaceHash::new(cell_size),
            readings: FxHashMap::default(),
            check_occlusions,
        }
    }

    /// Registers a device with this channel; called at entity init.
    pub fn register(&mut self, key: RabKey) {
        if !self.registered.contains(&key) {
            self.registered.push(key);
        }
    }

    /// Unregisters a device; called at entity removal.
    pub fn unregister(&mut self, key: RabKey) {
        self.registered.retain(|k| *k != key);
        self.readings.remove(&key);
    }

    /// The readings computed for `key` during the last media phase.
    #[must_use]
    pub fn readings_for(&self, key: RabKey) -> &[RabReading] {
        self.readings.get(&key).map_or(&[], Vec::as_slice)
    }
}

impl Medium for RabMedium {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self) {
        self.readings.clear();
        self.index.clear();
    }

    fn update(&mut self, env: &PhaseEnv<'_>) -> Result<(), BoxedError> {
        self.readings.clear();
        self.index.clear();

        // Register each enabled emitter over the cells its range covers.
        // World poses were refreshed by the entity-tree update cascade
        // between the physics and media phases.
        for &key in &self.registered {
            let Some(cell) = env.rab.get(key) else {
                continue;
            };
            let device = lock::lock(cell);
            let entity_enabled = env
                .entities
                .get(device.entity)
                .map(|n| n.enabled)
                .unwrap_or(false);
            if device.enabled && entity_enabled {
                let (position, range) = (device.position, device.range);
                drop(device);
                self.index.update_emitter_sphere(key, position, range);
            }
        }

        // Per receiver: every in-range, unoccluded emitter becomes a
        // reading expressed in the receiver's frame.
        for &receiver_key in &self.registered {
            let Some(receiver_cell) = env.rab.get(receiver_key) else {
                continue;
            };
            let (r_pos, r_orient, r_body, r_enabled) = {
                let device = lock::lock(receiver_cell);
                (device.position, device.orientation, device.body, device.enabled)
            };
            if !r_enabled {
                continue;
            }

            let mut candidates: Vec<RabKey> = Vec::new();
            self.index
                .for_entities_in_box_range(r_pos, DVec3::ZERO, &mut |key| {
                    if key != receiver_key {
                        candidates.push(key);
                    }
                    true
                });
            candidates.sort_unstable();

            let mut received = Vec::new();
            for emitter_key in candidates {
                let Some(emitter_cell) = env.rab.get(emitter_key) else {
                    continue;
                };
                let (e_pos, e_range, e_data, e_entity, e_body) = {
                    let device = lock::lock(emitter_cell);
                    (
                        device.position,
                        device.range,
                        device.data.clone(),
                        device.entity,
                        device.body,
                    )
                };
                let delta = e_pos - r_pos;
                let distance = delta.length();
                if distance > e_range {
                    continue;
                }
                if self.check_occlusions && distance > 0.0 {
                    let mut exclude: FxHashSet<EntityKey> = FxHashSet::default();
                    for body_key in [r_body, e_body] {
                        if let Some(body) = env.bodies.get(body_key) {
                            exclude.insert(body.entity);
                        }
                    }
                    let ray = Ray3::new(r_pos, e_pos);
                    if env.closest_intersection(&ray, &exclude).is_some() {
                        continue;
                    }
                }
                let local = r_orient.inverse() * delta;
                received.push(RabReading {
                    source: e_entity,
                    data: e_data,
                    range: distance,
                    horizontal_bearing: local.y.atan2(local.x),
                    vertical_bearing: local.z.atan2(local.truncate().length()),
                });
            }
            if !received.is_empty() {
                self.readings.insert(receiver_key, received);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for RabMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabMedium")
            .field("id", &self.id)
            .field("registered", &self.registered.len())
            .finish_non_exhaustive()
    }
}
