// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! LED medium: a positional registry of coloured point lights.
//!
//! Camera-style sensors query the index for lights near a point and read
//! colour and position off the devices. The medium itself computes no
//! pairings; visibility is the observer's problem.

use std::any::Any;

use glam::DVec3;

use crate::error::BoxedError;
use crate::ident::{BodyKey, EntityKey, LedKey};
use crate::index::{PositionalIndex, SpaceHash};
use crate::lock;
use crate::medium::Medium;
use crate::space::PhaseEnv;

/// A coloured LED mounted on a body.
#[derive(Debug, Clone)]
pub struct LedDevice {
    /// The device's entity-tree node.
    pub entity: EntityKey,
    /// The body the LED is mounted on.
    pub body: BodyKey,
    /// Mounting offset in the body frame.
    pub offset: DVec3,
    /// Emitted colour.
    pub colour: [u8; 3],
    /// Disabled LEDs are dark and unindexed.
    pub enabled: bool,
    /// World position, refreshed every media phase.
    pub position: DVec3,
}

impl LedDevice {
    /// Recomputes the world position from the reference body's origin
    /// anchor; called by the entity-tree update cascade.
    pub fn refresh_pose(&mut self, state: &crate::entity::body::BodyState) {
        self.position = state.position + state.orientation * self.offset;
    }

    /// Creates an enabled LED.
    #[must_use]
    pub fn new(entity: EntityKey, body: BodyKey, offset: DVec3, colour: [u8; 3]) -> Self {
        Self {
            entity,
            body,
            offset,
            colour,
            enabled: true,
            position: DVec3::ZERO,
        }
    }
}

/// The LED channel registry.
pub struct LedMedium {
    id: String,
    registered: Vec<LedKey>,
    index: SpaceHash<LedKey>,
}

impl LedMedium {
    /// Creates a medium with the given index cell size.
    #[must_use]
    pub fn new(id: impl Into<String>, cell_size: f64) -> Self {
        Self {
            id: id.into(),
            registered: Vec::new(),
            index: SpaceHash::new(cell_size),
        }
    }

    /// Registers an LED with this channel.
    pub fn register(&mut self, key: LedKey) {
        if !self.registered.contains(&key) {
            self.registered.push(key);
        }
    }

    /// Unregisters an LED.
    pub fn unregister(&mut self, key: LedKey) {
        self.registered.retain(|k| *k != key);
    }

    /// Visits the LEDs indexed within `radius` of `centre`.
    pub fn for_leds_in_range(&self, centre: DVec3, radius: f64, op: &mut dyn FnMut(LedKey) -> bool) {
        self.index.for_entities_in_sphere_range(centre, radius, op);
    }
}

impl Medium for LedMedium {
    fn id(&self) -> &str {
        &self.id
    }

    fn reset(&mut self) {
        self.index.clear();
    }

    fn update(&mut self, env: &PhaseEnv<'_>) -> Result<(), BoxedError> {
        self.index.clear();
        for &key in &self.registered {
            let Some(cell) = env.leds.get(key) else {
                continue;
            };
            let led = lock::lock(cell);
            if led.enabled {
                let i = self.index.space_to_hash(led.position.x);
                let j = self.index.space_to_hash(led.position.y);
                let k = self.index.space_to_hash(led.position.z);
                self.index.update_cell(i, j, k, key);
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

impl std::fmt::Debug for LedMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedMedium")
            .field("id", &self.id)
            .field("registered", &self.registered.len())
            .finish_non_exhaustive()
    }
}
