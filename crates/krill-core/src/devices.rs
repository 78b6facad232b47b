// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference devices: differential drive, range-and-bearing, proximity.

use std::any::Any;

use glam::DVec3;
use krill_geom::Ray3;
use rustc_hash::FxHashSet;

use crate::control::{ActContext, Actuator, ControlResult, SenseContext, Sensor};
use crate::entity::body::DriveCommand;
use crate::entity::controllable::CheckedRay;
use crate::ident::{EntityKey, RabKey};
use crate::lock;
use crate::medium::rab::{RabMedium, RabReading};

/// Differential-drive actuator: the controller stores wheel speeds, the act
/// phase commits them as the body's drive command.
#[derive(Debug, Default)]
pub struct DifferentialDriveActuator {
    left: f64,
    right: f64,
}

impl DifferentialDriveActuator {
    /// Creates an actuator with both wheels stopped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wheel ground speeds, metres per second.
    pub fn set_speeds(&mut self, left: f64, right: f64) {
        self.left = left;
        self.right = right;
    }
}

impl Actuator for DifferentialDriveActuator {
    fn update(&mut self, ctx: &mut ActContext<'_>) -> ControlResult {
        if let Some(body) = ctx.env.bodies.get(ctx.body) {
            lock::write(&body.state).command = DriveCommand::Wheels {
                left: self.left,
                right: self.right,
            };
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.left = 0.0;
        self.right = 0.0;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Range-and-bearing broadcast actuator.
#[derive(Debug)]
pub struct RabActuator {
    device: RabKey,
    msg_size: usize,
    pending: Vec<u8>,
}

impl RabActuator {
    /// Creates an actuator bound to a device with the given payload size.
    #[must_use]
    pub fn new(device: RabKey, msg_size: usize) -> Self {
        Self {
            device,
            msg_size,
            pending: vec![0; msg_size],
        }
    }

    /// Stages a payload for the next act phase.
    ///
    /// The payload must be exactly the device's message size.
    pub fn set_data(&mut self, data: &[u8]) -> ControlResult {
        if data.len() != self.msg_size {
            return Err(format!(
                "payload size mismatch: expected {}, got {}",
                self.msg_size,
                data.len()
            )
            .into());
        }
        self.pending.copy_from_slice(data);
        Ok(())
    }
}

impl Actuator for RabActuator {
    fn update(&mut self, ctx: &mut ActContext<'_>) -> ControlResult {
        if let Some(cell) = ctx.env.rab.get(self.device) {
            let mut device = lock::lock(cell);
            device.data.copy_from_slice(&self.pending);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.fill(0);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Range-and-bearing receiver.
#[derive(Debug)]
pub struct RabSensor {
    medium_id: String,
    device: RabKey,
    readings: Vec<RabReading>,
}

impl RabSensor {
    /// Creates a sensor listening on the named medium for `device`.
    #[must_use]
    pub fn new(medium_id: impl Into<String>, device: RabKey) -> Self {
        Self {
            medium_id: medium_id.into(),
            device,
            readings: Vec::new(),
        }
    }

    /// The messages heard during the last media phase.
    #[must_use]
    pub fn readings(&self) -> &[RabReading] {
        &self.readings
    }
}

impl Sensor for RabSensor {
    fn update(&mut self, ctx: &mut SenseContext<'_>) -> ControlResult {
        self.readings.clear();
        for cell in ctx.env.media {
            let medium = lock::lock(cell);
            if medium.id() != self.medium_id {
                continue;
            }
            if let Some(rab) = medium.as_any().downcast_ref::<RabMedium>() {
                self.readings.extend_from_slice(rab.readings_for(self.device));
            }
            return Ok(());
        }
        Err(format!("no medium `{}` in this space", self.medium_id).into())
    }

    fn reset(&mut self) {
        self.readings.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Ray-fan proximity sensor.
///
/// Casts `rays` evenly spaced horizontal rays from the body origin and
/// reports, per ray, the distance to the closest embodied entity, or the
/// full range on a miss. Every cast is logged as a checked ray.
#[derive(Debug)]
pub struct ProximitySensor {
    rays: usize,
    range: f64,
    readings: Vec<f64>,
}

impl ProximitySensor {
    /// Creates a sensor with `rays` beams of the given range.
    #[must_use]
    pub fn new(rays: usize, range: f64) -> Self {
        Self {
            rays,
            range,
            readings: Vec::new(),
        }
    }

    /// Per-ray distances from the last sense phase.
    #[must_use]
    pub fn readings(&self) -> &[f64] {
        &self.readings
    }
}

impl Sensor for ProximitySensor {
    fn update(&mut self, ctx: &mut SenseContext<'_>) -> ControlResult {
        self.readings.clear();
        let Some(body) = ctx.env.bodies.get(ctx.body) else {
            return Ok(());
        };
        let (position, orientation) = {
            let state = lock::read(&body.state);
            let origin = state.anchors.origin();
            (origin.position, origin.orientation)
        };
        let mut exclude: FxHashSet<EntityKey> = FxHashSet::default();
        exclude.insert(body.entity);
        for i in 0..self.rays {
            let angle = std::f64::consts::TAU * (i as f64) / (self.rays as f64);
            let direction = orientation * DVec3::new(angle.cos(), angle.sin(), 0.0);
            let ray = Ray3::new(position, position + direction * self.range);
            let hit = ctx.env.closest_intersection(&ray, &exclude);
            self.readings.push(match hit {
                Some((_, t)) => t * self.range,
                None => self.range,
            });
            ctx.checked_rays.push(CheckedRay {
                intersected: hit.is_some(),
                ray,
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.readings.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
