// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The controllable-entity boundary.

use krill_geom::Ray3;

use crate::control::{ActContext, ControlIo, Controller, SenseContext, Sensor, Actuator};
use crate::error::SimError;
use crate::ident::{BodyKey, EntityKey};
use crate::phase::Phase;
use crate::space::PhaseEnv;

/// A ray cast by a sensor this tick, kept for visualisation.
#[derive(Debug, Clone, Copy)]
pub struct CheckedRay {
    /// Whether the ray hit an embodied entity.
    pub intersected: bool,
    /// The ray in world coordinates.
    pub ray: Ray3,
}

/// Wraps a user controller together with its sensors and actuators and
/// exposes the four per-tick hooks.
///
/// Hooks are called exactly in the phase order of the tick pipeline, on
/// enabled entities only.
pub struct ControllableEntity {
    entity: EntityKey,
    body: BodyKey,
    id: String,
    controller: Box<dyn Controller>,
    sensors: Vec<(String, Box<dyn Sensor>)>,
    actuators: Vec<(String, Box<dyn Actuator>)>,
    enabled: bool,
    checked_rays: Vec<CheckedRay>,
}

impl std::fmt::Debug for ControllableEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllableEntity")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("sensors", &self.sensors.len())
            .field("actuators", &self.actuators.len())
            .finish_non_exhaustive()
    }
}

impl ControllableEntity {
    /// Creates an enabled controllable entity.
    #[must_use]
    pub fn new(
        entity: EntityKey,
        body: BodyKey,
        id: impl Into<String>,
        controller: Box<dyn Controller>,
    ) -> Self {
        Self {
            entity,
            body,
            id: id.into(),
            controller,
            sensors: Vec::new(),
            actuators: Vec::new(),
            enabled: true,
            checked_rays: Vec::new(),
        }
    }

    /// Registers a named sensor.
    pub fn add_sensor(&mut self, name: impl Into<String>, sensor: Box<dyn Sensor>) {
        self.sensors.push((name.into(), sensor));
    }

    /// Registers a named actuator.
    pub fn add_actuator(&mut self, name: impl Into<String>, actuator: Box<dyn Actuator>) {
        self.actuators.push((name.into(), actuator));
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Entity-tree node of this robot.
    #[must_use]
    pub fn entity(&self) -> EntityKey {
        self.entity
    }

    /// Body of this robot.
    #[must_use]
    pub fn body(&self) -> BodyKey {
        self.body
    }

    /// Whether the entity takes part in the tick pipeline.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the entity. Re-enabling clears the sensor
    /// readings: the robot resumes at its pre-disable pose but senses the
    /// world afresh.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            for (_, sensor) in &mut self.sensors {
                sensor.reset();
            }
            self.checked_rays.clear();
        }
        self.enabled = enabled;
    }

    /// The rays cast by this robot's sensors during the current tick.
    #[must_use]
    pub fn checked_rays(&self) -> &[CheckedRay] {
        &self.checked_rays
    }

    /// Sense hook: updates every sensor.
    pub fn sense(&mut self, env: &PhaseEnv<'_>) -> Result<(), SimError> {
        self.checked_rays.clear();
        let mut ctx = SenseContext {
            env,
            body: self.body,
            checked_rays: &mut self.checked_rays,
        };
        for (name, sensor) in &mut self.sensors {
            sensor.update(&mut ctx).map_err(|source| SimError::ControllerFailure {
                id: format!("{}/{name}", self.id),
                phase: Phase::SenseControl,
                source,
            })?;
        }
        Ok(())
    }

    /// Control hook: runs one controller step over the fresh readings.
    pub fn control_step(&mut self) -> Result<(), SimError> {
        let mut io = ControlIo {
            sensors: &self.sensors,
            actuators: &mut self.actuators,
        };
        self.controller
            .control_step(&mut io)
            .map_err(|source| SimError::ControllerFailure {
                id: self.id.clone(),
                phase: Phase::SenseControl,
                source,
            })
    }

    /// Act hook: commits every actuator's setpoints.
    pub fn act(&mut self, env: &PhaseEnv<'_>) -> Result<(), SimError> {
        let mut ctx = ActContext {
            env,
            body: self.body,
        };
        for (name, actuator) in &mut self.actuators {
            actuator.update(&mut ctx).map_err(|source| SimError::ControllerFailure {
                id: format!("{}/{name}", self.id),
                phase: Phase::Act,
                source,
            })?;
        }
        Ok(())
    }

    /// Reset hook: controller, sensors, actuators, and the ray log.
    pub fn reset(&mut self) {
        self.controller.reset();
        for (_, sensor) in &mut self.sensors {
            sensor.reset();
        }
        for (_, actuator) in &mut self.actuators {
            actuator.reset();
        }
        self.checked_rays.clear();
    }

    /// Called at scene teardown.
    pub fn destroy(&mut self) {
        self.controller.destroy();
    }

    /// Read access to the controller for assertions in tests and loop
    /// functions.
    #[must_use]
    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    /// Read access to the sensor registered under `name`, downcast to `T`.
    #[must_use]
    pub fn sensor<T: Sensor + 'static>(&self, name: &str) -> Option<&T> {
        self.sensors
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, s)| s.as_any().downcast_ref::<T>())
    }
}
