// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The controller boundary: controllers, sensors, actuators.
//!
//! A controller never touches the world directly. Sensors read anchors,
//! indices, and media during the sense phase; the controller computes from
//! sensor readings during `control_step`; actuators push commands into
//! engine-side state during the act phase. The kernel guarantees the hooks
//! run exactly once per tick, in phase order, on enabled entities only.

use std::any::Any;

use crate::entity::controllable::CheckedRay;
use crate::error::{BoxedError, ComponentError};
use crate::ident::BodyKey;
use crate::scene::SceneNode;
use crate::space::PhaseEnv;

/// Result type for user-provided hook implementations.
pub type ControlResult = Result<(), BoxedError>;

/// A user controller.
pub trait Controller: Send {
    /// Called once at scene init with the controller's parameter node.
    fn init(&mut self, _node: &SceneNode<'_>) -> ControlResult {
        Ok(())
    }

    /// Restores the controller to its just-initialised state.
    fn reset(&mut self) {}

    /// Called once at scene teardown.
    fn destroy(&mut self) {}

    /// One control step; reads sensors and writes actuators through `io`.
    fn control_step(&mut self, io: &mut ControlIo<'_>) -> ControlResult;
}

/// A sensor owned by a controllable entity.
///
/// A sensor's `update` must only read anchors, positional indices, and
/// media; it must never mutate world state.
pub trait Sensor: Send {
    /// Called once at scene init with the device's parameter node.
    fn init(&mut self, _node: &SceneNode<'_>) -> ControlResult {
        Ok(())
    }

    /// Recomputes the readings for this tick.
    fn update(&mut self, ctx: &mut SenseContext<'_>) -> ControlResult;

    /// Clears the readings.
    fn reset(&mut self) {}

    /// Downcast support for [`ControlIo::sensor`].
    fn as_any(&self) -> &dyn Any;
}

/// An actuator owned by a controllable entity.
///
/// An actuator's `update` must only push commands into engine-side models
/// or device state; sensing happens elsewhere.
pub trait Actuator: Send {
    /// Called once at scene init with the device's parameter node.
    fn init(&mut self, _node: &SceneNode<'_>) -> ControlResult {
        Ok(())
    }

    /// Commits the setpoints stored by the controller.
    fn update(&mut self, ctx: &mut ActContext<'_>) -> ControlResult;

    /// Clears the setpoints.
    fn reset(&mut self) {}

    /// Downcast support for [`ControlIo::actuator`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Context handed to sensors during the sense phase.
pub struct SenseContext<'a> {
    /// Shared read-only view of the tick state.
    pub env: &'a PhaseEnv<'a>,
    /// The sensing robot's body.
    pub body: BodyKey,
    /// Per-tick ray log for visualisation; sensors push every ray they
    /// cast, hit or miss.
    pub checked_rays: &'a mut Vec<CheckedRay>,
}

/// Context handed to actuators during the act phase.
pub struct ActContext<'a> {
    /// Shared view of the tick state.
    pub env: &'a PhaseEnv<'a>,
    /// The actuating robot's body.
    pub body: BodyKey,
}

/// The controller's window onto its own devices.
pub struct ControlIo<'a> {
    pub(crate) sensors: &'a [(String, Box<dyn Sensor>)],
    pub(crate) actuators: &'a mut [(String, Box<dyn Actuator>)],
}

impl ControlIo<'_> {
    /// Borrows the sensor registered under `name`, downcast to `T`.
    pub fn sensor<T: Sensor + 'static>(&self, name: &str) -> Result<&T, ComponentError> {
        self.sensors
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, s)| s.as_any().downcast_ref::<T>())
            .ok_or_else(|| ComponentError::NotFound {
                query: name.to_owned(),
            })
    }

    /// Mutably borrows the actuator registered under `name`, downcast to
    /// `T`.
    pub fn actuator<T: Actuator + 'static>(&mut self, name: &str) -> Result<&mut T, ComponentError> {
        self.actuators
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, a)| a.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| ComponentError::NotFound {
                query: name.to_owned(),
            })
    }
}
