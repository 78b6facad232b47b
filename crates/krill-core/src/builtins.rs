// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in controllers.

use crate::control::{ControlIo, ControlResult, Controller};
use crate::devices::DifferentialDriveActuator;
use crate::scene::SceneNode;

/// A controller that does nothing. Useful for passive robots and as the
/// smallest possible controller example.
#[derive(Debug, Default)]
pub struct NopController {
    steps: u64,
}

impl NopController {
    /// Creates the controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of control steps executed since init or reset.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl Controller for NopController {
    fn reset(&mut self) {
        self.steps = 0;
    }

    fn control_step(&mut self, _io: &mut ControlIo<'_>) -> ControlResult {
        self.steps += 1;
        Ok(())
    }
}

/// Drives the wheels at constant speeds read from the scene description.
#[derive(Debug, Default)]
pub struct ConstantDriveController {
    left: f64,
    right: f64,
}

impl ConstantDriveController {
    /// Creates a controller with explicit wheel speeds.
    #[must_use]
    pub fn with_speeds(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

impl Controller for ConstantDriveController {
    fn init(&mut self, node: &SceneNode<'_>) -> ControlResult {
        self.left = node.attribute_or("left", self.left)?;
        self.right = node.attribute_or("right", self.right)?;
        Ok(())
    }

    fn control_step(&mut self, io: &mut ControlIo<'_>) -> ControlResult {
        io.actuator::<DifferentialDriveActuator>("wheels")?
            .set_speeds(self.left, self.right);
        Ok(())
    }
}
