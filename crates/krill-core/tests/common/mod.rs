// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared fixtures for the kernel integration tests.
#![allow(dead_code, missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use glam::DVec3;
use krill_core::control::{
    ActContext, Actuator, ControlIo, ControlResult, Controller, SenseContext, Sensor,
};
use krill_core::devices::DifferentialDriveActuator;
use krill_core::physics::pointmass::PointMassEngine;
use krill_core::{RobotConfig, Space, Threading};
use krill_geom::Aabb;

/// Shared hook log: `(robot id, hook name)` in global execution order.
pub type HookLog = Arc<Mutex<Vec<(String, &'static str)>>>;

pub fn new_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Controller that records its `control_step` calls and optionally drives
/// the wheels at constant speeds.
pub struct RecordingController {
    pub id: String,
    pub log: HookLog,
    pub wheels: Option<(f64, f64)>,
}

impl Controller for RecordingController {
    fn control_step(&mut self, io: &mut ControlIo<'_>) -> ControlResult {
        self.log
            .lock()
            .unwrap()
            .push((self.id.clone(), "control_step"));
        if let Some((left, right)) = self.wheels {
            io.actuator::<DifferentialDriveActuator>("wheels")?
                .set_speeds(left, right);
        }
        Ok(())
    }
}

/// Sensor that records its `update` calls.
pub struct RecordingSensor {
    pub id: String,
    pub log: HookLog,
}

impl Sensor for RecordingSensor {
    fn update(&mut self, _ctx: &mut SenseContext<'_>) -> ControlResult {
        self.log.lock().unwrap().push((self.id.clone(), "sense"));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Actuator that records its `update` calls.
pub struct RecordingActuator {
    pub id: String,
    pub log: HookLog,
}

impl Actuator for RecordingActuator {
    fn update(&mut self, _ctx: &mut ActContext<'_>) -> ControlResult {
        self.log.lock().unwrap().push((self.id.clone(), "act"));
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Controller that burns CPU proportional to `cost` before driving, for
/// load-skew experiments.
pub struct BusyController {
    pub cost: u64,
    pub sink: Arc<AtomicU64>,
}

impl Controller for BusyController {
    fn control_step(&mut self, io: &mut ControlIo<'_>) -> ControlResult {
        let mut acc = 0u64;
        for i in 0..self.cost {
            acc = acc.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(i);
        }
        self.sink.fetch_add(acc | 1, Ordering::Relaxed);
        io.actuator::<DifferentialDriveActuator>("wheels")?
            .set_speeds(0.05, 0.05);
        Ok(())
    }
}

/// A space with one unbounded point-mass engine (10 iterations, matching
/// the 100 ms default tick).
pub fn space_with_engine(threading: Threading) -> Space {
    let mut space = Space::new(threading);
    space.add_engine(Box::new(PointMassEngine::new("pm", 0.1, 10, None)));
    space
}

/// A space with two engines tiling the arena at x = 0.
pub fn space_with_split_engines(threading: Threading) -> Space {
    let mut space = Space::new(threading);
    let left = Aabb::new(DVec3::new(-50.0, -50.0, -50.0), DVec3::new(0.0, 50.0, 50.0));
    let right = Aabb::new(DVec3::new(0.0, -50.0, -50.0), DVec3::new(50.0, 50.0, 50.0));
    space.add_engine(Box::new(PointMassEngine::new("left", 0.1, 10, Some(left))));
    space.add_engine(Box::new(PointMassEngine::new("right", 0.1, 10, Some(right))));
    space
}

/// Adds a robot whose controller, one sensor, and one actuator all record
/// their hook invocations into `log`.
pub fn add_recording_robot(
    space: &mut Space,
    id: &str,
    position: DVec3,
    log: &HookLog,
    wheels: Option<(f64, f64)>,
) -> krill_core::EntityKey {
    let controller = RecordingController {
        id: id.to_owned(),
        log: Arc::clone(log),
        wheels,
    };
    let mut config = RobotConfig::new(id, position, Box::new(controller));
    config.extra_sensors.push((
        "recorder".to_owned(),
        Box::new(RecordingSensor {
            id: id.to_owned(),
            log: Arc::clone(log),
        }),
    ));
    config.extra_actuators.push((
        "recorder".to_owned(),
        Box::new(RecordingActuator {
            id: id.to_owned(),
            log: Arc::clone(log),
        }),
    ));
    space.add_robot(config).expect("robot accepted")
}

/// Events of one tick, split out of a hook log: `(acts, senses, steps)`.
pub fn split_hooks(log: &[(String, &'static str)]) -> (usize, usize, usize) {
    let acts = log.iter().filter(|(_, h)| *h == "act").count();
    let senses = log.iter().filter(|(_, h)| *h == "sense").count();
    let steps = log.iter().filter(|(_, h)| *h == "control_step").count();
    (acts, senses, steps)
}
