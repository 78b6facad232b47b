// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Range-and-bearing medium: visibility, occlusion, and reading flow.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::f64::consts::PI;

use common::space_with_engine;
use glam::DVec3;
use krill_core::control::{ControlIo, ControlResult, Controller};
use krill_core::devices::{RabActuator, RabSensor};
use krill_core::medium::RabMedium;
use krill_core::{BodyShape, RabConfig, RobotConfig, Space, Threading};

/// Broadcasts its own tag byte every step.
struct Beacon {
    tag: u8,
}

impl Controller for Beacon {
    fn control_step(&mut self, io: &mut ControlIo<'_>) -> ControlResult {
        let payload = [self.tag; 4];
        io.actuator::<RabActuator>("rab")?.set_data(&payload)?;
        Ok(())
    }
}

fn rab_space() -> Space {
    let mut space = space_with_engine(Threading::SingleThread);
    space.add_medium(Box::new(RabMedium::new("rab", 1.0, true)));
    space
}

fn beacon_robot(id: &str, tag: u8, position: DVec3, yaw: f64, range: f64) -> RobotConfig {
    let mut config = RobotConfig::new(id, position, Box::new(Beacon { tag }));
    config.yaw = yaw;
    config.rab = Some(RabConfig {
        medium: "rab".to_owned(),
        range,
        msg_size: 4,
        offset: DVec3::new(0.0, 0.0, 0.1),
    });
    config
}

fn readings_of(space: &Space, robot: krill_core::EntityKey) -> Vec<(Vec<u8>, f64, f64)> {
    space
        .with_controllable(robot, |c| {
            c.sensor::<RabSensor>("rab")
                .unwrap()
                .readings()
                .iter()
                .map(|r| (r.data.clone(), r.range, r.horizontal_bearing))
                .collect()
        })
        .expect("controllable")
}

#[test]
fn neighbours_in_range_hear_each_other() {
    let mut space = rab_space();
    let alpha = space
        .add_robot(beacon_robot("alpha", 0xAA, DVec3::ZERO, 0.0, 3.0))
        .expect("alpha");
    let beta = space
        .add_robot(beacon_robot("beta", 0xBB, DVec3::new(1.0, 0.0, 0.0), PI, 3.0))
        .expect("beta");

    // Payloads staged in tick 0's control step are committed in tick 1's
    // act phase and heard in tick 1's sense phase.
    space.update().expect("tick 0");
    space.update().expect("tick 1");

    let alpha_hears = readings_of(&space, alpha);
    assert_eq!(alpha_hears.len(), 1);
    let (data, range, bearing) = &alpha_hears[0];
    assert_eq!(data, &vec![0xBB; 4]);
    assert!((range - 1.0).abs() < 1e-9, "measured range is the distance");
    assert!(bearing.abs() < 1e-9, "beta sits dead ahead of alpha");

    let beta_hears = readings_of(&space, beta);
    assert_eq!(beta_hears.len(), 1);
    assert_eq!(beta_hears[0].0, vec![0xAA; 4]);
    // Beta faces -x, so alpha is also dead ahead in beta's frame.
    assert!(beta_hears[0].2.abs() < 1e-9);
}

#[test]
fn out_of_range_emitters_are_silent() {
    let mut space = rab_space();
    let alpha = space
        .add_robot(beacon_robot("alpha", 1, DVec3::ZERO, 0.0, 2.0))
        .expect("alpha");
    space
        .add_robot(beacon_robot("beta", 2, DVec3::new(5.0, 0.0, 0.0), 0.0, 2.0))
        .expect("beta");

    space.update().expect("tick 0");
    space.update().expect("tick 1");
    assert!(readings_of(&space, alpha).is_empty());
}

#[test]
fn occluding_wall_blocks_the_channel() {
    let mut space = rab_space();
    let alpha = space
        .add_robot(beacon_robot("alpha", 1, DVec3::ZERO, 0.0, 5.0))
        .expect("alpha");
    let beta = space
        .add_robot(beacon_robot("beta", 2, DVec3::new(2.0, 0.0, 0.0), 0.0, 5.0))
        .expect("beta");
    space
        .add_obstacle(
            "wall",
            DVec3::new(1.0, 0.0, 0.0),
            0.0,
            BodyShape::Box {
                half_extents: DVec3::new(0.05, 2.0, 2.0),
            },
        )
        .expect("wall");

    space.update().expect("tick 0");
    space.update().expect("tick 1");
    assert!(readings_of(&space, alpha).is_empty(), "wall occludes beta");
    assert!(readings_of(&space, beta).is_empty(), "wall occludes alpha");
}

#[test]
fn disabling_the_controllable_keeps_the_channel_state() {
    let mut space = rab_space();
    let alpha = space
        .add_robot(beacon_robot("alpha", 1, DVec3::ZERO, 0.0, 3.0))
        .expect("alpha");
    let beta = space
        .add_robot(beacon_robot("beta", 2, DVec3::new(1.0, 0.0, 0.0), 0.0, 3.0))
        .expect("beta");

    space.update().expect("tick 0");
    space.set_robot_enabled(beta, false).expect("disable");
    // Beta's device entity stays enabled but its robot no longer acts; the
    // payload it committed in tick 0 keeps broadcasting, which is exactly
    // the retained-state semantics of the channel registry.
    space.update().expect("tick 1");
    assert_eq!(readings_of(&space, alpha).len(), 1);
    let _ = beta;
}

#[test]
fn bearing_rotates_with_the_receiver_frame() {
    let mut space = rab_space();
    let alpha = space
        .add_robot(beacon_robot("alpha", 1, DVec3::ZERO, PI / 2.0, 3.0))
        .expect("alpha");
    space
        .add_robot(beacon_robot("beta", 2, DVec3::new(1.0, 0.0, 0.0), 0.0, 3.0))
        .expect("beta");

    space.update().expect("tick 0");
    space.update().expect("tick 1");
    let readings = readings_of(&space, alpha);
    assert_eq!(readings.len(), 1);
    // Alpha faces +y; beta sits at +x, which is -pi/2 in alpha's frame.
    assert!((readings[0].2 + PI / 2.0).abs() < 1e-9);
}
