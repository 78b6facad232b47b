// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The three load-balancing strategies and the inline path must produce
//! identical simulation results; they may only differ in wall-clock.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use common::{space_with_engine, BusyController};
use glam::DVec3;
use krill_core::{RobotConfig, Space, Strategy, Threading};

const TICKS: usize = 40;

fn drive_swarm(threading: Threading) -> Vec<(DVec3, glam::DQuat)> {
    let mut space = space_with_engine(threading);
    let mut robots = Vec::new();
    for i in 0..12 {
        let controller = krill_core::builtins::ConstantDriveController::with_speeds(
            0.05 + 0.01 * i as f64,
            0.05,
        );
        let mut config = RobotConfig::new(
            format!("bot{i}"),
            DVec3::new(i as f64 * 0.8, 0.0, 0.0),
            Box::new(controller),
        );
        config.yaw = 0.3 * i as f64;
        robots.push(space.add_robot(config).expect("robot accepted"));
    }
    for _ in 0..TICKS {
        space.update().expect("tick");
    }
    robots
        .iter()
        .map(|&r| space.entity_pose(r).expect("pose"))
        .collect()
}

#[test]
fn all_strategies_match_the_inline_reference_bitwise() {
    let reference = drive_swarm(Threading::SingleThread);
    for strategy in [
        Strategy::ScatterGather,
        Strategy::BalanceQuantity,
        Strategy::BalanceLength,
    ] {
        let poses = drive_swarm(Threading::Multi {
            strategy,
            workers: 4,
        });
        assert_eq!(poses, reference, "strategy {strategy:?} diverged");
    }
}

#[test]
fn worker_counts_do_not_change_results() {
    let reference = drive_swarm(Threading::Multi {
        strategy: Strategy::BalanceLength,
        workers: 1,
    });
    for workers in [2, 3, 8] {
        let poses = drive_swarm(Threading::Multi {
            strategy: Strategy::BalanceLength,
            workers,
        });
        assert_eq!(poses, reference, "worker count {workers} diverged");
    }
}

fn skewed_load(threading: Threading) -> Vec<(DVec3, glam::DQuat)> {
    let mut space = space_with_engine(threading);
    let sink = Arc::new(AtomicU64::new(0));
    let mut robots = Vec::new();
    for i in 0..20 {
        // A few controllers cost an order of magnitude more than the rest;
        // balance-length exists for exactly this shape of load.
        let cost = if i % 5 == 0 { 200_000 } else { 20_000 };
        let controller = BusyController {
            cost,
            sink: Arc::clone(&sink),
        };
        robots.push(
            space
                .add_robot(RobotConfig::new(
                    format!("bot{i}"),
                    DVec3::new(i as f64, 0.0, 0.0),
                    Box::new(controller),
                ))
                .expect("robot accepted"),
        );
    }
    for _ in 0..10 {
        space.update().expect("tick");
    }
    robots
        .iter()
        .map(|&r| space.entity_pose(r).expect("pose"))
        .collect()
}

#[test]
fn skewed_load_is_correct_under_work_stealing() {
    let reference = skewed_load(Threading::Multi {
        strategy: Strategy::ScatterGather,
        workers: 4,
    });
    let stolen = skewed_load(Threading::Multi {
        strategy: Strategy::BalanceLength,
        workers: 4,
    });
    assert_eq!(stolen, reference);
}

#[test]
fn adding_a_robot_mid_run_redistributes_work() {
    let mut space = space_with_engine(Threading::Multi {
        strategy: Strategy::ScatterGather,
        workers: 3,
    });
    let mut robots = Vec::new();
    for i in 0..4 {
        robots.push(
            space
                .add_robot(RobotConfig::new(
                    format!("bot{i}"),
                    DVec3::new(i as f64, 0.0, 0.0),
                    Box::new(krill_core::builtins::ConstantDriveController::with_speeds(0.1, 0.1)),
                ))
                .expect("robot"),
        );
    }
    for _ in 0..5 {
        space.update().expect("tick");
    }
    // Add and remove while the pool is parked between ticks; the ranged
    // strategies must pick up the new assignment epoch.
    let late = space
        .add_robot(RobotConfig::new(
            "late",
            DVec3::new(10.0, 0.0, 0.0),
            Box::new(krill_core::builtins::ConstantDriveController::with_speeds(0.1, 0.1)),
        ))
        .expect("late robot");
    for _ in 0..5 {
        space.update().expect("tick");
    }
    let before = space.entity_pose(late).expect("pose");
    assert!(before.0.x > 10.0, "late robot must be simulated after the epoch bump");

    space.remove_robot(robots[0]).expect("remove");
    for _ in 0..5 {
        space.update().expect("tick");
    }
    assert_eq!(space.controllable_count(), 4);
    assert!(space.entity_pose(robots[0]).is_none(), "removed robot is gone");
}

fn checkpointed_run(space: &mut Space, robot: krill_core::EntityKey, ticks: usize) -> DVec3 {
    for _ in 0..ticks {
        space.update().expect("tick");
    }
    space.entity_pose(robot).expect("pose").0
}

#[test]
fn reset_is_idempotent_and_replays_identically() {
    let mut space = space_with_engine(Threading::SingleThread);
    let robot = space
        .add_robot(RobotConfig::new(
            "bot",
            DVec3::ZERO,
            Box::new(krill_core::builtins::ConstantDriveController::with_speeds(0.2, 0.1)),
        ))
        .expect("robot");

    let first = checkpointed_run(&mut space, robot, 30);
    space.reset();
    space.reset();
    assert_eq!(space.tick(), 0);
    let initial = space.entity_pose(robot).expect("pose");
    assert_eq!(initial.0, DVec3::ZERO, "reset restores the initial pose");

    let second = checkpointed_run(&mut space, robot, 30);
    assert_eq!(first, second, "a reset run replays bitwise");
}
