// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Determinism: equal scene + seed + build ⇒ equal timelines, bitwise.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::space_with_engine;
use glam::DVec3;
use krill_core::builtins::ConstantDriveController;
use krill_core::medium::RabMedium;
use krill_core::{RabConfig, Registry, RobotConfig, SceneDoc, Space, Strategy, Threading};

fn populated_space(threading: Threading, seed: u64) -> (Space, Vec<krill_core::EntityKey>) {
    let mut space = space_with_engine(threading);
    space.reseed(seed);
    space.add_medium(Box::new(RabMedium::new("rab", 1.0, true)));
    let mut robots = Vec::new();
    for i in 0..10 {
        let mut config = RobotConfig::new(
            format!("bot{i}"),
            DVec3::new((i % 4) as f64, (i / 4) as f64, 0.0),
            Box::new(ConstantDriveController::with_speeds(
                0.08 + 0.003 * i as f64,
                0.08,
            )),
        );
        config.yaw = 0.7 * i as f64;
        config.rab = Some(RabConfig {
            medium: "rab".to_owned(),
            range: 2.0,
            msg_size: 2,
            offset: DVec3::new(0.0, 0.0, 0.1),
        });
        robots.push(space.add_robot(config).expect("robot"));
    }
    (space, robots)
}

fn trajectory(threading: Threading, seed: u64, ticks: usize) -> Vec<[u64; 3]> {
    let (mut space, robots) = populated_space(threading, seed);
    let mut samples = Vec::new();
    for _ in 0..ticks {
        space.update().expect("tick");
        for &robot in &robots {
            let (position, _) = space.entity_pose(robot).expect("pose");
            // Bit-exact capture; no epsilon anywhere in this test.
            samples.push([
                position.x.to_bits(),
                position.y.to_bits(),
                position.z.to_bits(),
            ]);
        }
    }
    samples
}

#[test]
fn identical_runs_are_bitwise_identical_single_thread() {
    let a = trajectory(Threading::SingleThread, 42, 60);
    let b = trajectory(Threading::SingleThread, 42, 60);
    assert_eq!(a, b);
}

#[test]
fn identical_runs_are_bitwise_identical_threaded() {
    let threading = Threading::Multi {
        strategy: Strategy::BalanceLength,
        workers: 4,
    };
    let a = trajectory(threading, 42, 60);
    let b = trajectory(threading, 42, 60);
    assert_eq!(a, b);
}

#[test]
fn threaded_runs_match_the_inline_timeline() {
    let inline = trajectory(Threading::SingleThread, 7, 60);
    for strategy in [
        Strategy::ScatterGather,
        Strategy::BalanceQuantity,
        Strategy::BalanceLength,
    ] {
        let threaded = trajectory(
            Threading::Multi {
                strategy,
                workers: 3,
            },
            7,
            60,
        );
        assert_eq!(threaded, inline, "strategy {strategy:?} diverged");
    }
}

#[test]
fn scene_built_spaces_replay_identically() {
    let scene = r#"{
        "arena": { "size": [10.0, 10.0, 2.0], "seed": 99, "tick_seconds": 0.1 },
        "engines": [ { "id": "pm", "type": "pointmass", "iterations": 10 } ],
        "media": [ { "id": "rab", "type": "range_and_bearing", "cell_size": 1.0 } ],
        "robots": [
            {
                "id": "a",
                "position": [0.0, 0.0, 0.0],
                "controller": { "type": "constant_drive", "params": { "left": 0.1, "right": 0.12 } },
                "devices": { "rab": { "medium": "rab", "range": 2.0, "msg_size": 4 } }
            },
            {
                "id": "b",
                "position": [1.0, 0.0, 0.0],
                "yaw_deg": 180.0,
                "controller": { "type": "constant_drive", "params": { "left": 0.1, "right": 0.1 } },
                "devices": { "rab": { "medium": "rab", "range": 2.0, "msg_size": 4 } }
            }
        ]
    }"#;
    let doc: SceneDoc = scene.parse().expect("scene parses");
    let registry = Registry::with_builtins();

    let run = |threading| {
        let mut space = Space::from_scene(&doc, &registry, threading).expect("space builds");
        for _ in 0..50 {
            space.update().expect("tick");
        }
        ["a", "b"]
            .iter()
            .map(|id| {
                let key = space.entity_by_id(id).expect("robot exists");
                let (p, _) = space.entity_pose(key).expect("pose");
                [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(Threading::SingleThread), run(Threading::SingleThread));
    assert_eq!(
        run(Threading::SingleThread),
        run(Threading::Multi {
            strategy: Strategy::BalanceQuantity,
            workers: 2,
        })
    );
}
