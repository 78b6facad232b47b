// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Loop functions: experiment-level user hooks.
//!
//! The whole-run hooks (`pre_step`/`post_step`) run on the main thread with
//! full access to the space. The per-entity iteration callback, when set,
//! is dispatched across the worker pool as the `pre_step_iter` and
//! `post_step_iter` phases.

use crate::control::ControlResult;
use crate::entity::controllable::ControllableEntity;
use crate::scene::SceneNode;
use crate::space::Space;

/// Floor colour sample, RGB.
pub type FloorColour = [u8; 3];

/// Experiment-level callbacks around each tick.
///
/// Pre/post-step may read everything and must mutate only entities they
/// created.
pub trait LoopFunctions: Send {
    /// Called once after the scene is built.
    fn init(&mut self, _node: &SceneNode<'_>, _space: &mut Space) -> ControlResult {
        Ok(())
    }

    /// Called on every `Space::reset`.
    fn reset(&mut self, _space: &mut Space) {}

    /// Called once at teardown.
    fn destroy(&mut self) {}

    /// Runs on the main thread before the per-entity pre-step iteration.
    fn pre_step(&mut self, _space: &mut Space) {}

    /// Runs on the main thread after the per-entity post-step iteration.
    fn post_step(&mut self, _space: &mut Space) {}

    /// Colour of the floor at `(x, y)`; defaults to white.
    fn floor_colour(&self, _x: f64, _y: f64) -> FloorColour {
        [255, 255, 255]
    }
}

/// Per-entity iteration callback dispatched as the `pre_step_iter` /
/// `post_step_iter` phases.
pub type EntityIterFn = Box<dyn Fn(&mut ControllableEntity) + Send + Sync>;
