// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Media: per-channel registries connecting transmitters to receivers.
//!
//! Each medium defines how transmitter-side state becomes receiver-side
//! observation. Once per media phase the medium gathers the enabled
//! emitters, computes per-receiver visibility (range plus occlusion via the
//! ray query layer), and stores the reading lists. Readings produced in
//! tick N are read by sensors in tick N's sense phase.

pub mod led;
pub mod rab;

use std::any::Any;

use crate::error::BoxedError;
use crate::space::PhaseEnv;

pub use led::{LedDevice, LedMedium};
pub use rab::{RabDevice, RabMedium, RabReading};

/// A per-channel observation registry.
pub trait Medium: Send {
    /// Stable medium identifier; sensors locate their channel by it.
    fn id(&self) -> &str;

    /// Clears every reading list and any derived index.
    fn reset(&mut self);

    /// Recomputes the per-receiver readings for this tick.
    fn update(&mut self, env: &PhaseEnv<'_>) -> Result<(), BoxedError>;

    /// Downcast support for registration and typed sensor access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
