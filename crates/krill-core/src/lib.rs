// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! krill-core: deterministic multi-robot simulation kernel.
//!
//! The kernel advances a population of robots, their controllers, and one or
//! more physics engines in lockstep. Each tick is partitioned into a fixed
//! sequence of phases ([`phase::Phase`]) that the [`space::Space`] dispatches
//! either inline or across a worker pool driven by one of three
//! load-balancing strategies ([`space::Strategy`]).
//!
//! The main entry points:
//! - [`space::Space`] — owns all entities, engines, and media; drives ticks.
//! - [`scene::SceneDoc`] — hierarchical scene description input.
//! - [`registry::Registry`] — factories for controllers, engines, and media.
//!
//! Determinism contract: two runs with the same scene, seed, and build
//! produce bit-identical entity trajectories. Worker count and strategy
//! change wall-clock only; the kernel never introduces
//! scheduling-dependent state.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

pub mod builtins;
pub mod control;
pub mod devices;
pub mod entity;
pub mod error;
pub mod ident;
pub mod index;
pub(crate) mod lock;
pub mod loopfn;
pub mod medium;
pub mod phase;
pub mod physics;
pub mod registry;
pub mod scene;
pub mod space;

pub use entity::body::{Body, BodyShape, BodyState, DriveCommand};
pub use entity::controllable::{CheckedRay, ControllableEntity};
pub use error::{ComponentError, SceneError, SimError, TickError};
pub use ident::{BodyKey, EntityKey, LedKey, RabKey, SimClock};
pub use phase::Phase;
pub use registry::Registry;
pub use scene::{SceneDoc, SceneNode};
pub use space::{
    LedConfig, ProximityConfig, RabConfig, RobotConfig, ShutdownHandle, Space, Strategy,
    SubStepConfig, Threading,
};
