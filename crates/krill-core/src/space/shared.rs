// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! State shared between the main thread and the worker pool.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use slotmap::SlotMap;

use crate::entity::body::Body;
use crate::entity::controllable::ControllableEntity;
use crate::entity::EntityArena;
use crate::error::SimError;
use crate::ident::{BodyKey, LedKey, RabKey, SimClock};
use crate::index::SpaceHash;
use crate::lock;
use crate::loopfn::EntityIterFn;
use crate::medium::rab::RabDevice;
use crate::medium::{LedDevice, Medium};
use crate::phase::Phase;
use crate::physics::{EngineContext, PhysicsEngine};

use super::env::PhaseEnv;

/// The mutable world: entity tree, bodies, devices, and the embodied index.
///
/// Collections are `RwLock`ed so phase tasks share read access while the
/// main thread takes write access between phases for add/remove, transfer,
/// and index rebuilds. Per-item hot state hides behind its own lock.
pub struct World {
    /// The entity tree.
    pub(crate) entities: RwLock<EntityArena>,
    /// Body records.
    pub(crate) bodies: RwLock<SlotMap<BodyKey, Body>>,
    /// Range-and-bearing devices.
    pub(crate) rab: RwLock<SlotMap<RabKey, Mutex<RabDevice>>>,
    /// LED devices.
    pub(crate) leds: RwLock<SlotMap<LedKey, Mutex<LedDevice>>>,
    /// Positional index over embodied entities, rebuilt between the physics
    /// and sense phases.
    pub(crate) embodied_index: RwLock<SpaceHash<BodyKey>>,
}

impl World {
    fn new(index_cell_size: f64) -> Self {
        Self {
            entities: RwLock::new(EntityArena::new()),
            bodies: RwLock::new(SlotMap::with_key()),
            rab: RwLock::new(SlotMap::with_key()),
            leds: RwLock::new(SlotMap::with_key()),
            embodied_index: RwLock::new(SpaceHash::new(index_cell_size)),
        }
    }
}

/// Everything a worker needs a handle on, behind one `Arc`.
pub(crate) struct SpaceShared {
    pub(crate) world: World,
    pub(crate) controllables: RwLock<Vec<Mutex<ControllableEntity>>>,
    pub(crate) engines: RwLock<Vec<Mutex<Box<dyn PhysicsEngine>>>>,
    pub(crate) media: RwLock<Vec<Mutex<Box<dyn Medium>>>>,
    pub(crate) entity_iter: RwLock<Option<EntityIterFn>>,
    errors: Mutex<Vec<SimError>>,
    /// Bumped on controllable add/remove; ranged strategies recompute their
    /// assignments when it changes.
    pub(crate) controllable_epoch: AtomicU64,
    /// Bumped on engine add/remove.
    pub(crate) engine_epoch: AtomicU64,
    /// Bumped on medium add/remove.
    pub(crate) media_epoch: AtomicU64,
    /// Scheduler-chosen sub-step multiplier for the current tick.
    pub(crate) substeps: AtomicU32,
    pub(crate) clock: RwLock<SimClock>,
}

impl SpaceShared {
    pub(crate) fn new(tick_seconds: f64, index_cell_size: f64) -> Self {
        Self {
            world: World::new(index_cell_size),
            controllables: RwLock::new(Vec::new()),
            engines: RwLock::new(Vec::new()),
            media: RwLock::new(Vec::new()),
            entity_iter: RwLock::new(None),
            errors: Mutex::new(Vec::new()),
            controllable_epoch: AtomicU64::new(0),
            engine_epoch: AtomicU64::new(0),
            media_epoch: AtomicU64::new(0),
            substeps: AtomicU32::new(1),
            clock: RwLock::new(SimClock::new(tick_seconds)),
        }
    }

    /// Acquires the phase read guards and runs `f` with the assembled view.
    ///
    /// Guards are held only for the duration of `f`; callers must not hold
    /// them across a barrier wait, or the main thread's write locks would
    /// deadlock.
    pub(crate) fn with_phase_env<R>(&self, f: impl FnOnce(&PhaseEnv<'_>) -> R) -> R {
        let entities = lock::read(&self.world.entities);
        let bodies = lock::read(&self.world.bodies);
        let rab = lock::read(&self.world.rab);
        let leds = lock::read(&self.world.leds);
        let embodied_index = lock::read(&self.world.embodied_index);
        let controllables = lock::read(&self.controllables);
        let engines = lock::read(&self.engines);
        let media = lock::read(&self.media);
        let clock = *lock::read(&self.clock);
        let env = PhaseEnv {
            entities: &entities,
            bodies: &bodies,
            rab: &rab,
            leds: &leds,
            controllables: &controllables,
            engines: &engines,
            media: &media,
            embodied_index: &embodied_index,
            clock,
            substeps: self.substeps.load(Ordering::Acquire),
        };
        f(&env)
    }

    /// Number of tasks `phase` dispatches.
    pub(crate) fn task_count(env: &PhaseEnv<'_>, phase: Phase) -> usize {
        match phase {
            Phase::Act | Phase::SenseControl | Phase::PreStepIter | Phase::PostStepIter => {
                env.controllables.len()
            }
            Phase::Physics => env.engines.len(),
            Phase::Media => env.media.len(),
            Phase::EntityTransfer => 0,
        }
    }

    /// Runs task `index` of `phase`, recording any failure in the error
    /// sink. Never panics, never blocks on another task's lock.
    pub(crate) fn execute_task(&self, env: &PhaseEnv<'_>, phase: Phase, index: usize) {
        match phase {
            Phase::Act => {
                let Some(cell) = env.controllables.get(index) else {
                    return;
                };
                let mut controllable = lock::lock(cell);
                if controllable.is_enabled() {
                    if let Err(error) = controllable.act(env) {
                        self.push_error(error);
                    }
                }
            }
            Phase::SenseControl => {
                let Some(cell) = env.controllables.get(index) else {
                    return;
                };
                let mut controllable = lock::lock(cell);
                if controllable.is_enabled() {
                    let result = controllable
                        .sense(env)
                        .and_then(|()| controllable.control_step());
                    if let Err(error) = result {
                        self.push_error(error);
                    }
                }
            }
            Phase::Physics => {
                let Some(cell) = env.engines.get(index) else {
                    return;
                };
                let mut engine = lock::lock(cell);
                let ctx = EngineContext {
                    bodies: env.bodies,
                    substeps: env.substeps,
                    clock: env.clock,
                };
                if let Err(source) = engine.update(&ctx) {
                    let id = engine.id().to_owned();
                    self.push_error(SimError::EngineFailure { id, source });
                }
            }
            Phase::Media => {
                let Some(cell) = env.media.get(index) else {
                    return;
                };
                let mut medium = lock::lock(cell);
                if let Err(source) = medium.update(env) {
                    let id = medium.id().to_owned();
                    self.push_error(SimError::MediumFailure { id, source });
                }
            }
            Phase::PreStepIter | Phase::PostStepIter => {
                let callback = lock::read(&self.entity_iter);
                let Some(callback) = callback.as_ref() else {
                    return;
                };
                let Some(cell) = env.controllables.get(index) else {
                    return;
                };
                let mut controllable = lock::lock(cell);
                if controllable.is_enabled() {
                    callback(&mut controllable);
                }
            }
            Phase::EntityTransfer => {}
        }
    }

    /// Records a task error for the main thread to drain after the phase
    /// barrier closes. No worker swallows an error.
    pub(crate) fn push_error(&self, error: SimError) {
        lock::lock(&self.errors).push(error);
    }

    /// Takes every error recorded since the last drain.
    pub(crate) fn drain_errors(&self) -> Vec<SimError> {
        std::mem::take(&mut lock::lock(&self.errors))
    }
}
