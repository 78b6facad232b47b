// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The Space: owner of all entities, engines, and media, and the driver of
//! the per-tick phase pipeline.
//!
//! One tick is exactly this sequence:
//!
//! | # | phase            | work item                                   |
//! |---|------------------|---------------------------------------------|
//! | 1 | `act`            | enabled controllable → `act()`              |
//! | 2 | `physics`        | each engine → `update()`                    |
//! | 3 | entity transfer  | main thread drains engines needing transfer |
//! | 4 | `media`          | each medium → `update()`                    |
//! | 5 | `pre_step_iter`  | user pre-step callback per controllable     |
//! | 6 | `sense_control`  | `sense()` then `control_step()`             |
//! | 7 | `post_step_iter` | user post-step callback per controllable    |
//!
//! Phases 1, 2, 4, 5, 6, 7 are dispatched either inline (no workers) or
//! across the worker pool through one of three load-balancing strategies;
//! phase 3 always runs on the main thread because engine-to-engine
//! migration is not thread-safe. Positional indices are rebuilt between
//! physics and media and stay frozen through sense.

mod balance_length;
mod balance_quantity;
mod env;
mod scatter_gather;
mod shared;
mod sync;
mod workers;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

use glam::{DQuat, DVec3};
use krill_geom::Ray3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::control::Controller;
use crate::entity::body::{Body, BodyShape};
use crate::entity::controllable::ControllableEntity;
use crate::entity::{EntityNode, EntityPayload};
use crate::error::{SceneError, SimError, TickError};
use crate::ident::{BodyKey, EntityKey, SimClock};
use crate::lock;
use crate::loopfn::{EntityIterFn, LoopFunctions};
use crate::medium::rab::{RabDevice, RabMedium};
use crate::medium::{LedDevice, LedMedium, Medium};
use crate::phase::Phase;
use crate::physics::PhysicsEngine;
use crate::registry::Registry;
use crate::scene::SceneDoc;

pub use env::{ExcludeSet, PhaseEnv};
use shared::SpaceShared;
use sync::PhaseSync;
use workers::WorkerPool;

/// How phase work is spread across the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Static ceil-chunked contiguous ranges.
    ScatterGather,
    /// Floor/ceil split: shares differ by at most one task.
    BalanceQuantity,
    /// Work stealing through a shared fetch index.
    BalanceLength,
}

/// Threading model of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threading {
    /// All phases run inline on the caller thread.
    SingleThread,
    /// A fixed worker pool dispatches the phases. `workers == 0` degrades
    /// to the inline path.
    Multi {
        /// The load-balancing strategy.
        strategy: Strategy,
        /// Pool size.
        workers: usize,
    },
}

/// Physics sub-step selection (see the scheduler notes): below the
/// threshold forward speed the physics phase runs `k_low` sub-steps per
/// tick, otherwise `k_high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubStepConfig {
    /// Threshold forward speed, metres per second.
    pub v_threshold: f64,
    /// Sub-steps below the threshold.
    pub k_low: u32,
    /// Sub-steps at or above the threshold.
    pub k_high: u32,
}

impl Default for SubStepConfig {
    fn default() -> Self {
        Self {
            v_threshold: 5.0,
            k_low: 3,
            k_high: 1,
        }
    }
}

/// Range-and-bearing device parameters for a robot.
#[derive(Debug, Clone)]
pub struct RabConfig {
    /// Medium id to register with.
    pub medium: String,
    /// Transmission range, metres.
    pub range: f64,
    /// Payload size, bytes.
    pub msg_size: usize,
    /// Mounting offset in the body frame.
    pub offset: DVec3,
}

/// Proximity sensor parameters.
#[derive(Debug, Clone, Copy)]
pub struct ProximityConfig {
    /// Number of evenly spaced rays.
    pub rays: usize,
    /// Ray range, metres.
    pub range: f64,
}

/// One LED on a robot.
#[derive(Debug, Clone)]
pub struct LedConfig {
    /// Mounting offset in the body frame.
    pub offset: DVec3,
    /// Emitted colour.
    pub colour: [u8; 3],
    /// LED medium to register with, if any.
    pub medium: Option<String>,
}

/// Everything needed to spawn one robot.
pub struct RobotConfig {
    /// Robot identifier.
    pub id: String,
    /// Initial position.
    pub position: DVec3,
    /// Initial yaw, radians.
    pub yaw: f64,
    /// Collision volume.
    pub shape: BodyShape,
    /// Differential-drive axle length.
    pub wheel_base: f64,
    /// Whether the body can move.
    pub movable: bool,
    /// The user controller.
    pub controller: Box<dyn Controller>,
    /// Optional range-and-bearing transceiver.
    pub rab: Option<RabConfig>,
    /// Optional proximity sensor.
    pub proximity: Option<ProximityConfig>,
    /// LEDs, in mounting order.
    pub leds: Vec<LedConfig>,
    /// User sensors beyond the built-in devices, by name.
    pub extra_sensors: Vec<(String, Box<dyn crate::control::Sensor>)>,
    /// User actuators beyond the built-in devices, by name.
    pub extra_actuators: Vec<(String, Box<dyn crate::control::Actuator>)>,
}

impl RobotConfig {
    /// A movable cylinder robot with the default footprint and no devices
    /// beyond the wheels.
    #[must_use]
    pub fn new(id: impl Into<String>, position: DVec3, controller: Box<dyn Controller>) -> Self {
        Self {
            id: id.into(),
            position,
            yaw: 0.0,
            shape: BodyShape::Cylinder {
                radius: 0.1,
                height: 0.2,
            },
            wheel_base: 0.14,
            movable: true,
            controller,
            rab: None,
            proximity: None,
            leds: Vec::new(),
            extra_sensors: Vec::new(),
            extra_actuators: Vec::new(),
        }
    }
}

/// Cancels a running space from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    sync: Arc<PhaseSync>,
}

impl ShutdownHandle {
    /// Requests structured shutdown: the current or next phase wait
    /// observes the flag, workers unwind past their checkpoints, and
    /// `update` returns [`TickError::Cancelled`].
    pub fn request_shutdown(&self) {
        self.sync.cancel();
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}

/// The simulated space.
pub struct Space {
    pool: Option<WorkerPool>,
    shared: Arc<SpaceShared>,
    sync: Arc<PhaseSync>,
    loop_fns: Option<Box<dyn LoopFunctions>>,
    substep_config: SubStepConfig,
    seed: u64,
    rng: StdRng,
}

impl Space {
    /// Creates an empty space with a 100 ms tick.
    #[must_use]
    pub fn new(threading: Threading) -> Self {
        Self::with_tick(threading, 0.1)
    }

    /// Creates an empty space with an explicit tick duration.
    #[must_use]
    pub fn with_tick(threading: Threading, tick_seconds: f64) -> Self {
        let shared = Arc::new(SpaceShared::new(tick_seconds, 0.5));
        let (workers, strategy) = match threading {
            Threading::SingleThread => (0, None),
            Threading::Multi { strategy, workers } => (workers, Some(strategy)),
        };
        let sync = Arc::new(PhaseSync::new(workers));
        let pool = match (workers, strategy) {
            (0, _) | (_, None) => None,
            (n, Some(strategy)) => {
                info!(workers = n, ?strategy, "starting worker pool");
                Some(WorkerPool::spawn(&shared, &sync, strategy, n))
            }
        };
        Self {
            pool,
            shared,
            sync,
            loop_fns: None,
            substep_config: SubStepConfig::default(),
            seed: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Builds a space from a scene description.
    ///
    /// Any error aborts initialisation.
    pub fn from_scene(
        doc: &SceneDoc,
        registry: &Registry,
        threading: Threading,
    ) -> Result<Self, SimError> {
        let root = doc.root();
        root.check_known(&["arena", "engines", "media", "robots", "obstacles"])?;
        let arena = root.require_child("arena")?;
        arena.check_known(&["size", "seed", "tick_seconds"])?;
        let tick_seconds: f64 = arena.attribute_or("tick_seconds", 0.1)?;
        let seed: u64 = arena.attribute_or("seed", 0)?;

        let mut space = Self::with_tick(threading, tick_seconds);
        space.reseed(seed);

        for node in root.children("engines") {
            node.check_known(&["id", "type", "iterations", "volume"])?;
            let kind: String = node.attribute("type")?;
            let engine = registry.engine(&kind, &node, tick_seconds)?;
            space.add_engine(engine);
        }
        for node in root.children("media") {
            node.check_known(&["id", "type", "cell_size", "check_occlusions"])?;
            let kind: String = node.attribute("type")?;
            let medium = registry.medium(&kind, &node)?;
            space.add_medium(medium);
        }
        for node in root.children("obstacles") {
            node.check_known(&[
                "id",
                "position",
                "yaw_deg",
                "shape",
                "radius",
                "height",
                "half_extents",
            ])?;
            let id: String = node.attribute("id")?;
            let position: DVec3 = node.attribute("position")?;
            let yaw = node.attribute_or("yaw_deg", 0.0)?.to_radians();
            let shape = parse_shape(&node)?;
            space.add_obstacle(id, position, yaw, shape)?;
        }
        for node in root.children("robots") {
            node.check_known(&[
                "id",
                "controller",
                "position",
                "yaw_deg",
                "body",
                "devices",
                "leds",
            ])?;
            let id: String = node.attribute("id")?;
            let position: DVec3 = node.attribute("position")?;
            let yaw = node.attribute_or("yaw_deg", 0.0)?.to_radians();

            let controller_node = node.require_child("controller")?;
            let kind: String = controller_node.attribute("type")?;
            let mut controller = registry.controller(&kind)?;
            let params = controller_node.child("params").unwrap_or(controller_node);
            controller
                .init(&params)
                .map_err(|source| SimError::ControllerFailure {
                    id: id.clone(),
                    phase: Phase::Act,
                    source,
                })?;

            let mut config = RobotConfig::new(id, position, controller);
            config.yaw = yaw;
            if let Some(body) = node.child("body") {
                body.check_known(&[
                    "shape",
                    "radius",
                    "height",
                    "half_extents",
                    "wheel_base",
                    "movable",
                ])?;
                config.shape = parse_shape(&body)?;
                config.wheel_base = body.attribute_or("wheel_base", config.wheel_base)?;
                config.movable = body.attribute_or("movable", true)?;
            }
            if let Some(devices) = node.child("devices") {
                devices.check_known(&["rab", "proximity"])?;
                if let Some(rab) = devices.child("rab") {
                    rab.check_known(&["medium", "range", "msg_size", "offset"])?;
                    config.rab = Some(RabConfig {
                        medium: rab.attribute("medium")?,
                        range: rab.attribute("range")?,
                        msg_size: rab.attribute_or("msg_size", 8)?,
                        offset: rab.attribute_or("offset", DVec3::new(0.0, 0.0, 0.1))?,
                    });
                }
                if let Some(proximity) = devices.child("proximity") {
                    proximity.check_known(&["rays", "range"])?;
                    config.proximity = Some(ProximityConfig {
                        rays: proximity.attribute_or("rays", 8)?,
                        range: proximity.attribute("range")?,
                    });
                }
            }
            for led in node.children("leds") {
                led.check_known(&["offset", "colour", "medium"])?;
                let medium: String = led.attribute_or("medium", String::new())?;
                config.leds.push(LedConfig {
                    offset: led.attribute_or("offset", DVec3::ZERO)?,
                    colour: led.attribute_or("colour", [255, 0, 0])?,
                    medium: (!medium.is_empty()).then_some(medium),
                });
            }
            space.add_robot(config)?;
        }
        Ok(space)
    }

    /// Reseeds the run; part of the scene, so two runs with equal inputs
    /// replay identically.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// The run seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The run's random stream; every stochastic decision draws from it.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Overrides the physics sub-step selection parameters.
    pub fn set_substep_config(&mut self, config: SubStepConfig) {
        self.substep_config = config;
    }

    /// Installs the experiment loop functions.
    pub fn set_loop_functions(&mut self, hooks: Box<dyn LoopFunctions>) {
        self.loop_fns = Some(hooks);
    }

    /// Installs (or clears) the per-entity iteration callback dispatched as
    /// the pre/post-step iteration phases.
    pub fn set_entity_iter(&mut self, callback: Option<EntityIterFn>) {
        *lock::write(&self.shared.entity_iter) = callback;
    }

    /// A handle that can cancel the run from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sync: Arc::clone(&self.sync),
        }
    }

    /// Adds a physics engine.
    pub fn add_engine(&mut self, engine: Box<dyn PhysicsEngine>) {
        debug!(engine = engine.id(), "adding physics engine");
        lock::write(&self.shared.engines).push(Mutex::new(engine));
        self.shared.engine_epoch.fetch_add(1, Ordering::Release);
    }

    /// Adds a medium.
    pub fn add_medium(&mut self, medium: Box<dyn Medium>) {
        debug!(medium = medium.id(), "adding medium");
        lock::write(&self.shared.media).push(Mutex::new(medium));
        self.shared.media_epoch.fetch_add(1, Ordering::Release);
    }

    /// Adds a static embodied obstacle (no controller, immovable).
    pub fn add_obstacle(
        &mut self,
        id: impl Into<String>,
        position: DVec3,
        yaw: f64,
        shape: BodyShape,
    ) -> Result<EntityKey, SimError> {
        let id = id.into();
        let orientation = DQuat::from_rotation_z(yaw);
        let mut entities = lock::write(&self.shared.world.entities);
        let mut bodies = lock::write(&self.shared.world.bodies);
        let entity = entities.insert(EntityNode::new(id.clone(), "obstacle", EntityPayload::Composite));
        let body_key = bodies.insert(Body::new(entity, shape, position, orientation, false));
        entities.get_mut(entity)?.payload = EntityPayload::Body(body_key);
        self.place_in_engine(&id, body_key, &mut bodies, position)?;
        Ok(entity)
    }

    /// Adds a robot: entity subtree, body, devices, and controllable.
    ///
    /// Fails with [`SimError::UnsimulableEntity`] when no engine accepts
    /// the body at its initial position.
    pub fn add_robot(&mut self, config: RobotConfig) -> Result<EntityKey, SimError> {
        let RobotConfig {
            id,
            position,
            yaw,
            shape,
            wheel_base,
            movable,
            controller,
            rab,
            proximity,
            leds,
            extra_sensors,
            extra_actuators,
        } = config;
        let orientation = DQuat::from_rotation_z(yaw);
        let mut entities = lock::write(&self.shared.world.entities);
        let mut bodies = lock::write(&self.shared.world.bodies);

        let root = entities.insert(EntityNode::new(id.clone(), "robot", EntityPayload::Composite));
        let body_entity = entities.insert(EntityNode::new(
            format!("{id}.body"),
            "body",
            EntityPayload::Composite,
        ));
        let body_key = bodies.insert({
            let mut body = Body::new(body_entity, shape, position, orientation, movable);
            body.wheel_base = wheel_base;
            body
        });
        entities.get_mut(body_entity)?.payload = EntityPayload::Body(body_key);
        entities.add_component(root, body_entity)?;
        self.place_in_engine(&id, body_key, &mut bodies, position)?;

        let mut controllable = ControllableEntity::new(root, body_key, id.clone(), controller);
        controllable.add_actuator(
            "wheels",
            Box::new(crate::devices::DifferentialDriveActuator::new()),
        );

        if let Some(rab_config) = rab {
            let mut rab_map = lock::write(&self.shared.world.rab);
            let device_entity = entities.insert(EntityNode::new(
                format!("{id}.rab"),
                "rab",
                EntityPayload::Composite,
            ));
            let rab_key = rab_map.insert(Mutex::new(RabDevice::new(
                device_entity,
                body_key,
                rab_config.offset,
                rab_config.range,
                rab_config.msg_size,
            )));
            entities.get_mut(device_entity)?.payload = EntityPayload::RabDevice(rab_key);
            entities.add_component(root, device_entity)?;

            let media = lock::read(&self.shared.media);
            let mut registered = false;
            for cell in media.iter() {
                let mut medium = lock::lock(cell);
                if medium.id() != rab_config.medium {
                    continue;
                }
                if let Some(rab_medium) = medium.as_any_mut().downcast_mut::<RabMedium>() {
                    rab_medium.register(rab_key);
                    registered = true;
                }
                break;
            }
            if !registered {
                return Err(SimError::Scene(SceneError::UnknownElement {
                    element: format!("medium `{}`", rab_config.medium),
                }));
            }
            controllable.add_actuator(
                "rab",
                Box::new(crate::devices::RabActuator::new(rab_key, rab_config.msg_size)),
            );
            controllable.add_sensor(
                "rab",
                Box::new(crate::devices::RabSensor::new(rab_config.medium, rab_key)),
            );
        }

        if let Some(proximity_config) = proximity {
            controllable.add_sensor(
                "proximity",
                Box::new(crate::devices::ProximitySensor::new(
                    proximity_config.rays,
                    proximity_config.range,
                )),
            );
        }
        for (name, sensor) in extra_sensors {
            controllable.add_sensor(name, sensor);
        }
        for (name, actuator) in extra_actuators {
            controllable.add_actuator(name, actuator);
        }

        for (i, led_config) in leds.into_iter().enumerate() {
            let mut led_map = lock::write(&self.shared.world.leds);
            let device_entity = entities.insert(EntityNode::new(
                format!("{id}.led{i}"),
                "leds",
                EntityPayload::Composite,
            ));
            let led_key = led_map.insert(Mutex::new(LedDevice::new(
                device_entity,
                body_key,
                led_config.offset,
                led_config.colour,
            )));
            entities.get_mut(device_entity)?.payload = EntityPayload::LedDevice(led_key);
            entities.add_component(root, device_entity)?;
            if let Some(medium_id) = led_config.medium {
                let media = lock::read(&self.shared.media);
                for cell in media.iter() {
                    let mut medium = lock::lock(cell);
                    if medium.id() != medium_id {
                        continue;
                    }
                    if let Some(led_medium) = medium.as_any_mut().downcast_mut::<LedMedium>() {
                        led_medium.register(led_key);
                    }
                    break;
                }
            }
        }

        let mut controllables = lock::write(&self.shared.controllables);
        let index = controllables.len();
        entities.get_mut(root)?.payload = EntityPayload::Controllable(index);
        controllables.push(Mutex::new(controllable));
        self.shared.controllable_epoch.fetch_add(1, Ordering::Release);
        debug!(robot = %id, "robot added");
        Ok(root)
    }

    fn place_in_engine(
        &self,
        id: &str,
        body_key: BodyKey,
        bodies: &mut slotmap::SlotMap<BodyKey, Body>,
        position: DVec3,
    ) -> Result<(), SimError> {
        let engines = lock::read(&self.shared.engines);
        let mut placed = None;
        for cell in engines.iter() {
            let mut engine = lock::lock(cell);
            if engine.is_point_contained(position) && engine.add_entity(body_key, &bodies[body_key])
            {
                placed = Some(engine.id().to_owned());
                break;
            }
        }
        match placed {
            Some(engine_id) => {
                bodies[body_key].bind_engine(&engine_id);
                Ok(())
            }
            None => Err(SimError::UnsimulableEntity {
                id: id.to_owned(),
                x: position.x,
                y: position.y,
                z: position.z,
            }),
        }
    }

    /// Removes a robot previously added with [`Space::add_robot`], marking
    /// the controllable assignment dirty.
    pub fn remove_robot(&mut self, robot: EntityKey) -> Result<(), SimError> {
        let mut entities = lock::write(&self.shared.world.entities);
        let index = match entities.get(robot)?.payload {
            EntityPayload::Controllable(index) => index,
            _ => return Err(SimError::InvalidHandle),
        };
        let mut controllables = lock::write(&self.shared.controllables);
        let mut removed = controllables
            .remove(index)
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        removed.destroy();
        // Later controllables shift down one slot.
        for cell in controllables.iter_mut().skip(index) {
            let controllable = cell.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Ok(node) = entities.get_mut(controllable.entity()) {
                if let EntityPayload::Controllable(i) = node.payload {
                    node.payload = EntityPayload::Controllable(i - 1);
                }
            }
        }
        drop(controllables);

        // Detach the body from its engines and the robot's devices from
        // their media and arenas.
        let body_key = removed.body();
        {
            let engines = lock::read(&self.shared.engines);
            for cell in engines.iter() {
                lock::lock(cell).remove_entity(body_key);
            }
        }
        {
            let mut rab_map = lock::write(&self.shared.world.rab);
            let stale: Vec<_> = rab_map
                .iter()
                .filter(|(_, cell)| lock::lock(cell).body == body_key)
                .map(|(k, _)| k)
                .collect();
            let media = lock::read(&self.shared.media);
            for rab_key in stale {
                for cell in media.iter() {
                    let mut medium = lock::lock(cell);
                    if let Some(rab_medium) = medium.as_any_mut().downcast_mut::<RabMedium>() {
                        rab_medium.unregister(rab_key);
                    }
                }
                rab_map.remove(rab_key);
            }
        }
        {
            let mut led_map = lock::write(&self.shared.world.leds);
            let stale: Vec<_> = led_map
                .iter()
                .filter(|(_, cell)| lock::lock(cell).body == body_key)
                .map(|(k, _)| k)
                .collect();
            let media = lock::read(&self.shared.media);
            for led_key in stale {
                for cell in media.iter() {
                    let mut medium = lock::lock(cell);
                    if let Some(led_medium) = medium.as_any_mut().downcast_mut::<LedMedium>() {
                        led_medium.unregister(led_key);
                    }
                }
                led_map.remove(led_key);
            }
        }
        lock::write(&self.shared.world.bodies).remove(body_key);
        entities.remove_entity(robot);
        self.shared.controllable_epoch.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Advances the simulation by one tick.
    pub fn update(&mut self) -> Result<(), TickError> {
        if self.sync.is_cancelled() {
            return Err(TickError::Cancelled);
        }
        let tick = lock::read(&self.shared.clock).tick;
        self.shared
            .substeps
            .store(self.choose_substeps(), Ordering::Release);

        self.run_phase(Phase::Act, tick)?;
        self.run_phase(Phase::Physics, tick)?;
        self.transfer_entities(tick)?;
        self.rebuild_indices();
        self.update_entity_tree();
        self.run_phase(Phase::Media, tick)?;
        self.with_loop_fns(|hooks, space| hooks.pre_step(space));
        self.run_phase(Phase::PreStepIter, tick)?;
        self.run_phase(Phase::SenseControl, tick)?;
        self.run_phase(Phase::PostStepIter, tick)?;
        self.with_loop_fns(|hooks, space| hooks.post_step(space));

        lock::write(&self.shared.clock).tick += 1;
        Ok(())
    }

    /// Resets the space to tick zero: initial poses, cleared collisions and
    /// readings, reseeded random stream. Calling it twice equals calling it
    /// once.
    pub fn reset(&mut self) {
        {
            let bodies = lock::read(&self.shared.world.bodies);
            for (_, body) in bodies.iter() {
                body.reset_state();
            }
            let engines = lock::read(&self.shared.engines);
            for cell in engines.iter() {
                lock::lock(cell).reset(&bodies);
            }
        }
        {
            let mut controllables = lock::write(&self.shared.controllables);
            for cell in controllables.iter_mut() {
                cell.get_mut().unwrap_or_else(PoisonError::into_inner).reset();
            }
        }
        {
            let media = lock::read(&self.shared.media);
            for cell in media.iter() {
                lock::lock(cell).reset();
            }
        }
        lock::write(&self.shared.clock).tick = 0;
        self.shared.substeps.store(1, Ordering::Release);
        self.rng = StdRng::seed_from_u64(self.seed);
        let _ = self.shared.drain_errors();
        self.rebuild_indices();
        self.update_entity_tree();
        if let Some(mut hooks) = self.loop_fns.take() {
            hooks.reset(self);
            self.loop_fns = Some(hooks);
        }
    }

    /// Routes a ray through every engine and returns the closest embodied
    /// hit not in `exclude`, as `(entity, t)` with `t ∈ (0, 1]`.
    #[must_use]
    pub fn closest_embodied_intersected_by_ray(
        &self,
        ray: &Ray3,
        exclude: &ExcludeSet,
    ) -> Option<(EntityKey, f64)> {
        self.shared
            .with_phase_env(|env| env.closest_intersection(ray, exclude))
    }

    /// Every embodied hit along the ray across all engines, ordered by
    /// increasing `t`.
    #[must_use]
    pub fn all_embodied_intersected_by_ray(
        &self,
        ray: &Ray3,
        exclude: &ExcludeSet,
    ) -> Vec<(EntityKey, f64)> {
        self.shared
            .with_phase_env(|env| env.all_intersections(ray, exclude))
    }

    /// Current tick number.
    #[must_use]
    pub fn tick(&self) -> u64 {
        lock::read(&self.shared.clock).tick
    }

    /// The simulation clock.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        *lock::read(&self.shared.clock)
    }

    /// Number of controllable entities.
    #[must_use]
    pub fn controllable_count(&self) -> usize {
        lock::read(&self.shared.controllables).len()
    }

    /// Finds a root entity by its stable identifier.
    #[must_use]
    pub fn entity_by_id(&self, id: &str) -> Option<EntityKey> {
        let entities = lock::read(&self.shared.world.entities);
        let found = entities
            .iter()
            .find(|(_, node)| node.id == id)
            .map(|(key, _)| key);
        found
    }

    /// Runs `f` against the controllable entity of `robot`.
    pub fn with_controllable<R>(
        &self,
        robot: EntityKey,
        f: impl FnOnce(&ControllableEntity) -> R,
    ) -> Option<R> {
        let entities = lock::read(&self.shared.world.entities);
        let index = match entities.get(robot).ok()?.payload {
            EntityPayload::Controllable(index) => index,
            _ => return None,
        };
        let controllables = lock::read(&self.shared.controllables);
        let guard = lock::lock(controllables.get(index)?);
        Some(f(&guard))
    }

    /// Enables or disables a robot's controllable entity.
    pub fn set_robot_enabled(&mut self, robot: EntityKey, enabled: bool) -> Result<(), SimError> {
        let entities = lock::read(&self.shared.world.entities);
        let index = match entities.get(robot)?.payload {
            EntityPayload::Controllable(index) => index,
            _ => return Err(SimError::InvalidHandle),
        };
        let controllables = lock::read(&self.shared.controllables);
        let cell = controllables.get(index).ok_or(SimError::InvalidHandle)?;
        lock::lock(cell).set_enabled(enabled);
        Ok(())
    }

    /// Teleports an embodied entity, asking every engine holding a model
    /// for it. Returns `true` when the pose is collision-free (and, unless
    /// `check_only`, committed); `false` leaves everything untouched.
    pub fn move_entity_to(
        &mut self,
        entity: EntityKey,
        position: DVec3,
        orientation: DQuat,
        check_only: bool,
    ) -> Result<bool, SimError> {
        let body_key = self.resolve_body(entity).ok_or(SimError::InvalidHandle)?;
        let bodies = lock::read(&self.shared.world.bodies);
        let body = bodies.get(body_key).ok_or(SimError::InvalidHandle)?;
        let engines = lock::read(&self.shared.engines);
        let mut accepted = false;
        for cell in engines.iter() {
            let mut engine = lock::lock(cell);
            if !body.bound_engines().iter().any(|id| id == engine.id()) {
                continue;
            }
            if !engine.move_model(&bodies, body_key, position, orientation, check_only) {
                return Ok(false);
            }
            accepted = true;
        }
        drop(engines);
        drop(bodies);
        if accepted && !check_only {
            self.update_entity_tree();
        }
        Ok(accepted)
    }

    /// Pose of an entity's body (the entity itself, or its `body`
    /// component).
    #[must_use]
    pub fn entity_pose(&self, entity: EntityKey) -> Option<(DVec3, DQuat)> {
        let body_key = self.resolve_body(entity)?;
        let bodies = lock::read(&self.shared.world.bodies);
        let state = lock::read(&bodies.get(body_key)?.state);
        Some((state.position, state.orientation))
    }

    /// Collision flag and cumulative count of an entity's body.
    #[must_use]
    pub fn collision_summary(&self, entity: EntityKey) -> Option<(bool, u32)> {
        let body_key = self.resolve_body(entity)?;
        let bodies = lock::read(&self.shared.world.bodies);
        let state = lock::read(&bodies.get(body_key)?.state);
        Some((state.collision_detected, state.collision_count))
    }

    /// Ids of the engines currently holding a model for the entity's body.
    #[must_use]
    pub fn engines_holding(&self, entity: EntityKey) -> Vec<String> {
        let Some(body_key) = self.resolve_body(entity) else {
            return Vec::new();
        };
        let bodies = lock::read(&self.shared.world.bodies);
        bodies
            .get(body_key)
            .map(|b| b.bound_engines().to_vec())
            .unwrap_or_default()
    }

    fn resolve_body(&self, entity: EntityKey) -> Option<BodyKey> {
        let entities = lock::read(&self.shared.world.entities);
        let node = entities.get(entity).ok()?;
        match node.payload {
            EntityPayload::Body(key) => Some(key),
            _ => {
                let body_entity = node.components.resolve("body").ok()?;
                match entities.get(body_entity).ok()?.payload {
                    EntityPayload::Body(key) => Some(key),
                    _ => None,
                }
            }
        }
    }

    fn choose_substeps(&self) -> u32 {
        let bodies = lock::read(&self.shared.world.bodies);
        let fastest = bodies
            .iter()
            .map(|(_, b)| lock::read(&b.state).linear_velocity.length())
            .fold(0.0_f64, f64::max);
        if fastest < self.substep_config.v_threshold {
            self.substep_config.k_low
        } else {
            self.substep_config.k_high
        }
    }

    fn run_phase(&self, phase: Phase, tick: u64) -> Result<(), TickError> {
        if self.sync.is_cancelled() {
            return Err(TickError::Cancelled);
        }
        if self.pool.is_some() {
            self.sync.start_phase(phase);
            if self.sync.wait_phase_end(phase).is_err() {
                return Err(TickError::Cancelled);
            }
        } else {
            self.shared.with_phase_env(|env| {
                let tasks = SpaceShared::task_count(env, phase);
                for index in 0..tasks {
                    if self.sync.is_cancelled() {
                        break;
                    }
                    self.shared.execute_task(env, phase, index);
                }
            });
        }
        self.surface_phase_errors(phase, tick)
    }

    fn surface_phase_errors(&self, phase: Phase, tick: u64) -> Result<(), TickError> {
        let errors = self.shared.drain_errors();
        if errors.is_empty() {
            return Ok(());
        }
        if errors.iter().all(|e| matches!(e, SimError::Cancelled)) {
            return Err(TickError::Cancelled);
        }
        Err(TickError::PhaseFailed {
            tick,
            phase,
            errors,
        })
    }

    /// Drains engines whose models left their volume and re-homes each via
    /// `is_point_contained` over the current pose. Runs on the main thread
    /// only.
    fn transfer_entities(&self, tick: u64) -> Result<(), TickError> {
        let engines = lock::read(&self.shared.engines);
        let mut moves: Vec<(usize, BodyKey)> = Vec::new();
        for (index, cell) in engines.iter().enumerate() {
            let mut engine = lock::lock(cell);
            if engine.is_entity_transfer_needed() {
                for key in engine.take_transfers() {
                    moves.push((index, key));
                }
            }
        }
        if moves.is_empty() {
            return Ok(());
        }

        let bodies = lock::read(&self.shared.world.bodies);
        let mut rebinds: Vec<(BodyKey, String, String)> = Vec::new();
        let mut errors: Vec<SimError> = Vec::new();
        for (from, key) in moves {
            let Some(body) = bodies.get(key) else {
                errors.push(SimError::InvalidHandle);
                continue;
            };
            let position = lock::read(&body.state).position;
            let from_id = {
                let mut engine = lock::lock(&engines[from]);
                engine.remove_entity(key);
                engine.id().to_owned()
            };
            let mut accepted = None;
            for cell in engines.iter() {
                let mut engine = lock::lock(cell);
                if engine.is_point_contained(position) && engine.add_entity(key, body) {
                    accepted = Some(engine.id().to_owned());
                    break;
                }
            }
            match accepted {
                Some(to_id) => {
                    debug!(from = %from_id, to = %to_id, "entity transfer");
                    rebinds.push((key, from_id, to_id));
                }
                None => {
                    let entities = lock::read(&self.shared.world.entities);
                    let id = entities
                        .get(body.entity)
                        .map(|n| n.id.clone())
                        .unwrap_or_else(|_| "<unknown>".to_owned());
                    errors.push(SimError::UnsimulableEntity {
                        id,
                        x: position.x,
                        y: position.y,
                        z: position.z,
                    });
                }
            }
        }
        drop(bodies);
        {
            let mut bodies = lock::write(&self.shared.world.bodies);
            for (key, from_id, to_id) in rebinds {
                if let Some(body) = bodies.get_mut(key) {
                    body.unbind_engine(&from_id);
                    body.bind_engine(&to_id);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TickError::PhaseFailed {
                tick,
                phase: Phase::EntityTransfer,
                errors,
            })
        }
    }

    /// Cascades the per-entity update through every root entity's subtree
    /// in component insertion order, refreshing device world poses from the
    /// post-physics anchors. Runs between physics and media, so every
    /// enabled anchor a medium or sensor reads reflects the post-phase
    /// pose.
    fn update_entity_tree(&self) {
        let entities = lock::read(&self.shared.world.entities);
        let bodies = lock::read(&self.shared.world.bodies);
        let rab = lock::read(&self.shared.world.rab);
        let leds = lock::read(&self.shared.world.leds);
        for (key, node) in entities.iter() {
            if node.parent.is_none() {
                update_subtree(&entities, &bodies, &rab, &leds, key);
            }
        }
    }

    /// Rebuilds the embodied positional index; runs between physics and
    /// media so media and sense read a frozen index.
    fn rebuild_indices(&self) {
        use crate::index::PositionalIndex;
        let mut index = lock::write(&self.shared.world.embodied_index);
        index.clear();
        let bodies = lock::read(&self.shared.world.bodies);
        for (key, body) in bodies.iter() {
            let bounding_box = lock::write(&body.state).bounding_box(&body.shape);
            index.update_embodied(key, &bounding_box);
        }
    }

    fn with_loop_fns(&mut self, f: impl FnOnce(&mut dyn LoopFunctions, &mut Self)) {
        if let Some(mut hooks) = self.loop_fns.take() {
            f(hooks.as_mut(), self);
            self.loop_fns = Some(hooks);
        }
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        // Join the pool before tearing anything else down.
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
        if let Some(mut hooks) = self.loop_fns.take() {
            hooks.destroy();
        }
        let mut controllables = lock::write(&self.shared.controllables);
        for cell in controllables.iter_mut() {
            cell.get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .destroy();
        }
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("tick", &self.tick())
            .field("controllables", &self.controllable_count())
            .field("threaded", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

fn update_subtree(
    entities: &crate::entity::EntityArena,
    bodies: &slotmap::SlotMap<BodyKey, Body>,
    rab: &slotmap::SlotMap<crate::ident::RabKey, Mutex<RabDevice>>,
    leds: &slotmap::SlotMap<crate::ident::LedKey, Mutex<LedDevice>>,
    key: EntityKey,
) {
    let Ok(node) = entities.get(key) else {
        return;
    };
    if !node.enabled {
        return;
    }
    match node.payload {
        EntityPayload::RabDevice(device_key) => {
            if let Some(cell) = rab.get(device_key) {
                let mut device = lock::lock(cell);
                if let Some(body) = bodies.get(device.body) {
                    device.refresh_pose(&lock::read(&body.state));
                }
            }
        }
        EntityPayload::LedDevice(device_key) => {
            if let Some(cell) = leds.get(device_key) {
                let mut device = lock::lock(cell);
                if let Some(body) = bodies.get(device.body) {
                    device.refresh_pose(&lock::read(&body.state));
                }
            }
        }
        EntityPayload::Composite | EntityPayload::Body(_) | EntityPayload::Controllable(_) => {}
    }
    for (_, child) in node.components.iter() {
        update_subtree(entities, bodies, rab, leds, child);
    }
}

fn parse_shape(node: &crate::scene::SceneNode<'_>) -> Result<BodyShape, SimError> {
    let kind: String = node.attribute("shape")?;
    match kind.as_str() {
        "cylinder" => Ok(BodyShape::Cylinder {
            radius: node.attribute("radius")?,
            height: node.attribute("height")?,
        }),
        "box" => Ok(BodyShape::Box {
            half_extents: node.attribute("half_extents")?,
        }),
        "sphere" => Ok(BodyShape::Sphere {
            radius: node.attribute("radius")?,
        }),
        other => Err(SimError::Scene(SceneError::UnknownElement {
            element: format!("shape `{other}`"),
        })),
    }
}
