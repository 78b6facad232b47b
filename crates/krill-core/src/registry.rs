// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Factories for controllers, engines, and media.
//!
//! Built-in element types form a closed set registered by
//! [`Registry::with_builtins`]; user types join through the `register_*`
//! methods at startup, keyed by type-tag string. Resolution of an
//! unregistered tag is an `UnknownElement` scene error.

use krill_geom::Aabb;
use rustc_hash::FxHashMap;

use crate::control::Controller;
use crate::error::{SceneError, SimError};
use crate::medium::{LedMedium, Medium, RabMedium};
use crate::physics::pointmass::PointMassEngine;
use crate::physics::PhysicsEngine;
use crate::scene::SceneNode;

/// Creates a controller instance; `init` is called separately with the
/// controller's parameter node.
pub type ControllerFactory = Box<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// Creates an engine from its scene element and the simulation tick
/// duration.
pub type EngineFactory =
    Box<dyn Fn(&SceneNode<'_>, f64) -> Result<Box<dyn PhysicsEngine>, SimError> + Send + Sync>;

/// Creates a medium from its scene element.
pub type MediumFactory =
    Box<dyn Fn(&SceneNode<'_>) -> Result<Box<dyn Medium>, SimError> + Send + Sync>;

/// The factory registry consulted while building a space from a scene.
#[derive(Default)]
pub struct Registry {
    controllers: FxHashMap<String, ControllerFactory>,
    engines: FxHashMap<String, EngineFactory>,
    media: FxHashMap<String, MediumFactory>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in element type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_controller("nop", || Box::new(crate::builtins::NopController::new()));
        registry.register_controller("constant_drive", || {
            Box::new(crate::builtins::ConstantDriveController::default())
        });
        registry.register_engine("pointmass", |node, sim_tick| {
            let id: String = node.attribute("id")?;
            let iterations: u32 = node.attribute_or("iterations", 10)?;
            let volume = match node.child("volume") {
                None => None,
                Some(v) => Some(Aabb::new(v.attribute("min")?, v.attribute("max")?)),
            };
            Ok(Box::new(PointMassEngine::new(id, sim_tick, iterations, volume)))
        });
        registry.register_medium("range_and_bearing", |node| {
            let id: String = node.attribute("id")?;
            let cell_size: f64 = node.attribute_or("cell_size", 1.0)?;
            let occlusions: bool = node.attribute_or("check_occlusions", true)?;
            Ok(Box::new(RabMedium::new(id, cell_size, occlusions)))
        });
        registry.register_medium("leds", |node| {
            let id: String = node.attribute("id")?;
            let cell_size: f64 = node.attribute_or("cell_size", 0.5)?;
            Ok(Box::new(LedMedium::new(id, cell_size)))
        });
        registry
    }

    /// Registers a controller type.
    pub fn register_controller(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    ) {
        self.controllers.insert(tag.into(), Box::new(factory));
    }

    /// Registers an engine type.
    pub fn register_engine(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&SceneNode<'_>, f64) -> Result<Box<dyn PhysicsEngine>, SimError>
            + Send
            + Sync
            + 'static,
    ) {
        self.engines.insert(tag.into(), Box::new(factory));
    }

    /// Registers a medium type.
    pub fn register_medium(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&SceneNode<'_>) -> Result<Box<dyn Medium>, SimError> + Send + Sync + 'static,
    ) {
        self.media.insert(tag.into(), Box::new(factory));
    }

    /// Creates a controller of the given type.
    pub fn controller(&self, tag: &str) -> Result<Box<dyn Controller>, SimError> {
        self.controllers
            .get(tag)
            .map(|f| f())
            .ok_or_else(|| unknown("controller", tag))
    }

    /// Creates an engine from its scene element.
    pub fn engine(
        &self,
        tag: &str,
        node: &SceneNode<'_>,
        sim_tick: f64,
    ) -> Result<Box<dyn PhysicsEngine>, SimError> {
        let factory = self.engines.get(tag).ok_or_else(|| unknown("engine", tag))?;
        factory(node, sim_tick)
    }

    /// Creates a medium from its scene element.
    pub fn medium(&self, tag: &str, node: &SceneNode<'_>) -> Result<Box<dyn Medium>, SimError> {
        let factory = self.media.get(tag).ok_or_else(|| unknown("medium", tag))?;
        factory(node)
    }
}

fn unknown(kind: &str, tag: &str) -> SimError {
    SimError::Scene(SceneError::UnknownElement {
        element: format!("{kind} `{tag}`"),
    })
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("controllers", &self.controllers.len())
            .field("engines", &self.engines.len())
            .field("media", &self.media.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_and_strangers_do_not() {
        let registry = Registry::with_builtins();
        assert!(registry.controller("nop").is_ok());
        let err = match registry.controller("holographic") {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(
            err,
            SimError::Scene(SceneError::UnknownElement { .. })
        ));
    }
}
