// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Named reference frames carried by embodied entities.

use glam::{DQuat, DVec3};

/// A named pose attached to an embodied entity.
///
/// Anchors are the coordinate source for sensors and actuators. During a
/// tick, exactly one physics model writes a body's anchors; everybody else
/// reads. After a phase completes, all enabled anchors reflect the
/// post-phase pose.
#[derive(Debug, Clone)]
pub struct Anchor {
    /// Anchor name (`origin`, `body`, `end_effector`, ...).
    pub id: String,
    /// World-space position.
    pub position: DVec3,
    /// World-space orientation (unit quaternion).
    pub orientation: DQuat,
    /// Disabled anchors are not updated and must not be read.
    pub enabled: bool,
}

/// The anchor frames of one body. Index 0 is always `origin`.
#[derive(Debug, Clone)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
}

impl AnchorSet {
    /// Creates a set holding only the `origin` anchor at the given pose.
    #[must_use]
    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self {
            anchors: vec![Anchor {
                id: "origin".to_owned(),
                position,
                orientation,
                enabled: true,
            }],
        }
    }

    /// Registers an additional named anchor, initially coincident with the
    /// origin, and returns its index.
    pub fn register(&mut self, id: impl Into<String>) -> usize {
        let origin = &self.anchors[0];
        let anchor = Anchor {
            id: id.into(),
            position: origin.position,
            orientation: origin.orientation,
            enabled: true,
        };
        self.anchors.push(anchor);
        self.anchors.len() - 1
    }

    /// Index of the anchor named `id`.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.anchors.iter().position(|a| a.id == id)
    }

    /// Borrows an anchor by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Anchor> {
        self.anchors.get(index)
    }

    /// Mutably borrows an anchor by index.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Anchor> {
        self.anchors.get_mut(index)
    }

    /// The `origin` anchor.
    #[must_use]
    pub fn origin(&self) -> &Anchor {
        &self.anchors[0]
    }

    /// The `origin` anchor, mutably.
    pub fn origin_mut(&mut self) -> &mut Anchor {
        &mut self.anchors[0]
    }

    /// Iterates all anchors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    /// Number of anchors, the origin included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Always `false`: a set at minimum carries its origin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
