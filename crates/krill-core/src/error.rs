// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error kinds for scene loading, entity queries, and tick execution.
//!
//! Every error has a stable textual kind plus a context chain. Errors raised
//! inside a phase task are collected and bubble up to the main thread after
//! the phase barrier closes; the only kind that unwinds without reporting is
//! [`SimError::Cancelled`].

use thiserror::Error;

use crate::phase::Phase;

/// Boxed error type carried by user-provided controllers, media, and engines.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Scene-description errors; any of these aborts initialisation.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The document is not well-formed, or an attribute has the wrong type.
    #[error("parse error in `{element}`: {detail}")]
    Parse {
        /// Element being read when the error occurred.
        element: String,
        /// Human-readable description of the mismatch.
        detail: String,
    },
    /// A required attribute is absent.
    #[error("missing required attribute `{attribute}` in `{element}`")]
    MissingAttribute {
        /// Element being read.
        element: String,
        /// Name of the absent attribute.
        attribute: String,
    },
    /// An element is not recognised by any registered factory or schema.
    #[error("unknown element `{element}`")]
    UnknownElement {
        /// Offending element name.
        element: String,
    },
    /// The scene file could not be read.
    #[error("cannot read scene file")]
    Io(#[from] std::io::Error),
}

/// Entity-tree component lookup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentError {
    /// No child with the queried tag exists.
    #[error("no component `{query}` found")]
    NotFound {
        /// The query as given.
        query: String,
    },
    /// A bare tag matched more than one child; an index is required.
    #[error("component `{tag}` is ambiguous: {count} matching children, index required")]
    AmbiguousLookup {
        /// The bare tag.
        tag: String,
        /// How many children carry it.
        count: usize,
    },
    /// The bracketed index is past the end of the matching children.
    #[error("index {index} out of bounds for component `{tag}` (count {count})")]
    IndexOutOfBounds {
        /// The bare tag.
        tag: String,
        /// The requested index.
        index: usize,
        /// How many children carry the tag.
        count: usize,
    },
    /// The query string is malformed (`[` without `]`, `]` before `[`,
    /// non-numeric index, trailing characters).
    #[error("syntax error in component query `{query}`")]
    SyntaxError {
        /// The query as given.
        query: String,
    },
}

/// Simulation-time errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// No physics engine accepted an entity after a transfer attempt.
    #[error("no physics engine accepts entity `{id}` at ({x:.3}, {y:.3}, {z:.3})")]
    UnsimulableEntity {
        /// Entity identifier.
        id: String,
        /// Position the engines were asked about.
        x: f64,
        /// Position the engines were asked about.
        y: f64,
        /// Position the engines were asked about.
        z: f64,
    },
    /// A stored key refers to an entity that has been removed.
    #[error("stale handle: the referenced entity no longer exists")]
    InvalidHandle,
    /// Structured shutdown was requested.
    #[error("simulation cancelled")]
    Cancelled,
    /// A user controller (or one of its devices) raised during a phase.
    #[error("controller `{id}` failed during {phase}")]
    ControllerFailure {
        /// Controllable entity identifier.
        id: String,
        /// Phase the failure occurred in.
        phase: Phase,
        /// Underlying cause.
        #[source]
        source: BoxedError,
    },
    /// A medium raised during the media phase.
    #[error("medium `{id}` failed")]
    MediumFailure {
        /// Medium identifier.
        id: String,
        /// Underlying cause.
        #[source]
        source: BoxedError,
    },
    /// A physics engine raised during the physics phase.
    #[error("engine `{id}` failed")]
    EngineFailure {
        /// Engine identifier.
        id: String,
        /// Underlying cause.
        #[source]
        source: BoxedError,
    },
    /// An entity-tree lookup failed.
    #[error(transparent)]
    Component(#[from] ComponentError),
    /// Scene loading or element construction failed.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Outcome of a failed tick: either cancellation, or an aborted phase with
/// every partial task error attached.
#[derive(Debug, Error)]
pub enum TickError {
    /// Structured shutdown; unwinds without further reporting.
    #[error("simulation cancelled")]
    Cancelled,
    /// One or more tasks failed; the tick was aborted after the phase barrier
    /// closed.
    #[error("tick {tick} aborted during {phase} with {n} task error(s)", n = .errors.len())]
    PhaseFailed {
        /// Tick number that was aborted.
        tick: u64,
        /// Phase whose barrier surfaced the errors.
        phase: Phase,
        /// Every task error collected for the phase; never empty.
        errors: Vec<SimError>,
    },
}

impl TickError {
    /// Returns `true` for the silent cancellation outcome.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
