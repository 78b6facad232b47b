// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-tick phase sequence.

use std::fmt;

/// One stage of the per-tick pipeline, in execution order.
///
/// Within one tick the phases happen in strict order: every worker completes
/// phase `k` before any worker observes phase `k + 1`'s start. Task order
/// within a single phase is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Enabled controllable entities actuate their control choices.
    Act,
    /// Every physics engine advances its models by one physics tick.
    Physics,
    /// Cross-engine entity migration; always runs on the main thread.
    EntityTransfer,
    /// Every medium recomputes its per-receiver readings.
    Media,
    /// User pre-step callback over enabled controllable entities.
    PreStepIter,
    /// Sensor updates followed by controller steps.
    SenseControl,
    /// User post-step callback over enabled controllable entities.
    PostStepIter,
}

impl Phase {
    /// The phases dispatched to the worker pool, in tick order.
    ///
    /// [`Phase::EntityTransfer`] is absent: engine-to-engine migration is not
    /// thread-safe and runs on the main thread between physics and media.
    pub const WORKER_PHASES: [Self; 6] = [
        Self::Act,
        Self::Physics,
        Self::Media,
        Self::PreStepIter,
        Self::SenseControl,
        Self::PostStepIter,
    ];

    /// Index of the synchronisation gate backing this phase.
    ///
    /// The pre- and post-step iteration phases share one gate, mirroring the
    /// fact that they run the same task list; the tick sequence guarantees
    /// the gate is never armed for both at once.
    pub(crate) fn gate_index(self) -> usize {
        match self {
            Self::Act => 0,
            Self::Physics => 1,
            Self::Media => 2,
            Self::PreStepIter | Self::PostStepIter => 3,
            Self::SenseControl => 4,
            // Never dispatched through a gate; mapped to the spare slot so a
            // stray call cannot alias a real phase.
            Self::EntityTransfer => 5,
        }
    }

    /// Number of synchronisation gates required by [`Phase::gate_index`].
    pub(crate) const GATE_COUNT: usize = 6;
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Act => "act",
            Self::Physics => "physics",
            Self::EntityTransfer => "entity_transfer",
            Self::Media => "media",
            Self::PreStepIter => "pre_step_iter",
            Self::SenseControl => "sense_control",
            Self::PostStepIter => "post_step_iter",
        };
        f.write_str(name)
    }
}
