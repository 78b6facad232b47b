// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Phase gates: the mutex + condition-variable barrier protocol.
//!
//! Each gated phase owns a done-counter and a condition. The counter equal
//! to the worker count means "phase not running"; the main thread starts a
//! phase by zeroing the counter under the gate mutex and broadcasting, and
//! a worker reports completion by incrementing the counter and
//! broadcasting. The counter reaching the worker count both releases the
//! main thread and re-arms the gate for the next tick.
//!
//! Cancellation is cooperative: a shared flag checked at every wait and
//! after every task, set by [`PhaseSync::cancel`] together with a broadcast
//! on every gate so that no thread stays parked. Guard drops release any
//! held mutex on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::SimError;
use crate::lock;
use crate::phase::Phase;

use super::balance_length::FetchIndex;

struct PhaseGate {
    done: Mutex<usize>,
    cond: Condvar,
}

/// Synchronisation state shared by the main thread and the worker pool.
pub(crate) struct PhaseSync {
    gates: Vec<PhaseGate>,
    fetch: FetchIndex,
    cancel: AtomicBool,
    workers: usize,
}

impl PhaseSync {
    /// Creates gate state for `workers` pool threads. Counters start at the
    /// worker count: no phase is running.
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            gates: (0..Phase::GATE_COUNT)
                .map(|_| PhaseGate {
                    done: Mutex::new(workers),
                    cond: Condvar::new(),
                })
                .collect(),
            fetch: FetchIndex::new(),
            cancel: AtomicBool::new(false),
            workers,
        }
    }

    /// Whether shutdown has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Requests structured shutdown: sets the flag and wakes every waiter.
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        for gate in &self.gates {
            let _guard = lock::lock(&gate.done);
            gate.cond.notify_all();
        }
    }

    /// Main thread: arms `phase` and releases the workers. The fetch index
    /// is reset under the gate mutex so no worker can observe a stale
    /// value from the previous phase.
    pub(crate) fn start_phase(&self, phase: Phase) {
        let gate = &self.gates[phase.gate_index()];
        let mut done = lock::lock(&gate.done);
        *done = 0;
        self.fetch.reset();
        gate.cond.notify_all();
    }

    /// Main thread: blocks until every worker has reported `phase` done,
    /// or shutdown is requested.
    pub(crate) fn wait_phase_end(&self, phase: Phase) -> Result<(), SimError> {
        let gate = &self.gates[phase.gate_index()];
        let mut done = lock::lock(&gate.done);
        while *done < self.workers {
            if self.is_cancelled() {
                return Err(SimError::Cancelled);
            }
            done = lock::wait(&gate.cond, done);
        }
        Ok(())
    }

    /// Worker: blocks until the main thread arms `phase`, or shutdown is
    /// requested.
    pub(crate) fn wait_phase_start(&self, phase: Phase) -> Result<(), SimError> {
        let gate = &self.gates[phase.gate_index()];
        let mut done = lock::lock(&gate.done);
        while *done == self.workers {
            if self.is_cancelled() {
                return Err(SimError::Cancelled);
            }
            done = lock::wait(&gate.cond, done);
        }
        drop(done);
        if self.is_cancelled() {
            return Err(SimError::Cancelled);
        }
        Ok(())
    }

    /// Worker: reports `phase` complete. The broadcast happens once per
    /// worker, when it runs out of tasks — not once per task.
    pub(crate) fn signal_phase_done(&self, phase: Phase) {
        let gate = &self.gates[phase.gate_index()];
        let mut done = lock::lock(&gate.done);
        *done += 1;
        gate.cond.notify_all();
    }

    /// Worker (balance-length): claims the next task index under the fetch
    /// mutex; `None` when the phase's task list is exhausted or shutdown
    /// was requested.
    pub(crate) fn next_task(&self, total: usize) -> Option<usize> {
        if self.is_cancelled() {
            return None;
        }
        self.fetch.next(total)
    }
}

impl std::fmt::Debug for PhaseSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSync")
            .field("workers", &self.workers)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
