// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The worker pool.
//!
//! A fixed set of OS threads, created when the space is built and joined
//! before the barrier state is dropped. Workers loop over the gated phases
//! in tick order; the active strategy decides which task indices each
//! worker runs. Cancellation checkpoints sit at every phase wait and after
//! every task.

use std::ops::Range;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::phase::Phase;

use super::shared::SpaceShared;
use super::sync::PhaseSync;
use super::{balance_quantity, scatter_gather, Strategy};

/// Cached contiguous assignments for the ranged strategies, tagged with the
/// epoch they were computed at.
#[derive(Debug, Default)]
struct AssignmentCache {
    controllables: Option<(u64, Range<usize>)>,
    engines: Option<(u64, Range<usize>)>,
    media: Option<(u64, Range<usize>)>,
}

impl AssignmentCache {
    fn range_for(
        &mut self,
        strategy: Strategy,
        phase: Phase,
        shared: &SpaceShared,
        worker: usize,
        workers: usize,
        tasks: usize,
    ) -> Range<usize> {
        let (slot, epoch) = match phase {
            Phase::Act | Phase::SenseControl | Phase::PreStepIter | Phase::PostStepIter => (
                &mut self.controllables,
                shared.controllable_epoch.load(Ordering::Acquire),
            ),
            Phase::Physics => (&mut self.engines, shared.engine_epoch.load(Ordering::Acquire)),
            Phase::Media => (&mut self.media, shared.media_epoch.load(Ordering::Acquire)),
            Phase::EntityTransfer => return 0..0,
        };
        if let Some((cached_epoch, range)) = slot {
            if *cached_epoch == epoch {
                return range.clone();
            }
        }
        let range = match strategy {
            Strategy::ScatterGather => scatter_gather::assignment(worker, workers, tasks),
            Strategy::BalanceQuantity => balance_quantity::assignment(worker, workers, tasks),
            Strategy::BalanceLength => 0..0,
        };
        *slot = Some((epoch, range.clone()));
        range
    }
}

/// The pool itself. Dropping it cancels and joins every worker; joining is
/// mandatory before the sync state can go away.
pub(crate) struct WorkerPool {
    sync: Arc<PhaseSync>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads running the gated-phase loop.
    pub(crate) fn spawn(
        shared: &Arc<SpaceShared>,
        sync: &Arc<PhaseSync>,
        strategy: Strategy,
        workers: usize,
    ) -> Self {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let shared = Arc::clone(shared);
            let worker_sync = Arc::clone(sync);
            let builder = std::thread::Builder::new().name(format!("krill-worker-{worker}"));
            match builder.spawn(move || worker_main(&shared, &worker_sync, strategy, worker, workers)) {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // A short pool still makes progress; the barrier
                    // protocol only counts spawned workers if we cancel
                    // instead of limping, so treat spawn failure as fatal
                    // for the pool.
                    warn!(%error, "failed to spawn worker thread, cancelling pool");
                    sync.cancel();
                }
            }
        }
        Self {
            sync: Arc::clone(sync),
            handles,
        }
    }

    /// Requests cancellation and joins every worker.
    pub(crate) fn shutdown(&mut self) {
        self.sync.cancel();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(
    shared: &SpaceShared,
    sync: &PhaseSync,
    strategy: Strategy,
    worker: usize,
    workers: usize,
) {
    debug!(worker, ?strategy, "worker online");
    let mut cache = AssignmentCache::default();
    'ticks: loop {
        for phase in Phase::WORKER_PHASES {
            if sync.wait_phase_start(phase).is_err() {
                break 'ticks;
            }
            run_worker_phase(shared, sync, strategy, &mut cache, worker, workers, phase);
            if sync.is_cancelled() {
                break 'ticks;
            }
            sync.signal_phase_done(phase);
        }
    }
    debug!(worker, "worker exiting");
}

fn run_worker_phase(
    shared: &SpaceShared,
    sync: &PhaseSync,
    strategy: Strategy,
    cache: &mut AssignmentCache,
    worker: usize,
    workers: usize,
    phase: Phase,
) {
    shared.with_phase_env(|env| {
        let tasks = SpaceShared::task_count(env, phase);
        match strategy {
            Strategy::ScatterGather | Strategy::BalanceQuantity => {
                let range = cache.range_for(strategy, phase, shared, worker, workers, tasks);
                for index in range {
                    if sync.is_cancelled() {
                        return;
                    }
                    shared.execute_task(env, phase, index);
                }
            }
            Strategy::BalanceLength => {
                while let Some(index) = sync.next_task(tasks) {
                    shared.execute_task(env, phase, index);
                }
            }
        }
    });
}
