// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scatter-gather strategy: static contiguous chunking.
//!
//! Each worker owns `ceil(tasks / workers)` contiguous indices; the last
//! worker may own fewer (or none). Assignments are recomputed only when the
//! relevant assignment epoch changes — a controllable was added or removed,
//! or, for the physics task list, an engine was.

use std::ops::Range;

/// The contiguous index range worker `worker` owns out of `tasks` tasks.
pub(crate) fn assignment(worker: usize, workers: usize, tasks: usize) -> Range<usize> {
    debug_assert!(worker < workers);
    let chunk = tasks.div_ceil(workers);
    let start = (worker * chunk).min(tasks);
    let end = (start + chunk).min(tasks);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cover(workers: usize, tasks: usize) -> Vec<usize> {
        let mut owned = Vec::new();
        for w in 0..workers {
            owned.extend(assignment(w, workers, tasks));
        }
        owned
    }

    #[test]
    fn every_task_is_owned_exactly_once() {
        for workers in 1..8 {
            for tasks in 0..40 {
                let owned = cover(workers, tasks);
                assert_eq!(owned, (0..tasks).collect::<Vec<_>>(), "w={workers} t={tasks}");
            }
        }
    }

    #[test]
    fn chunks_are_ceil_sized_and_contiguous() {
        assert_eq!(assignment(0, 4, 10), 0..3);
        assert_eq!(assignment(1, 4, 10), 3..6);
        assert_eq!(assignment(2, 4, 10), 6..9);
        assert_eq!(assignment(3, 4, 10), 9..10);
    }

    #[test]
    fn surplus_workers_get_empty_ranges() {
        assert_eq!(assignment(3, 4, 2), 2..2);
        assert!(assignment(3, 4, 2).is_empty());
    }
}
