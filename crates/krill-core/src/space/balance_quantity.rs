// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Balance-quantity strategy: floor/ceil split.
//!
//! The first `tasks mod workers` workers own `floor(tasks / workers) + 1`
//! tasks, the rest own `floor(tasks / workers)`; the largest and smallest
//! shares differ by at most one task.

use std::ops::Range;

/// The contiguous index range worker `worker` owns out of `tasks` tasks.
pub(crate) fn assignment(worker: usize, workers: usize, tasks: usize) -> Range<usize> {
    debug_assert!(worker < workers);
    let base = tasks / workers;
    let extra = tasks % workers;
    if worker < extra {
        let start = worker * (base + 1);
        start..start + base + 1
    } else {
        let start = extra * (base + 1) + (worker - extra) * base;
        start..start + base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_task_is_owned_exactly_once() {
        for workers in 1..8 {
            for tasks in 0..40 {
                let mut owned = Vec::new();
                for w in 0..workers {
                    owned.extend(assignment(w, workers, tasks));
                }
                assert_eq!(owned, (0..tasks).collect::<Vec<_>>(), "w={workers} t={tasks}");
            }
        }
    }

    #[test]
    fn share_sizes_differ_by_at_most_one() {
        for workers in 1..8 {
            for tasks in 0..40 {
                let sizes: Vec<usize> =
                    (0..workers).map(|w| assignment(w, workers, tasks).len()).collect();
                let max = sizes.iter().copied().max().unwrap_or(0);
                let min = sizes.iter().copied().min().unwrap_or(0);
                assert!(max - min <= 1, "w={workers} t={tasks} sizes={sizes:?}");
            }
        }
    }

    #[test]
    fn remainder_goes_to_the_first_workers() {
        assert_eq!(assignment(0, 4, 10).len(), 3);
        assert_eq!(assignment(1, 4, 10).len(), 3);
        assert_eq!(assignment(2, 4, 10).len(), 2);
        assert_eq!(assignment(3, 4, 10).len(), 2);
    }
}
