// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Balance-length strategy: work stealing by fetch index.
//!
//! A single shared task index starts at zero at every phase start and is
//! incremented under the fetch mutex; each worker pulls the next index
//! until the phase's task list is exhausted. Wall-clock approaches the
//! optimum when per-task cost is highly variable.

use std::sync::Mutex;

use crate::lock;

/// The shared fetch index guarded by the fetch mutex.
pub(crate) struct FetchIndex {
    next: Mutex<usize>,
}

impl FetchIndex {
    /// Creates an index at zero.
    pub(crate) fn new() -> Self {
        Self {
            next: Mutex::new(0),
        }
    }

    /// Zeroes the index; called at every phase start.
    pub(crate) fn reset(&self) {
        *lock::lock(&self.next) = 0;
    }

    /// Claims the next index, or `None` once `total` tasks were handed out.
    pub(crate) fn next(&self, total: usize) -> Option<usize> {
        let mut next = lock::lock(&self.next);
        if *next < total {
            let claimed = *next;
            *next += 1;
            Some(claimed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn indices_are_handed_out_once_and_in_order() {
        let index = FetchIndex::new();
        let claimed: Vec<usize> = std::iter::from_fn(|| index.next(5)).collect();
        assert_eq!(claimed, [0, 1, 2, 3, 4]);
        assert_eq!(index.next(5), None);
    }

    #[test]
    fn reset_rewinds_between_phases() {
        let index = FetchIndex::new();
        while index.next(3).is_some() {}
        index.reset();
        assert_eq!(index.next(3), Some(0));
    }

    #[test]
    fn concurrent_claims_cover_the_range_without_duplicates() {
        let index = Arc::new(FetchIndex::new());
        let total = 1000;
        let mut handles = Vec::new();
        for _ in 0..4 {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                let mut mine = Vec::new();
                while let Some(i) = index.next(total) {
                    mine.push(i);
                }
                mine
            }));
        }
        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..total).collect::<Vec<_>>());
    }
}
