//! Work queues of the scheduler.
//!
//! Interior work goes through two max-heaps keyed by global cluster id, so
//! the finest eligible cluster is serviced first. Copy-layer work goes
//! through two FIFO lists that are scanned every iteration; an item stays
//! in its list until its step reports completion.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use strata_core::{ClusterId, GlobalClusterId};

/// Queue entry naming a cluster by both ids.
///
/// Ordered by global id only; the local id is carried along so the
/// scheduler can index its cluster registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Queued {
    /// Global cluster id, the priority.
    pub global: GlobalClusterId,
    /// Local cluster id.
    pub local: ClusterId,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.global
            .cmp(&other.global)
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The four queues.
#[derive(Debug, Default)]
pub(crate) struct Queues {
    pub local_copy: VecDeque<ClusterId>,
    pub neighboring_copy: VecDeque<ClusterId>,
    pub local_interior: BinaryHeap<Queued>,
    pub neighboring_interior: BinaryHeap<Queued>,
}

impl Queues {
    pub fn is_empty(&self) -> bool {
        self.local_copy.is_empty()
            && self.neighboring_copy.is_empty()
            && self.local_interior.is_empty()
            && self.neighboring_interior.is_empty()
    }

    pub fn clear(&mut self) {
        self.local_copy.clear();
        self.neighboring_copy.clear();
        self.local_interior.clear();
        self.neighboring_interior.clear();
    }

    pub fn lens(&self) -> [usize; 4] {
        [
            self.local_copy.len(),
            self.neighboring_copy.len(),
            self.local_interior.len(),
            self.neighboring_interior.len(),
        ]
    }
}
