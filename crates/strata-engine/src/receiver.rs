//! Point receivers sampled at a fixed interval.
//!
//! Each cluster owns the receivers located in its cells. Sampling points
//! are `t0, t0 + s, t0 + 2s, ...` where `t0` is the initial time and `s`
//! the sampling interval; every point falling inside a prediction
//! interval `[start, start + dt)` is sampled once, when that prediction
//! completes.

use indexmap::IndexMap;
use strata_core::{CellId, Real, ReceiverId};

/// One recorded sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Sampling time.
    pub time: Real,
    /// Values returned by the kernels.
    pub values: Vec<Real>,
}

/// A receiver and everything it recorded so far.
#[derive(Clone, Debug, PartialEq)]
pub struct Receiver {
    /// Receiver id.
    pub id: ReceiverId,
    /// Mesh id the receiver was registered with.
    pub mesh_id: usize,
    /// Cell containing the receiver.
    pub cell: CellId,
    /// Samples in time order.
    pub samples: Vec<Sample>,
}

/// Receivers of one cluster.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClusterReceivers {
    receivers: IndexMap<ReceiverId, Receiver>,
    sampling: Option<Real>,
    /// Next sampling point.
    next_time: Real,
}

impl ClusterReceivers {
    pub fn insert(&mut self, receiver: Receiver) -> bool {
        if self.receivers.contains_key(&receiver.id) {
            return false;
        }
        self.receivers.insert(receiver.id, receiver);
        true
    }

    pub fn set_sampling(&mut self, interval: Real) {
        self.sampling = Some(interval);
    }

    pub fn set_time(&mut self, time: Real) {
        self.next_time = time;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Receiver> {
        self.receivers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Receiver> {
        self.receivers.values_mut()
    }

    /// Sampling points in `[next_time, end)`, advancing `next_time` past
    /// them. Points within `tolerance` of `end` belong to the next
    /// interval.
    pub fn take_due(&mut self, end: Real, tolerance: Real) -> Vec<Real> {
        let Some(interval) = self.sampling else {
            return Vec::new();
        };
        let mut due = Vec::new();
        while self.next_time < end - tolerance {
            due.push(self.next_time);
            self.next_time += interval;
        }
        if self.receivers.is_empty() {
            due.clear();
        }
        due
    }
}
