//! Per-advance metrics for the scheduler.
//!
//! [`AdvanceMetrics`] captures the work done by a single
//! [`advance_in_time`](crate::TimeManager::advance_in_time) call.

/// Counters collected during one advance to a synchronization point.
///
/// Durations are in microseconds. Per-cluster vectors are indexed by
/// local cluster id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvanceMetrics {
    /// Wall-clock time of the whole advance, in microseconds.
    pub total_us: u64,
    /// Scheduler loop iterations.
    pub iterations: u64,
    /// Completed prediction steps (copy and interior counted separately).
    pub predictions: u64,
    /// Completed correction steps (copy and interior counted separately).
    pub corrections: u64,
    /// Copy-queue polls that found the step not yet ready.
    pub incomplete_polls: u64,
    /// Messages posted for sending.
    pub messages_sent: u64,
    /// Messages received and scattered into ghost layers.
    pub messages_received: u64,
    /// Receiver samples recorded.
    pub receiver_samples: u64,
    /// Full updates performed by each local cluster.
    pub full_updates: Vec<u64>,
}

impl AdvanceMetrics {
    pub(crate) fn new(clusters: usize) -> Self {
        Self {
            full_updates: vec![0; clusters],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = AdvanceMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.iterations, 0);
        assert!(m.full_updates.is_empty());
    }

    #[test]
    fn new_sizes_per_cluster_counters() {
        let m = AdvanceMetrics::new(3);
        assert_eq!(m.full_updates, vec![0, 0, 0]);
        assert_eq!(m.messages_sent, 0);
    }
}
