//! Per-cluster state and the four step operations.
//!
//! A [`TimeCluster`] owns the scalar state of one local cluster: its
//! times, its position inside the coarser neighbour's interval, the four
//! in-flight flags and the requests it has outstanding. The memory it
//! operates on belongs to the [`MemoryLayout`]; every step borrows it
//! through a [`StepEnv`].

use smallvec::SmallVec;
use strata_arena::{Layer, LayoutError, MemoryLayout};
use strata_core::{ClusterId, GlobalClusterId, MessageKey, RankId, Real};
use tracing::trace;

use crate::comm::{Comm, Outstanding};
use crate::kernel::{Kernels, LocalStep, NeighboringStep, ReceiverView, StepInfo};
use crate::metrics::AdvanceMetrics;
use crate::receiver::{ClusterReceivers, Receiver, Sample};
use crate::source::{ClusterSources, LocatedSource};
use crate::scheduler::SchedulerError;

/// Which steps of a cluster are queued and not yet complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InFlight {
    /// Prediction of the interior layer.
    pub local_interior: bool,
    /// Prediction of the copy layer.
    pub local_copy: bool,
    /// Correction of the interior layer.
    pub neighboring_interior: bool,
    /// Correction of the copy layer.
    pub neighboring_copy: bool,
}

impl InFlight {
    /// Whether a prediction is queued or running.
    pub fn predicting(&self) -> bool {
        self.local_interior || self.local_copy
    }

    /// Whether a correction is queued or running.
    pub fn correcting(&self) -> bool {
        self.neighboring_interior || self.neighboring_copy
    }
}

/// Everything a step borrows from the scheduler besides the cluster.
pub(crate) struct StepEnv<'a> {
    pub layout: &'a mut MemoryLayout,
    pub kernels: &'a dyn Kernels,
    pub comm: &'a mut Comm,
    pub rank: RankId,
    pub tolerance: Real,
    pub metrics: &'a mut AdvanceMetrics,
}

/// Scalar state of one local time cluster.
#[derive(Debug)]
pub struct TimeCluster {
    id: ClusterId,
    global: GlobalClusterId,
    rate: u64,
    cfl_width: Real,
    prediction_time: Real,
    full_update_time: Real,
    sub_time_start: Real,
    time_step_width: Real,
    number_of_full_updates: u64,
    flags: InFlight,
    reset_lts_buffers: bool,
    send_lts_buffers: bool,
    dynamic_rupture: bool,
    comm: Outstanding,
    receivers: ClusterReceivers,
    sources: ClusterSources,
}

impl TimeCluster {
    pub(crate) fn new(id: ClusterId, global: GlobalClusterId, rate: u64, cfl_width: Real) -> Self {
        Self {
            id,
            global,
            rate,
            cfl_width,
            prediction_time: 0.0,
            full_update_time: 0.0,
            sub_time_start: 0.0,
            time_step_width: 0.0,
            number_of_full_updates: 0,
            flags: InFlight::default(),
            reset_lts_buffers: true,
            send_lts_buffers: false,
            dynamic_rupture: false,
            comm: Outstanding::default(),
            receivers: ClusterReceivers::default(),
            sources: ClusterSources::default(),
        }
    }

    /// Local id.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Global id.
    pub fn global(&self) -> GlobalClusterId {
        self.global
    }

    /// Ratio of the coarser neighbour's width to this cluster's.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Maximum width allowed by the CFL condition.
    pub fn cfl_width(&self) -> Real {
        self.cfl_width
    }

    /// End of the latest completed prediction.
    pub fn prediction_time(&self) -> Real {
        self.prediction_time
    }

    /// End of the latest completed correction.
    pub fn full_update_time(&self) -> Real {
        self.full_update_time
    }

    /// Offset of the current step within the coarser neighbour's interval.
    pub fn sub_time_start(&self) -> Real {
        self.sub_time_start
    }

    /// Width of the current step.
    pub fn time_step_width(&self) -> Real {
        self.time_step_width
    }

    /// Full updates since the last synchronization point.
    pub fn number_of_full_updates(&self) -> u64 {
        self.number_of_full_updates
    }

    /// In-flight flags.
    pub fn in_flight(&self) -> InFlight {
        self.flags
    }

    /// The current prediction restarts buffer accumulation.
    pub fn reset_lts_buffers(&self) -> bool {
        self.reset_lts_buffers
    }

    /// The current prediction closes a coarser-neighbour interval.
    pub fn send_lts_buffers(&self) -> bool {
        self.send_lts_buffers
    }

    /// Whether dynamic rupture is enabled.
    pub fn dynamic_rupture(&self) -> bool {
        self.dynamic_rupture
    }

    /// Receivers located in this cluster.
    pub fn receivers(&self) -> impl Iterator<Item = &Receiver> {
        self.receivers.iter()
    }

    /// Point sources located in this cluster.
    pub fn point_sources(&self) -> impl Iterator<Item = &LocatedSource> {
        self.sources.iter()
    }

    /// Scalar parameters handed to the kernels for `layer`.
    pub fn step_info(&self, layer: Layer) -> StepInfo {
        StepInfo {
            cluster: self.id,
            global: self.global,
            layer,
            start_time: self.full_update_time,
            time_step_width: self.time_step_width,
            sub_time_start: self.sub_time_start,
            reset_lts_buffers: self.reset_lts_buffers,
            send_lts_buffers: self.send_lts_buffers,
            dynamic_rupture: self.dynamic_rupture,
        }
    }

    // ── Scheduler-facing state changes ──────────────────────────────

    pub(crate) fn receivers_mut(&mut self) -> &mut ClusterReceivers {
        &mut self.receivers
    }

    pub(crate) fn set_point_sources(&mut self, sources: ClusterSources) {
        self.sources = sources;
    }

    pub(crate) fn enable_dynamic_rupture(&mut self) {
        self.dynamic_rupture = true;
    }

    pub(crate) fn comm_parts(&mut self) -> (ClusterId, &mut Outstanding) {
        (self.id, &mut self.comm)
    }

    pub(crate) fn has_outstanding_requests(&self) -> bool {
        !self.comm.sends.is_empty() || !self.comm.receives.is_empty()
    }

    pub(crate) fn set_time(&mut self, time: Real) {
        self.prediction_time = time;
        self.full_update_time = time;
        self.receivers.set_time(time);
    }

    /// Reset the per-interval state at the start of an advance.
    pub(crate) fn reset_for_advance(&mut self) {
        self.flags = InFlight::default();
        self.reset_lts_buffers = true;
        self.time_step_width = 0.0;
        self.sub_time_start = 0.0;
        self.number_of_full_updates = 0;
    }

    /// Mark a prediction as queued and derive its parameters.
    pub(crate) fn enqueue_prediction(&mut self, sync_time: Real, tolerance: Real) {
        self.flags.local_copy = true;
        self.flags.local_interior = true;

        self.time_step_width = self.cfl_width.min(sync_time - self.full_update_time);
        if self.number_of_full_updates % self.rate == 0 {
            self.reset_lts_buffers = true;
            self.sub_time_start = 0.0;
        } else {
            self.reset_lts_buffers = false;
        }
        self.send_lts_buffers = (self.number_of_full_updates + 1) % self.rate == 0
            || (sync_time - (self.full_update_time + self.time_step_width)).abs() < tolerance;
    }

    pub(crate) fn enqueue_correction(&mut self) {
        self.flags.neighboring_copy = true;
        self.flags.neighboring_interior = true;
    }

    // ── Steps ────────────────────────────────────────────────────────

    /// Prediction of the copy layer.
    ///
    /// Returns `false` without doing any work while sends of the previous
    /// prediction are still in flight: the copy slots are about to be
    /// overwritten.
    pub(crate) fn compute_local_copy(&mut self, env: &mut StepEnv<'_>) -> Result<bool, SchedulerError> {
        env.comm.progress(self.id, &mut self.comm)?;
        if !self.comm.sends.is_empty() {
            env.metrics.incomplete_polls += 1;
            return Ok(false);
        }

        self.post_ghost_receives(env)?;
        self.local_integration(env, Layer::Copy)?;
        self.send_copy_regions(env)?;

        self.flags.local_copy = false;
        env.metrics.predictions += 1;
        if !self.flags.local_interior {
            self.finish_prediction(env)?;
        }
        Ok(true)
    }

    /// Prediction of the interior layer.
    pub(crate) fn compute_local_interior(&mut self, env: &mut StepEnv<'_>) -> Result<(), SchedulerError> {
        self.local_integration(env, Layer::Interior)?;
        self.flags.local_interior = false;
        env.metrics.predictions += 1;
        if !self.flags.local_copy {
            self.finish_prediction(env)?;
        }
        Ok(())
    }

    /// Correction of the copy layer.
    ///
    /// Returns `false` while any ghost receive is outstanding.
    pub(crate) fn compute_neighboring_copy(
        &mut self,
        env: &mut StepEnv<'_>,
    ) -> Result<bool, SchedulerError> {
        env.comm.progress(self.id, &mut self.comm)?;
        if !self.comm.receives.is_empty() {
            env.metrics.incomplete_polls += 1;
            return Ok(false);
        }

        for (region, payload) in std::mem::take(&mut self.comm.arrived) {
            env.layout.scatter_ghost_region(self.id, region, &payload)?;
            env.metrics.messages_received += 1;
        }
        self.neighboring_integration(env, Layer::Copy)?;

        self.flags.neighboring_copy = false;
        env.metrics.corrections += 1;
        if !self.flags.neighboring_interior {
            self.finish_correction(env);
        }
        Ok(true)
    }

    /// Correction of the interior layer.
    pub(crate) fn compute_neighboring_interior(
        &mut self,
        env: &mut StepEnv<'_>,
    ) -> Result<(), SchedulerError> {
        self.neighboring_integration(env, Layer::Interior)?;
        self.flags.neighboring_interior = false;
        env.metrics.corrections += 1;
        if !self.flags.neighboring_copy {
            self.finish_correction(env);
        }
        Ok(())
    }

    fn local_integration(&self, env: &mut StepEnv<'_>, layer: Layer) -> Result<(), SchedulerError> {
        let info = self.step_info(layer);
        let parts = env.layout.parts_mut();
        let cells = parts
            .topology
            .cluster_cells(self.id)
            .ok_or(LayoutError::UnknownRegion {
                cluster: self.id,
                region: 0,
            })?
            .layer(layer);
        if cells.is_empty() {
            return Ok(());
        }
        let mut step = LocalStep::new(
            info,
            cells,
            parts.topology,
            &*parts.dofs,
            &*parts.constants,
            parts.time,
        );
        env.kernels
            .local_integration(&mut step)
            .map_err(|source| SchedulerError::Kernel {
                cluster: self.id,
                layer,
                source,
            })
    }

    fn neighboring_integration(
        &self,
        env: &mut StepEnv<'_>,
        layer: Layer,
    ) -> Result<(), SchedulerError> {
        let info = self.step_info(layer);
        let parts = env.layout.parts_mut();
        let cells = parts
            .topology
            .cluster_cells(self.id)
            .ok_or(LayoutError::UnknownRegion {
                cluster: self.id,
                region: 0,
            })?
            .layer(layer);
        if cells.is_empty() {
            return Ok(());
        }
        let mut step = NeighboringStep::new(
            info,
            cells,
            parts.topology,
            &*parts.time,
            &*parts.constants,
            self.sources.layer(layer),
            parts.dofs,
        );
        env.kernels
            .neighboring_integration(&mut step)
            .map_err(|source| SchedulerError::Kernel {
                cluster: self.id,
                layer,
                source,
            })
    }

    fn post_ghost_receives(&mut self, env: &mut StepEnv<'_>) -> Result<(), SchedulerError> {
        let exchange = env
            .layout
            .topology()
            .exchange(self.id)
            .ok_or(LayoutError::UnknownRegion {
                cluster: self.id,
                region: 0,
            })?;
        // A coarser region changes once per coarse interval.
        let due: SmallVec<[(usize, MessageKey, usize); 4]> = exchange
            .ghost
            .iter()
            .enumerate()
            .filter(|(_, r)| r.remote_cluster >= self.global || self.reset_lts_buffers)
            .map(|(idx, r)| {
                let key = MessageKey {
                    source: r.rank,
                    target: env.rank,
                    source_cluster: r.remote_cluster,
                    target_cluster: self.global,
                };
                (idx, key, r.len)
            })
            .collect();
        for (region, key, len) in due {
            env.comm
                .post_receive(self.id, &mut self.comm, region, key, len)?;
        }
        Ok(())
    }

    fn send_copy_regions(&mut self, env: &mut StepEnv<'_>) -> Result<(), SchedulerError> {
        let exchange = env
            .layout
            .topology()
            .exchange(self.id)
            .ok_or(LayoutError::UnknownRegion {
                cluster: self.id,
                region: 0,
            })?;
        // A coarser reader needs the buffer only once it has accumulated
        // a whole coarse interval.
        let due: SmallVec<[(usize, MessageKey); 4]> = exchange
            .copy
            .iter()
            .enumerate()
            .filter(|(_, r)| r.remote_cluster >= self.global || self.send_lts_buffers)
            .map(|(idx, r)| {
                let key = MessageKey {
                    source: env.rank,
                    target: r.rank,
                    source_cluster: self.global,
                    target_cluster: r.remote_cluster,
                };
                (idx, key)
            })
            .collect();
        for (region, key) in due {
            let payload = env.layout.gather_copy_region(self.id, region)?;
            env.comm.post_send(self.id, &mut self.comm, key, payload)?;
            env.metrics.messages_sent += 1;
        }
        Ok(())
    }

    /// Sample receivers over the predicted interval, then publish it.
    fn finish_prediction(&mut self, env: &mut StepEnv<'_>) -> Result<(), SchedulerError> {
        let end = self.prediction_time + self.time_step_width;
        let due = self.receivers.take_due(end, env.tolerance);
        if !due.is_empty() {
            for receiver in self.receivers.iter_mut() {
                let dofs = env.layout.cell_dofs(receiver.cell)?;
                let (storage, time_data) = env.layout.time_data(receiver.cell)?;
                for &time in &due {
                    let view = ReceiverView {
                        receiver: receiver.id,
                        cell: receiver.cell,
                        time,
                        start_time: self.prediction_time,
                        dofs,
                        storage,
                        time_data,
                    };
                    let values = env.kernels.sample_receiver(&view);
                    receiver.samples.push(Sample { time, values });
                    env.metrics.receiver_samples += 1;
                }
            }
        }
        self.prediction_time = end;
        trace!(cluster = %self.id, prediction_time = end, "prediction complete");
        Ok(())
    }

    fn finish_correction(&mut self, env: &mut StepEnv<'_>) {
        self.full_update_time += self.time_step_width;
        self.sub_time_start += self.time_step_width;
        self.number_of_full_updates += 1;
        if let Some(count) = env.metrics.full_updates.get_mut(self.id.index()) {
            *count += 1;
        }
        trace!(
            cluster = %self.id,
            full_update_time = self.full_update_time,
            updates = self.number_of_full_updates,
            "correction complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_parameters_follow_rate() {
        let mut c = TimeCluster::new(ClusterId(1), GlobalClusterId(1), 2, 0.5);
        c.reset_for_advance();

        c.enqueue_prediction(1.0, 1e-6);
        assert!(c.in_flight().predicting());
        assert_eq!(c.time_step_width(), 0.5);
        assert!(c.reset_lts_buffers());
        assert!(!c.send_lts_buffers());

        c.number_of_full_updates = 1;
        c.full_update_time = 0.5;
        c.sub_time_start = 0.5;
        c.flags = InFlight::default();
        c.enqueue_prediction(1.0, 1e-6);
        assert!(!c.reset_lts_buffers());
        assert!(c.send_lts_buffers());
        assert_eq!(c.sub_time_start(), 0.5);
    }

    #[test]
    fn width_is_clipped_at_sync_time() {
        let mut c = TimeCluster::new(ClusterId(0), GlobalClusterId(0), 1, 1.0);
        c.set_time(0.25);
        c.enqueue_prediction(0.5, 1e-6);
        assert_eq!(c.time_step_width(), 0.25);
        assert!(c.send_lts_buffers());
    }

    #[test]
    fn reaching_sync_forces_send() {
        // Rate 4, only the first of four updates fits before sync.
        let mut c = TimeCluster::new(ClusterId(2), GlobalClusterId(2), 4, 0.25);
        c.enqueue_prediction(0.25, 1e-6);
        assert!(c.reset_lts_buffers());
        assert!(c.send_lts_buffers());
    }

    #[test]
    fn reset_for_advance_clears_interval_state() {
        let mut c = TimeCluster::new(ClusterId(0), GlobalClusterId(0), 1, 1.0);
        c.enqueue_prediction(1.0, 1e-6);
        c.enqueue_correction();
        c.number_of_full_updates = 3;
        c.reset_for_advance();
        assert_eq!(c.in_flight(), InFlight::default());
        assert_eq!(c.time_step_width(), 0.0);
        assert_eq!(c.number_of_full_updates(), 0);
        assert!(c.reset_lts_buffers());
    }

    #[test]
    fn step_info_reflects_state() {
        let mut c = TimeCluster::new(ClusterId(0), GlobalClusterId(3), 2, 0.5);
        c.set_time(2.0);
        c.enable_dynamic_rupture();
        c.enqueue_prediction(3.0, 1e-6);
        let info = c.step_info(Layer::Interior);
        assert_eq!(info.global, GlobalClusterId(3));
        assert_eq!(info.start_time, 2.0);
        assert_eq!(info.end_time(), 2.5);
        assert!(info.dynamic_rupture);
        assert_eq!(info.layer, Layer::Interior);
    }
}
