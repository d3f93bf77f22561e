//! The dependency scheduler.
//!
//! [`TimeManager`] owns the clusters, the memory layout, the kernels and
//! the transport. [`advance_in_time`](TimeManager::advance_in_time)
//! repeatedly picks eligible steps from four queues until every cluster
//! has reached the synchronization time.
//!
//! # Eligibility
//!
//! After every completed step the scheduler re-evaluates the cluster and
//! its coarser and finer neighbours (local ids `id - 1` and `id + 1`).
//! With `ε` the time tolerance, a cluster may **correct** when
//!
//! - no correction is in flight and it has not reached the sync time,
//! - a prediction is pending (`|pred - full| > ε`),
//! - both neighbours have predicted at least as far (`pred_n > pred - ε`).
//!
//! It may **predict** when
//!
//! - no prediction is in flight and it has not reached the sync time,
//! - its last prediction has been consumed (`|full - pred| < ε`),
//! - the finer neighbour has corrected up to here (`full_f > pred - ε`),
//! - the coarser neighbour's next full update lies ahead
//!   (`full_c + dt_c > pred + ε`).
//!
//! A missing neighbour never blocks.
//!
//! # Queues
//!
//! Copy-layer steps wait on communication, so they sit in FIFO lists that
//! are scanned on every iteration. Interior steps never wait; one
//! prediction and one correction are popped per iteration, finest cluster
//! first.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use indexmap::IndexSet;
use strata_arena::{Layer, LayoutError, MemoryLayout, SlotHandle, Topology};
use strata_core::{
    CellId, CellInfo, CellLayout, ClusterId, KernelError, MeshStructure, RankId, Real,
    ReceiverId, Transport, TransportError,
};
use tracing::{debug, info, trace};

use crate::cluster::{StepEnv, TimeCluster};
use crate::comm::{Comm, CommThread};
use crate::config::{validate_sampling, CommMode, ConfigError, EngineConfig, TimeStepping};
use crate::kernel::Kernels;
use crate::metrics::AdvanceMetrics;
use crate::queue::{Queued, Queues};
use crate::receiver::Receiver;
use crate::source::{ClusterSources, LocatedSource, PointSource};

// ── SchedulerError ──────────────────────────────────────────────────

/// Errors returned while advancing or reconfiguring a running
/// [`TimeManager`].
///
/// All of them are fatal to the run.
#[derive(Debug, PartialEq)]
pub enum SchedulerError {
    /// The requested synchronization time is NaN or infinite.
    InvalidSyncTime {
        /// The rejected value.
        value: Real,
    },
    /// The requested synchronization time lies before the current one.
    SyncTimeRegression {
        /// Current synchronization time.
        current: Real,
        /// Requested synchronization time.
        requested: Real,
    },
    /// A kernel reported a failure.
    Kernel {
        /// Cluster being stepped.
        cluster: ClusterId,
        /// Layer being stepped.
        layer: Layer,
        /// The kernel's error.
        source: KernelError,
    },
    /// A send or receive failed.
    Transport(TransportError),
    /// A layout lookup failed.
    Layout(LayoutError),
    /// A reconfiguration was rejected.
    Config(ConfigError),
    /// The scheduler reached a state its invariants rule out.
    InvariantViolated {
        /// What was found.
        reason: String,
    },
    /// The communication thread is gone while requests were pending.
    CommThreadDisconnected,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyncTime { value } => {
                write!(f, "synchronization time must be finite, got {value}")
            }
            Self::SyncTimeRegression { current, requested } => write!(
                f,
                "synchronization time {requested} lies before the current {current}"
            ),
            Self::Kernel {
                cluster,
                layer,
                source,
            } => write!(f, "cluster {cluster} {layer:?} layer: {source}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Layout(e) => write!(f, "layout: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::InvariantViolated { reason } => write!(f, "invariant violated: {reason}"),
            Self::CommThreadDisconnected => write!(f, "communication thread disconnected"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kernel { source, .. } => Some(source),
            Self::Transport(e) => Some(e),
            Self::Layout(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SchedulerError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<LayoutError> for SchedulerError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl From<ConfigError> for SchedulerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ── RawData ─────────────────────────────────────────────────────────

/// Read-only view of the raw memory, for checkpointing and output.
#[derive(Clone, Copy)]
pub struct RawData<'a> {
    /// Degrees of freedom, one entry per local cell.
    pub dofs: &'a [Real],
    /// The buffer block.
    pub buffers: &'a [Real],
    /// The derivative block.
    pub derivatives: &'a [Real],
    /// Frozen layout of every cell.
    pub cells: &'a [CellLayout],
    /// Time-data slot of every cell.
    pub slots: &'a [SlotHandle],
    /// Full topology, including face neighbours and regions.
    pub topology: &'a Topology,
}

// ── TimeManager ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Phase {
    LocalCopy,
    LocalInterior,
    NeighboringCopy,
    NeighboringInterior,
}

/// Drives all local clusters to successive synchronization points.
pub struct TimeManager {
    config: EngineConfig,
    time_stepping: TimeStepping,
    tolerance: Real,
    sync_time: Real,
    rank: RankId,
    clusters: Vec<TimeCluster>,
    layout: MemoryLayout,
    kernels: Box<dyn Kernels>,
    comm: Comm,
    queues: Queues,
    /// Mesh id → (cluster, cell).
    mesh_to_clusters: Vec<(ClusterId, CellId)>,
    last_logged: Option<u64>,
    dynamic_rupture: bool,
}

impl TimeManager {
    /// Build the memory layout and one cluster per entry of
    /// `time_stepping.local_clusters`.
    ///
    /// `cells` holds every cell of the concatenated array described by
    /// `mesh`, ghost cells included. `mesh_to_clusters` maps each mesh id
    /// to the cluster and local cell holding it. With
    /// [`CommMode::Thread`] the communication thread is started here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        time_stepping: TimeStepping,
        mesh: &MeshStructure,
        cells: &[CellInfo],
        mesh_to_clusters: Vec<(ClusterId, CellId)>,
        kernels: Box<dyn Kernels>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        time_stepping.validate()?;
        if time_stepping.local_clusters.len() != mesh.cluster_count() {
            return Err(ConfigError::ClusterCountMismatch {
                time_stepping: time_stepping.local_clusters.len(),
                mesh: mesh.cluster_count(),
            });
        }

        let layout = MemoryLayout::new(
            config.arena.clone(),
            mesh,
            cells,
            &time_stepping.local_clusters,
        )?;

        let topology = layout.topology();
        for (mesh_id, &(cluster, cell)) in mesh_to_clusters.iter().enumerate() {
            match topology.owner(cell) {
                None => {
                    return Err(ConfigError::InvalidMeshMapping {
                        mesh_id,
                        reason: format!("cell {cell} does not exist"),
                    })
                }
                Some(owner) if owner != cluster => {
                    return Err(ConfigError::InvalidMeshMapping {
                        mesh_id,
                        reason: format!("cell {cell} belongs to cluster {owner}, not {cluster}"),
                    })
                }
                Some(_) => {}
            }
            if topology.layer(cell) == Some(Layer::Ghost) {
                return Err(ConfigError::InvalidMeshMapping {
                    mesh_id,
                    reason: format!("cell {cell} is a ghost cell"),
                });
            }
        }

        let clusters: Vec<TimeCluster> = time_stepping
            .local_clusters
            .iter()
            .enumerate()
            .map(|(i, &global)| {
                let mut cluster = TimeCluster::new(
                    ClusterId(i as u32),
                    global,
                    time_stepping.rate(global),
                    time_stepping.width(global),
                );
                if let Some(interval) = config.receiver_sampling {
                    cluster.receivers_mut().set_sampling(interval);
                }
                cluster
            })
            .collect();

        let rank = transport.rank();
        let comm = match config.comm_mode {
            CommMode::Inline => Comm::Inline(transport),
            CommMode::Thread => Comm::Thread(CommThread::spawn(transport, clusters.len())?),
        };

        let tolerance = time_stepping.tolerance();
        info!(
            %rank,
            clusters = clusters.len(),
            global_clusters = time_stepping.global_widths.len(),
            comm_mode = ?config.comm_mode,
            tolerance,
            "time manager ready"
        );

        Ok(Self {
            config,
            time_stepping,
            tolerance,
            sync_time: 0.0,
            rank,
            clusters,
            layout,
            kernels,
            comm,
            queues: Queues::default(),
            mesh_to_clusters,
            last_logged: None,
            dynamic_rupture: false,
        })
    }

    // ── Driving ─────────────────────────────────────────────────────

    /// Advance every cluster to `sync_time`.
    ///
    /// Busy-polls until all four queues drain. On return every cluster's
    /// full update time equals `sync_time`.
    pub fn advance_in_time(&mut self, sync_time: Real) -> Result<AdvanceMetrics, SchedulerError> {
        if !sync_time.is_finite() {
            return Err(SchedulerError::InvalidSyncTime { value: sync_time });
        }
        if sync_time < self.sync_time {
            return Err(SchedulerError::SyncTimeRegression {
                current: self.sync_time,
                requested: sync_time,
            });
        }
        let start = Instant::now();
        self.sync_time = sync_time;
        self.last_logged = Some(0);
        let mut metrics = AdvanceMetrics::new(self.clusters.len());

        for cluster in &mut self.clusters {
            cluster.reset_for_advance();
        }
        self.queues.clear();
        for id in 0..self.clusters.len() {
            self.update_cluster_dependencies(ClusterId(id as u32))?;
        }

        while !self.queues.is_empty() {
            metrics.iterations += 1;

            // 1. Copy-layer predictions, as far as communication allows.
            let mut i = 0;
            while i < self.queues.local_copy.len() {
                let id = self.queues.local_copy[i];
                if self.run(id, Phase::LocalCopy, &mut metrics)? {
                    self.queues.local_copy.remove(i);
                    trace!(cluster = %id, "local copy dequeued");
                    self.update_cluster_dependencies(id)?;
                } else {
                    i += 1;
                }
            }

            // 2. Copy-layer corrections.
            let mut i = 0;
            while i < self.queues.neighboring_copy.len() {
                let id = self.queues.neighboring_copy[i];
                if self.run(id, Phase::NeighboringCopy, &mut metrics)? {
                    self.queues.neighboring_copy.remove(i);
                    trace!(cluster = %id, "neighboring copy dequeued");
                    self.update_cluster_dependencies(id)?;
                } else {
                    i += 1;
                }
            }

            // 3. One interior prediction.
            if let Some(item) = self.queues.local_interior.pop() {
                trace!(cluster = %item.local, "local interior dequeued");
                self.run(item.local, Phase::LocalInterior, &mut metrics)?;
                self.update_cluster_dependencies(item.local)?;
            }

            // 4. One interior correction.
            if let Some(item) = self.queues.neighboring_interior.pop() {
                trace!(cluster = %item.local, "neighboring interior dequeued");
                self.run(item.local, Phase::NeighboringInterior, &mut metrics)?;
                self.update_cluster_dependencies(item.local)?;
            }

            self.log_progress();
        }

        for cluster in &self.clusters {
            if (cluster.full_update_time() - sync_time).abs() > self.tolerance {
                return Err(SchedulerError::InvariantViolated {
                    reason: format!(
                        "queues drained with cluster {} at {} instead of {sync_time}",
                        cluster.id(),
                        cluster.full_update_time()
                    ),
                });
            }
        }

        metrics.total_us = start.elapsed().as_micros() as u64;
        debug!(
            sync_time,
            iterations = metrics.iterations,
            incomplete_polls = metrics.incomplete_polls,
            total_us = metrics.total_us,
            "synchronization point reached"
        );
        Ok(metrics)
    }

    /// Re-evaluate `cluster` and its two neighbours, coarser first, and
    /// enqueue whatever became eligible.
    pub fn update_cluster_dependencies(&mut self, cluster: ClusterId) -> Result<(), SchedulerError> {
        let id = cluster.index();
        if id >= self.clusters.len() {
            return Err(SchedulerError::InvariantViolated {
                reason: format!("unknown cluster {cluster}"),
            });
        }
        let lower = id.saturating_sub(1);
        let upper = (id + 1).min(self.clusters.len() - 1);
        for l in lower..=upper {
            self.evaluate(l);
        }
        Ok(())
    }

    fn evaluate(&mut self, l: usize) {
        let tol = self.tolerance;
        let sync = self.sync_time;

        let coarser = l.checked_sub(1).and_then(|c| self.clusters.get(c));
        let finer = self.clusters.get(l + 1);
        let coarser_prediction = coarser.map_or(Real::MAX, |c| c.prediction_time());
        let coarser_next_full = coarser.map_or(Real::MAX, |c| {
            c.full_update_time() + c.time_step_width()
        });
        let finer_prediction = finer.map_or(Real::MAX, |c| c.prediction_time());
        let finer_full = finer.map_or(Real::MAX, |c| c.full_update_time());

        let cluster = &self.clusters[l];
        let prediction = cluster.prediction_time();
        let full = cluster.full_update_time();
        let flags = cluster.in_flight();
        let unfinished = (full - sync).abs() > tol;

        let correct = !flags.correcting()
            && unfinished
            && coarser_prediction > prediction - tol
            && (prediction - full).abs() > tol
            && finer_prediction > prediction - tol;

        let predict = !flags.predicting()
            && unfinished
            && finer_full > prediction - tol
            && (full - prediction).abs() < tol
            && coarser_next_full > prediction + tol;

        let local = ClusterId(l as u32);
        let global = cluster.global();
        if correct {
            self.clusters[l].enqueue_correction();
            self.queues.neighboring_copy.push_back(local);
            self.queues
                .neighboring_interior
                .push(Queued { global, local });
            debug!(cluster = l, prediction, full, "correction eligible");
        }
        if predict {
            let cluster = &mut self.clusters[l];
            cluster.enqueue_prediction(sync, tol);
            self.queues.local_copy.push_back(local);
            self.queues.local_interior.push(Queued { global, local });
            debug!(
                cluster = l,
                full,
                dt = cluster.time_step_width(),
                reset = cluster.reset_lts_buffers(),
                send = cluster.send_lts_buffers(),
                "prediction eligible"
            );
        }
    }

    fn run(
        &mut self,
        id: ClusterId,
        phase: Phase,
        metrics: &mut AdvanceMetrics,
    ) -> Result<bool, SchedulerError> {
        let cluster = self.clusters.get_mut(id.index()).ok_or_else(|| {
            SchedulerError::InvariantViolated {
                reason: format!("queued cluster {id} does not exist"),
            }
        })?;
        let mut env = StepEnv {
            layout: &mut self.layout,
            kernels: &*self.kernels,
            comm: &mut self.comm,
            rank: self.rank,
            tolerance: self.tolerance,
            metrics,
        };
        match phase {
            Phase::LocalCopy => cluster.compute_local_copy(&mut env),
            Phase::LocalInterior => cluster.compute_local_interior(&mut env).map(|()| true),
            Phase::NeighboringCopy => cluster.compute_neighboring_copy(&mut env),
            Phase::NeighboringInterior => {
                cluster.compute_neighboring_interior(&mut env).map(|()| true)
            }
        }
    }

    fn log_progress(&mut self) {
        let Some(finest) = self.clusters.last() else {
            return;
        };
        let updates = finest.number_of_full_updates();
        if self.last_logged != Some(updates) && updates % self.config.progress_interval == 0 {
            self.last_logged = Some(updates);
            info!(
                updates,
                time = finest.full_update_time(),
                "max updates since sync"
            );
        }
    }

    // ── Setup operations ────────────────────────────────────────────

    /// Set the prediction, full update and receiver times of every
    /// cluster, and the synchronization time, to `time`.
    pub fn set_initial_times(&mut self, time: Real) -> Result<(), ConfigError> {
        if !time.is_finite() || time < 0.0 {
            return Err(ConfigError::InvalidInitialTime { value: time });
        }
        for cluster in &mut self.clusters {
            cluster.set_time(time);
        }
        self.sync_time = time;
        Ok(())
    }

    /// Enable dynamic rupture. Only a single cluster is supported.
    pub fn enable_dynamic_rupture(&mut self) -> Result<(), ConfigError> {
        if self.clusters.len() > 1 {
            return Err(ConfigError::DynamicRuptureWithLts {
                clusters: self.clusters.len(),
            });
        }
        for cluster in &mut self.clusters {
            cluster.enable_dynamic_rupture();
        }
        self.dynamic_rupture = true;
        Ok(())
    }

    /// Whether dynamic rupture is enabled.
    pub fn dynamic_rupture(&self) -> bool {
        self.dynamic_rupture
    }

    /// Register a receiver located in mesh cell `mesh_id`.
    pub fn add_receiver(&mut self, receiver: ReceiverId, mesh_id: usize) -> Result<(), ConfigError> {
        let &(cluster, cell) = self
            .mesh_to_clusters
            .get(mesh_id)
            .ok_or(ConfigError::UnknownMeshCell { mesh_id })?;
        if self.receiver(receiver).is_some() {
            return Err(ConfigError::DuplicateReceiver { receiver });
        }
        let owner = self
            .clusters
            .get_mut(cluster.index())
            .ok_or_else(|| ConfigError::InvalidMeshMapping {
                mesh_id,
                reason: format!("cluster {cluster} does not exist"),
            })?;
        owner.receivers_mut().insert(Receiver {
            id: receiver,
            mesh_id,
            cell,
            samples: Vec::new(),
        });
        debug!(%receiver, mesh_id, %cluster, %cell, "receiver added");
        Ok(())
    }

    /// Set the receiver sampling interval of every cluster.
    pub fn set_receiver_sampling(&mut self, interval: Real) -> Result<(), ConfigError> {
        validate_sampling(interval)?;
        for cluster in &mut self.clusters {
            cluster.receivers_mut().set_sampling(interval);
        }
        self.config.receiver_sampling = Some(interval);
        Ok(())
    }

    /// Every receiver, grouped by cluster.
    pub fn receivers(&self) -> impl Iterator<Item = &Receiver> {
        self.clusters.iter().flat_map(|c| c.receivers())
    }

    /// A receiver by id.
    pub fn receiver(&self, id: ReceiverId) -> Option<&Receiver> {
        self.receivers().find(|r| r.id == id)
    }

    /// Distribute point sources to the clusters owning their cells,
    /// replacing any set before.
    ///
    /// Either every source is accepted or none is.
    pub fn set_point_sources(&mut self, sources: Vec<PointSource>) -> Result<(), ConfigError> {
        let mut seen = IndexSet::with_capacity(sources.len());
        let mut per_cluster = vec![ClusterSources::default(); self.clusters.len()];
        for source in sources {
            source.validate()?;
            if !seen.insert(source.id) {
                return Err(ConfigError::DuplicatePointSource { id: source.id });
            }
            let mesh_id = source.mesh_id;
            let &(cluster, cell) = self
                .mesh_to_clusters
                .get(mesh_id)
                .ok_or(ConfigError::UnknownMeshCell { mesh_id })?;
            let layer = self.layout.topology().layer(cell);
            let filed = match (per_cluster.get_mut(cluster.index()), layer) {
                (Some(set), Some(layer)) => set.push(layer, LocatedSource { cell, source }),
                _ => false,
            };
            if !filed {
                return Err(ConfigError::InvalidMeshMapping {
                    mesh_id,
                    reason: format!("cell {cell} of cluster {cluster} cannot hold a source"),
                });
            }
        }
        for (cluster, sources) in self.clusters.iter_mut().zip(per_cluster) {
            cluster.set_point_sources(sources);
        }
        info!(sources = seen.len(), "point sources set");
        Ok(())
    }

    /// Every point source, grouped by cluster.
    pub fn point_sources(&self) -> impl Iterator<Item = &LocatedSource> {
        self.clusters.iter().flat_map(|c| c.point_sources())
    }

    // ── Communication thread ────────────────────────────────────────

    /// Hand the transport to a progress thread. A no-op when it is
    /// already running.
    ///
    /// Fails when requests of the previous advance cannot be completed
    /// inline first.
    pub fn start_communication_thread(&mut self) -> Result<(), SchedulerError> {
        if self.comm.is_thread() {
            return Ok(());
        }
        for cluster in &mut self.clusters {
            let (id, pending) = cluster.comm_parts();
            self.comm.progress(id, pending)?;
            if cluster.has_outstanding_requests() {
                return Err(SchedulerError::InvariantViolated {
                    reason: format!("cluster {} has requests in flight", cluster.id()),
                });
            }
        }
        let Comm::Inline(transport) = std::mem::replace(&mut self.comm, Comm::Lost) else {
            return Err(SchedulerError::CommThreadDisconnected);
        };
        self.comm = Comm::Thread(CommThread::spawn(transport, self.clusters.len())?);
        self.config.comm_mode = CommMode::Thread;
        info!("communication thread started");
        Ok(())
    }

    /// Stop the progress thread and take the transport back. A no-op
    /// when no thread is running.
    pub fn stop_communication_thread(&mut self) -> Result<(), SchedulerError> {
        let Comm::Thread(thread) = &mut self.comm else {
            return Ok(());
        };
        let transport = match thread.stop() {
            Ok(transport) => transport,
            Err(e) => {
                self.comm = Comm::Lost;
                return Err(e);
            }
        };
        for cluster in &mut self.clusters {
            let (id, pending) = cluster.comm_parts();
            thread.collect(id, pending)?;
        }
        self.comm = Comm::Inline(transport);
        self.config.comm_mode = CommMode::Inline;
        info!("communication thread stopped");
        Ok(())
    }

    /// Whether a progress thread owns the transport.
    pub fn comm_thread_running(&self) -> bool {
        self.comm.is_thread()
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Raw memory for checkpoint and output collaborators.
    pub fn raw_data(&self) -> RawData<'_> {
        let topology = self.layout.topology();
        RawData {
            dofs: self.layout.dofs().as_slice(),
            buffers: self.layout.time().buffers.as_slice(),
            derivatives: self.layout.time().derivatives.as_slice(),
            cells: topology.cells(),
            slots: topology.slots(),
            topology,
        }
    }

    /// The memory layout.
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// The memory layout, mutably. Used to seed DOFs and constant data.
    pub fn layout_mut(&mut self) -> &mut MemoryLayout {
        &mut self.layout
    }

    /// All clusters in local order.
    pub fn clusters(&self) -> &[TimeCluster] {
        &self.clusters
    }

    /// One cluster.
    pub fn cluster(&self, id: ClusterId) -> Option<&TimeCluster> {
        self.clusters.get(id.index())
    }

    /// Tolerance used in every time comparison.
    pub fn time_tolerance(&self) -> Real {
        self.tolerance
    }

    /// Current synchronization time.
    pub fn sync_time(&self) -> Real {
        self.sync_time
    }

    /// Rank of this manager's transport.
    pub fn rank(&self) -> RankId {
        self.rank
    }

    /// Cluster widths and placement.
    pub fn time_stepping(&self) -> &TimeStepping {
        &self.time_stepping
    }

    /// Scheduler settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lengths of the local copy, neighboring copy, local interior and
    /// neighboring interior queues.
    pub fn queue_lengths(&self) -> [usize; 4] {
        self.queues.lens()
    }
}
