//! Engine configuration, validation, and error types.
//!
//! [`TimeStepping`] describes the time clusters: the CFL width of every
//! global cluster and which of them live on this rank. [`EngineConfig`]
//! carries the knobs of the scheduler itself. Both are validated before
//! a [`TimeManager`](crate::TimeManager) is built.

use std::error::Error;
use std::fmt;

use strata_arena::{ArenaConfig, LayoutError};
use strata_core::{GlobalClusterId, Real, ReceiverId, SourceId};

// ── CommMode ───────────────────────────────────────────────────────

/// How non-blocking communication makes progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommMode {
    /// The control thread tests outstanding requests while it polls the
    /// copy queues.
    #[default]
    Inline,
    /// A dedicated progress thread owns the transport.
    Thread,
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Scheduler settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Communication progress mode. Default: [`CommMode::Inline`].
    pub comm_mode: CommMode,
    /// Full updates of the finest local cluster between progress log
    /// lines. Default: 100.
    pub progress_interval: u64,
    /// Receiver sampling interval in simulated time. `None` disables
    /// sampling until [`set_receiver_sampling`](crate::TimeManager::set_receiver_sampling)
    /// is called.
    pub receiver_sampling: Option<Real>,
    /// Slot sizes of the memory layout.
    pub arena: ArenaConfig,
}

impl EngineConfig {
    /// Default progress log interval.
    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }
        if let Some(interval) = self.receiver_sampling {
            validate_sampling(interval)?;
        }
        self.arena.validate()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            comm_mode: CommMode::Inline,
            progress_interval: Self::DEFAULT_PROGRESS_INTERVAL,
            receiver_sampling: None,
            arena: ArenaConfig::default(),
        }
    }
}

pub(crate) fn validate_sampling(interval: Real) -> Result<(), ConfigError> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(ConfigError::InvalidReceiverSampling { value: interval });
    }
    Ok(())
}

// ── TimeStepping ───────────────────────────────────────────────────

/// Widths and placement of the time clusters.
///
/// Global cluster 0 is the coarsest. Each width must be an integer
/// fraction of the next-coarser one; that integer is the cluster's rate.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStepping {
    /// CFL time-step width of every global cluster, coarsest first.
    pub global_widths: Vec<Real>,
    /// Global id of every local cluster, in local order.
    pub local_clusters: Vec<GlobalClusterId>,
}

impl TimeStepping {
    /// Relative slack allowed when deriving integer rates.
    pub const RATE_TOLERANCE: Real = 1e-6;

    /// Build and validate.
    pub fn new(
        global_widths: Vec<Real>,
        local_clusters: Vec<GlobalClusterId>,
    ) -> Result<Self, ConfigError> {
        let stepping = Self {
            global_widths,
            local_clusters,
        };
        stepping.validate()?;
        Ok(stepping)
    }

    /// Every cluster of `global_widths` lives on this rank.
    pub fn all_local(global_widths: Vec<Real>) -> Result<Self, ConfigError> {
        let local = (0..global_widths.len() as u32).map(GlobalClusterId).collect();
        Self::new(global_widths, local)
    }

    /// Check widths, rates and the local cluster list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_widths.is_empty() {
            return Err(ConfigError::InvalidTimeStepping {
                reason: "no global clusters".to_string(),
            });
        }
        for (g, &width) in self.global_widths.iter().enumerate() {
            if !width.is_finite() || width <= 0.0 {
                return Err(ConfigError::InvalidTimeStepping {
                    reason: format!("width {width} of cluster {g} must be finite and positive"),
                });
            }
            if g > 0 {
                let ratio = self.global_widths[g - 1] / width;
                let rate = ratio.round();
                if rate < 1.0 || (ratio - rate).abs() > Self::RATE_TOLERANCE * ratio {
                    return Err(ConfigError::InvalidRate {
                        global: GlobalClusterId(g as u32),
                        ratio,
                    });
                }
            }
        }
        if self.local_clusters.is_empty() {
            return Err(ConfigError::InvalidTimeStepping {
                reason: "no local clusters".to_string(),
            });
        }
        for (i, id) in self.local_clusters.iter().enumerate() {
            if id.index() >= self.global_widths.len() {
                return Err(ConfigError::InvalidTimeStepping {
                    reason: format!("local cluster {i} maps to unknown global cluster {id}"),
                });
            }
            if i > 0 && self.local_clusters[i - 1] >= *id {
                return Err(ConfigError::InvalidTimeStepping {
                    reason: "local clusters must be in increasing global order".to_string(),
                });
            }
        }
        Ok(())
    }

    /// CFL width of a global cluster.
    pub fn width(&self, global: GlobalClusterId) -> Real {
        self.global_widths[global.index()]
    }

    /// Ratio of the next-coarser cluster's width to this cluster's width.
    ///
    /// The coarsest cluster has rate 1.
    pub fn rate(&self, global: GlobalClusterId) -> u64 {
        match global.index() {
            0 => 1,
            g => (self.global_widths[g - 1] / self.global_widths[g]).round() as u64,
        }
    }

    /// Time tolerance: `1e-5` of the finest width.
    pub fn tolerance(&self) -> Real {
        1e-5 * self
            .global_widths
            .iter()
            .copied()
            .fold(Real::INFINITY, Real::min)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while configuring a [`TimeManager`](crate::TimeManager).
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Cluster widths or the local cluster list are unusable.
    InvalidTimeStepping {
        /// Which invariant was violated.
        reason: String,
    },
    /// A width is not an integer fraction of the next-coarser width.
    InvalidRate {
        /// The finer cluster of the pair.
        global: GlobalClusterId,
        /// Width ratio found.
        ratio: Real,
    },
    /// The mesh structure and the time stepping disagree on cluster count.
    ClusterCountMismatch {
        /// Local clusters in the time stepping.
        time_stepping: usize,
        /// Clusters in the mesh structure.
        mesh: usize,
    },
    /// Dynamic rupture was requested with more than one local cluster.
    DynamicRuptureWithLts {
        /// Local clusters present.
        clusters: usize,
    },
    /// Receiver sampling interval is not finite and positive.
    InvalidReceiverSampling {
        /// The invalid value.
        value: Real,
    },
    /// Progress interval is zero.
    InvalidProgressInterval,
    /// Initial time is negative or not finite.
    InvalidInitialTime {
        /// The invalid value.
        value: Real,
    },
    /// A mesh id has no entry in the mesh-to-cluster map.
    UnknownMeshCell {
        /// The unknown mesh id.
        mesh_id: usize,
    },
    /// A receiver id was registered twice.
    DuplicateReceiver {
        /// The repeated id.
        receiver: ReceiverId,
    },
    /// A point source id was given twice.
    DuplicatePointSource {
        /// The repeated id.
        id: SourceId,
    },
    /// A point source has no usable time function or amplitudes.
    InvalidPointSource {
        /// The rejected source.
        id: SourceId,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A mesh-to-cluster entry disagrees with the layout.
    InvalidMeshMapping {
        /// The offending mesh id.
        mesh_id: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// The memory layout could not be built.
    Layout(LayoutError),
    /// The communication thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimeStepping { reason } => write!(f, "invalid time stepping: {reason}"),
            Self::InvalidRate { global, ratio } => write!(
                f,
                "cluster {global} width ratio {ratio} is not a positive integer"
            ),
            Self::ClusterCountMismatch {
                time_stepping,
                mesh,
            } => write!(
                f,
                "time stepping has {time_stepping} local clusters, mesh has {mesh}"
            ),
            Self::DynamicRuptureWithLts { clusters } => write!(
                f,
                "dynamic rupture is not supported with {clusters} clusters"
            ),
            Self::InvalidReceiverSampling { value } => write!(
                f,
                "receiver sampling must be finite and positive, got {value}"
            ),
            Self::InvalidProgressInterval => write!(f, "progress_interval must be at least 1"),
            Self::InvalidInitialTime { value } => {
                write!(f, "initial time must be finite and non-negative, got {value}")
            }
            Self::UnknownMeshCell { mesh_id } => write!(f, "unknown mesh cell {mesh_id}"),
            Self::DuplicateReceiver { receiver } => {
                write!(f, "receiver {receiver} registered twice")
            }
            Self::DuplicatePointSource { id } => write!(f, "point source {id} given twice"),
            Self::InvalidPointSource { id, reason } => write!(f, "point source {id}: {reason}"),
            Self::InvalidMeshMapping { mesh_id, reason } => {
                write!(f, "mesh cell {mesh_id}: {reason}")
            }
            Self::Layout(e) => write!(f, "layout: {e}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LayoutError> for ConfigError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}
