//! Dependency scheduler for clustered local time-stepping.
//!
//! A [`TimeManager`] owns one [`TimeCluster`] per local time cluster, the
//! [`MemoryLayout`](strata_arena::MemoryLayout) they share, the numerical
//! [`Kernels`] and a [`Transport`](strata_core::Transport). Each call to
//! [`advance_in_time`](TimeManager::advance_in_time) runs predictions and
//! corrections in dependency order until every cluster reaches the
//! requested synchronization time.
//!
//! # Message routing
//!
//! Each communication region is keyed by its remote rank and remote
//! cluster. Relative to a cluster with global id `g`:
//!
//! | remote cluster | copy region sent      | ghost region received   |
//! |----------------|-----------------------|-------------------------|
//! | finer (`> g`)  | every prediction      | every prediction        |
//! | same (`== g`)  | every prediction      | every prediction        |
//! | coarser (`< g`)| when `send_lts_buffers` | when `reset_lts_buffers` |
//!
//! # Communication progress
//!
//! With [`CommMode::Inline`] the control thread tests the transport while
//! it scans the copy queues. With [`CommMode::Thread`] a progress thread
//! owns the transport and reports completions through one channel per
//! cluster.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cluster;
mod comm;
pub mod config;
pub mod kernel;
pub mod metrics;
pub mod queue;
pub mod receiver;
pub mod scheduler;
pub mod source;
pub mod transport;

pub use cluster::{InFlight, TimeCluster};
pub use config::{CommMode, ConfigError, EngineConfig, TimeStepping};
pub use kernel::{Kernels, LocalStep, NeighboringStep, ReceiverView, StepInfo};
pub use metrics::AdvanceMetrics;
pub use receiver::{Receiver, Sample};
pub use scheduler::{RawData, SchedulerError, TimeManager};
pub use source::{LocatedSource, PointSource};
pub use transport::{ChannelTransport, NullTransport};
