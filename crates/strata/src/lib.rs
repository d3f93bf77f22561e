//! Strata: the clustered local time-stepping core of an ADER-DG wave
//! propagation solver.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Strata sub-crates. For most users, adding `strata` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! // Kernels that leave every cell untouched.
//! struct Idle;
//! impl Kernels for Idle {
//!     fn local_integration(&self, _step: &mut LocalStep<'_>) -> Result<(), KernelError> {
//!         Ok(())
//!     }
//!     fn neighboring_integration(
//!         &self,
//!         _step: &mut NeighboringStep<'_>,
//!     ) -> Result<(), KernelError> {
//!         Ok(())
//!     }
//! }
//!
//! // Two clusters of widths 1 and 1/2, one interior cell each.
//! let mesh = MeshStructure::new(vec![
//!     ClusterStructure::interior(1),
//!     ClusterStructure::interior(1),
//! ]);
//! let cells = vec![
//!     CellInfo::new(Provision::Buffer),
//!     CellInfo::new(Provision::Buffer),
//! ];
//! let config = EngineConfig {
//!     arena: ArenaConfig::with_sizes(4, 8),
//!     ..EngineConfig::default()
//! };
//! let mut tm = TimeManager::new(
//!     config,
//!     TimeStepping::all_local(vec![1.0, 0.5]).unwrap(),
//!     &mesh,
//!     &cells,
//!     vec![(ClusterId(0), CellId(0)), (ClusterId(1), CellId(1))],
//!     Box::new(Idle),
//!     Box::new(NullTransport::new(RankId(0))),
//! )
//! .unwrap();
//! let metrics = tm.advance_in_time(1.0).unwrap();
//! assert_eq!(metrics.full_updates, vec![1, 2]);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | IDs, cell and mesh descriptors, transport trait |
//! | [`arena`] | `strata-arena` | Layer ranges, slot blocks, face resolution |
//! | [`engine`] | `strata-engine` | Time clusters, scheduler, kernels seam, transports |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`strata-core`).
///
/// Contains cell descriptors, the mesh structure handed over by the
/// partitioner, error types and the [`types::Transport`] trait.
pub use strata_core as types;

/// Memory layout engine (`strata-arena`).
///
/// Most users only need [`arena::ArenaConfig`] from this module; it is
/// also available in the [`prelude`].
pub use strata_arena as arena;

/// Scheduler and communication overlap (`strata-engine`).
///
/// [`engine::TimeManager`] drives the clusters to a synchronization point;
/// [`engine::Kernels`] is the seam to the numerical kernels.
pub use strata_engine as engine;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
///
/// This imports the scheduler, its configuration, the kernel seam, the mesh
/// descriptors and the bundled transports.
pub mod prelude {
    // Layout
    pub use strata_arena::{ArenaConfig, FaceNeighbor, FaceRelation, Layer, MemoryLayout};

    // Core types and traits
    pub use strata_core::{
        CellId, CellInfo, ClusterId, ClusterStructure, CommRegion, FaceType, GlobalClusterId,
        MeshStructure, MessageKey, Provision, RankId, Real, ReceiverId, SourceId, StorageKind,
        Transport,
    };

    // Errors
    pub use strata_arena::LayoutError;
    pub use strata_core::{KernelError, TransportError};
    pub use strata_engine::{ConfigError, SchedulerError};

    // Engine
    pub use strata_engine::{
        AdvanceMetrics, ChannelTransport, CommMode, EngineConfig, Kernels, LocalStep,
        NeighboringStep, NullTransport, PointSource, StepInfo, TimeManager, TimeStepping,
    };
}
