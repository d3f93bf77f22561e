//! Core types and traits for the Strata local time-stepping core.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the layout engine and the scheduler:
//! strongly-typed identifiers, the per-cell layout descriptor, the
//! mesh structure handed over by the partitioner, error types, and the
//! [`Transport`] seam used for non-blocking halo exchange.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod error;
pub mod id;
pub mod mesh;
pub mod traits;

pub use cell::{CellInfo, CellLayout, FaceType, Provision, StorageKind, FACES_PER_CELL};
pub use error::{KernelError, TransportError};
pub use id::{CellId, ClusterId, GlobalClusterId, RankId, ReceiverId, Real, SourceId};
pub use mesh::{ClusterStructure, CommRegion, MeshStructure};
pub use traits::{MessageKey, Transport};
