//! Layout-engine error types.
//!
//! Every variant is an invariant violation: the mesh collaborator handed
//! over data the layout cannot be built from, or sizing and assignment
//! disagree. None of them is recoverable.

use std::error::Error;
use std::fmt;

use strata_core::{CellId, ClusterId, GlobalClusterId, Provision, RankId, StorageKind};

/// Errors that can occur while building or accessing the memory layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The [`ArenaConfig`](crate::ArenaConfig) failed validation.
    InvalidConfig {
        /// Which invariant was violated.
        reason: String,
    },
    /// The number of global ids does not match the number of clusters.
    ClusterCountMismatch {
        /// Clusters in the mesh structure.
        mesh: usize,
        /// Global ids supplied.
        global_ids: usize,
    },
    /// The cell array does not match the mesh structure.
    CellCountMismatch {
        /// Cells implied by the mesh structure.
        expected: u64,
        /// Cells supplied.
        actual: usize,
    },
    /// The mesh structure describes more cells than a cell id can address.
    TooManyCells {
        /// Cells implied by the mesh structure.
        cells: u64,
    },
    /// A ghost region claims more derivative cells than it holds.
    GhostDerivativeOverflow {
        /// Owning cluster.
        cluster: ClusterId,
        /// Index of the ghost region.
        region: usize,
        /// Claimed derivative cells.
        derivatives: u32,
        /// Cells in the region.
        cells: u32,
    },
    /// A ghost cell's provision contradicts its position in the region.
    GhostSetupViolation {
        /// The offending ghost cell.
        cell: CellId,
        /// Representation its position requires.
        expected: StorageKind,
        /// Provision delivered by the mesh collaborator.
        found: Provision,
    },
    /// A cell provides both or neither representation.
    NotExclusive {
        /// The offending cell.
        cell: CellId,
        /// Provision after ghost correction.
        provision: Provision,
    },
    /// More cells of a kind were assigned than counted.
    SlotOverflow {
        /// Block that overflowed.
        kind: StorageKind,
        /// Cell that did not fit.
        cell: CellId,
        /// Slots counted during sizing.
        capacity: u32,
    },
    /// Fewer cells of a kind were assigned than counted.
    SlotUnderflow {
        /// Block with unassigned slots.
        kind: StorageKind,
        /// Slots assigned.
        assigned: u32,
        /// Slots counted during sizing.
        counted: u32,
    },
    /// A face that couples two cells has no neighbour id.
    MissingFaceNeighbor {
        /// Cell owning the face.
        cell: CellId,
        /// Face index.
        face: usize,
    },
    /// A face neighbour id is outside the cell array.
    FaceNeighborOutOfRange {
        /// Cell owning the face.
        cell: CellId,
        /// Face index.
        face: usize,
        /// The out-of-range neighbour.
        neighbor: CellId,
    },
    /// The face provision disagrees with what the neighbour provides.
    ProvisionMismatch {
        /// Cell owning the face.
        cell: CellId,
        /// Face index.
        face: usize,
        /// Representation the face expects.
        expected: StorageKind,
        /// Representation the neighbour actually provides.
        actual: StorageKind,
    },
    /// Two face neighbours are more than one cluster apart.
    NonAdjacentClusters {
        /// Cell owning the face.
        cell: CellId,
        /// Face index.
        face: usize,
        /// Time cluster of the cell.
        own: GlobalClusterId,
        /// Time cluster of the neighbour.
        neighbor: GlobalClusterId,
    },
    /// Two communication regions of one layer share a key.
    DuplicateRegion {
        /// Owning cluster.
        cluster: ClusterId,
        /// Remote rank of both regions.
        rank: RankId,
        /// Remote cluster of both regions.
        remote_cluster: GlobalClusterId,
    },
    /// A cell id is outside the cell array.
    UnknownCell {
        /// The unknown cell.
        cell: CellId,
    },
    /// Local-only data was requested for a ghost cell.
    NotLocal {
        /// The ghost cell.
        cell: CellId,
    },
    /// A cluster or region index is out of range.
    UnknownRegion {
        /// Cluster addressed.
        cluster: ClusterId,
        /// Region addressed.
        region: usize,
    },
    /// A halo payload does not match the region size.
    PayloadLength {
        /// Cluster of the region.
        cluster: ClusterId,
        /// Region index.
        region: usize,
        /// Reals the region holds.
        expected: usize,
        /// Reals supplied.
        actual: usize,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
            Self::ClusterCountMismatch { mesh, global_ids } => write!(
                f,
                "mesh has {mesh} clusters but {global_ids} global ids were given"
            ),
            Self::CellCountMismatch { expected, actual } => write!(
                f,
                "mesh structure describes {expected} cells, {actual} were supplied"
            ),
            Self::TooManyCells { cells } => write!(
                f,
                "mesh structure describes {cells} cells, at most {} are addressable",
                u32::MAX
            ),
            Self::GhostDerivativeOverflow {
                cluster,
                region,
                derivatives,
                cells,
            } => write!(
                f,
                "ghost region {region} of cluster {cluster} claims {derivatives} derivative cells but holds {cells}"
            ),
            Self::GhostSetupViolation {
                cell,
                expected,
                found,
            } => write!(
                f,
                "ghost cell {cell} must provide {expected:?} but is marked {found:?}"
            ),
            Self::NotExclusive { cell, provision } => write!(
                f,
                "cell {cell} must provide exactly one of buffer or derivatives, found {provision:?}"
            ),
            Self::SlotOverflow {
                kind,
                cell,
                capacity,
            } => write!(
                f,
                "{kind:?} block overflow at cell {cell}: only {capacity} slots were counted"
            ),
            Self::SlotUnderflow {
                kind,
                assigned,
                counted,
            } => write!(
                f,
                "{kind:?} block underflow: {assigned} slots assigned, {counted} counted"
            ),
            Self::MissingFaceNeighbor { cell, face } => {
                write!(f, "cell {cell} face {face} has no neighbour")
            }
            Self::FaceNeighborOutOfRange {
                cell,
                face,
                neighbor,
            } => write!(
                f,
                "cell {cell} face {face} points at unknown cell {neighbor}"
            ),
            Self::ProvisionMismatch {
                cell,
                face,
                expected,
                actual,
            } => write!(
                f,
                "cell {cell} face {face} expects {expected:?} but the neighbour provides {actual:?}"
            ),
            Self::NonAdjacentClusters {
                cell,
                face,
                own,
                neighbor,
            } => write!(
                f,
                "cell {cell} face {face} couples cluster {own} to non-adjacent cluster {neighbor}"
            ),
            Self::DuplicateRegion {
                cluster,
                rank,
                remote_cluster,
            } => write!(
                f,
                "cluster {cluster} has two regions for rank {rank}, cluster {remote_cluster}"
            ),
            Self::UnknownCell { cell } => write!(f, "unknown cell {cell}"),
            Self::NotLocal { cell } => write!(f, "cell {cell} is a ghost cell"),
            Self::UnknownRegion { cluster, region } => {
                write!(f, "cluster {cluster} has no region {region}")
            }
            Self::PayloadLength {
                cluster,
                region,
                expected,
                actual,
            } => write!(
                f,
                "region {region} of cluster {cluster} holds {expected} reals, payload has {actual}"
            ),
        }
    }
}

impl Error for LayoutError {}
