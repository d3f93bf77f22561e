//! Face-neighbour resolution.

use strata_core::{CellId, CellLayout, FaceType, GlobalClusterId, FACES_PER_CELL};

use crate::error::LayoutError;
use crate::handle::{FaceNeighbor, FaceRelation, SlotHandle};
use crate::layers::ClusterCells;

/// Per-cell lookup tables the resolution pass reads from.
pub struct FaceInputs<'a> {
    /// Frozen layout of every cell.
    pub cells: &'a [CellLayout],
    /// Slot of every cell.
    pub slots: &'a [SlotHandle],
    /// Time cluster of every cell; ghost cells carry their region's remote
    /// cluster.
    pub time_clusters: &'a [GlobalClusterId],
}

fn relation(
    cell: CellId,
    face: usize,
    own: GlobalClusterId,
    neighbor: GlobalClusterId,
) -> Result<FaceRelation, LayoutError> {
    match i64::from(neighbor.0) - i64::from(own.0) {
        0 => Ok(FaceRelation::Same),
        1 => Ok(FaceRelation::Finer),
        -1 => Ok(FaceRelation::Coarser),
        _ => Err(LayoutError::NonAdjacentClusters {
            cell,
            face,
            own,
            neighbor,
        }),
    }
}

fn resolve_face(
    inputs: &FaceInputs<'_>,
    cell: CellId,
    face: usize,
) -> Result<FaceNeighbor, LayoutError> {
    let layout = &inputs.cells[cell.index()];
    let expected = layout.face_provision(face);
    let target = match layout.face_type(face) {
        FaceType::Outflow => return Ok(FaceNeighbor::Absent),
        FaceType::FreeSurface => cell,
        FaceType::Regular | FaceType::Periodic | FaceType::DynamicRupture => {
            let neighbor = layout
                .face_neighbor(face)
                .ok_or(LayoutError::MissingFaceNeighbor { cell, face })?;
            if neighbor.index() >= inputs.cells.len() {
                return Err(LayoutError::FaceNeighborOutOfRange {
                    cell,
                    face,
                    neighbor,
                });
            }
            neighbor
        }
    };

    let actual = inputs.cells[target.index()].storage();
    if expected != actual {
        return Err(LayoutError::ProvisionMismatch {
            cell,
            face,
            expected,
            actual,
        });
    }
    let relation = relation(
        cell,
        face,
        inputs.time_clusters[cell.index()],
        inputs.time_clusters[target.index()],
    )?;
    Ok(FaceNeighbor::Slot {
        cell: target,
        slot: inputs.slots[target.index()],
        relation,
    })
}

/// Resolve the four faces of every local cell.
///
/// Returns one entry per local cell, in local order. Ghost cells never run
/// a kernel and get no entry.
pub fn initialize_face_neighbors(
    inputs: &FaceInputs<'_>,
    clusters: &[ClusterCells],
) -> Result<Vec<[FaceNeighbor; FACES_PER_CELL]>, LayoutError> {
    let mut faces = Vec::new();
    for cluster in clusters {
        for id in cluster.local() {
            let cell = CellId(id);
            let mut resolved = [FaceNeighbor::Absent; FACES_PER_CELL];
            for (face, slot) in resolved.iter_mut().enumerate() {
                *slot = resolve_face(inputs, cell, face)?;
            }
            faces.push(resolved);
        }
    }
    Ok(faces)
}
