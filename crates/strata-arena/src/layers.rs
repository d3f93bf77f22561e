//! Layer ranges, ghost correction and slot counting.
//!
//! These passes run once at setup, in this order:
//!
//! 1. [`set_up_layers`] maps the mesh structure onto ranges of the
//!    concatenated cell array.
//! 2. [`correct_ghost_region_setups`] resolves the provisions of ghost
//!    cells from their position in the region.
//! 3. [`derive_layer_layouts`] counts buffer and derivative cells per
//!    cluster, layer and region, rejecting non-exclusive cells.

use std::ops::Range;

use smallvec::SmallVec;
use strata_core::{CellId, ClusterId, MeshStructure, Provision, StorageKind};

use crate::config::ArenaConfig;
use crate::error::LayoutError;

/// The three cell layers of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Read-only mirror of remote cells.
    Ghost,
    /// Local cells whose time data is sent to other ranks.
    Copy,
    /// Local cells without communication.
    Interior,
}

/// Cell ranges of one cluster in the concatenated cell array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterCells {
    /// All ghost cells.
    pub ghost: Range<u32>,
    /// All copy cells.
    pub copy: Range<u32>,
    /// All interior cells.
    pub interior: Range<u32>,
    /// Ghost cells per communication region.
    pub ghost_regions: SmallVec<[Range<u32>; 4]>,
    /// Copy cells per communication region.
    pub copy_regions: SmallVec<[Range<u32>; 4]>,
    /// Index of the first copy cell among all local cells.
    pub first_local: u32,
}

impl ClusterCells {
    /// Cell range of `layer`.
    pub fn layer(&self, layer: Layer) -> Range<u32> {
        match layer {
            Layer::Ghost => self.ghost.clone(),
            Layer::Copy => self.copy.clone(),
            Layer::Interior => self.interior.clone(),
        }
    }

    /// Copy and interior cells.
    pub fn local(&self) -> Range<u32> {
        self.copy.start..self.interior.end
    }

    /// Every cell of the cluster.
    pub fn all(&self) -> Range<u32> {
        self.ghost.start..self.interior.end
    }

    /// Layer containing `cell`, if the cell belongs to this cluster.
    pub fn layer_of(&self, cell: CellId) -> Option<Layer> {
        if self.ghost.contains(&cell.0) {
            Some(Layer::Ghost)
        } else if self.copy.contains(&cell.0) {
            Some(Layer::Copy)
        } else if self.interior.contains(&cell.0) {
            Some(Layer::Interior)
        } else {
            None
        }
    }
}

/// Compute the cell ranges of every cluster.
///
/// Clusters are concatenated in local order; within a cluster the ghost
/// regions come first, then the copy regions, then the interior.
pub fn set_up_layers(
    mesh: &MeshStructure,
    cell_count: usize,
) -> Result<Vec<ClusterCells>, LayoutError> {
    let expected = mesh.total_cells();
    if expected > u64::from(u32::MAX) {
        return Err(LayoutError::TooManyCells { cells: expected });
    }
    if expected != cell_count as u64 {
        return Err(LayoutError::CellCountMismatch {
            expected,
            actual: cell_count,
        });
    }

    let mut clusters = Vec::with_capacity(mesh.cluster_count());
    // Every cursor below stays within `expected`, which fits a cell id.
    let mut cursor = 0u32;
    let mut first_local = 0u32;
    for structure in &mesh.clusters {
        let ghost_start = cursor;
        let ghost_regions: SmallVec<[Range<u32>; 4]> = structure
            .ghost_regions
            .iter()
            .map(|region| {
                let range = cursor..cursor + region.cells;
                cursor = range.end;
                range
            })
            .collect();
        let copy_start = cursor;
        let copy_regions: SmallVec<[Range<u32>; 4]> = structure
            .copy_regions
            .iter()
            .map(|region| {
                let range = cursor..cursor + region.cells;
                cursor = range.end;
                range
            })
            .collect();
        let interior_start = cursor;
        cursor += structure.interior_cells;

        clusters.push(ClusterCells {
            ghost: ghost_start..copy_start,
            copy: copy_start..interior_start,
            interior: interior_start..cursor,
            ghost_regions,
            copy_regions,
            first_local,
        });
        first_local += cursor - copy_start;
    }
    Ok(clusters)
}

/// Resolve the provisions of ghost cells in place.
///
/// The partitioner orders each ghost region so that its first
/// `derivatives` cells are the ones whose derivatives are communicated;
/// all remaining cells communicate buffers. A cell whose raw provision
/// does not allow the representation its position demands is rejected.
pub fn correct_ghost_region_setups(
    mesh: &MeshStructure,
    clusters: &[ClusterCells],
    provisions: &mut [Provision],
) -> Result<(), LayoutError> {
    for (c, (structure, cells)) in mesh.clusters.iter().zip(clusters).enumerate() {
        for (r, (region, range)) in structure
            .ghost_regions
            .iter()
            .zip(&cells.ghost_regions)
            .enumerate()
        {
            if region.derivatives > region.cells {
                return Err(LayoutError::GhostDerivativeOverflow {
                    cluster: ClusterId(c as u32),
                    region: r,
                    derivatives: region.derivatives,
                    cells: region.cells,
                });
            }
            for (position, id) in range.clone().enumerate() {
                let expected = if (position as u32) < region.derivatives {
                    StorageKind::Derivatives
                } else {
                    StorageKind::Buffer
                };
                let found = provisions[id as usize];
                if !found.provides(expected) {
                    return Err(LayoutError::GhostSetupViolation {
                        cell: CellId(id),
                        expected,
                        found,
                    });
                }
                provisions[id as usize] = expected.into();
            }
        }
    }
    Ok(())
}

/// Number of buffer and derivative cells in some set of cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// Cells providing a buffer.
    pub buffers: u32,
    /// Cells providing derivatives.
    pub derivatives: u32,
}

impl SlotCounts {
    fn add(&mut self, kind: StorageKind) {
        match kind {
            StorageKind::Buffer => self.buffers += 1,
            StorageKind::Derivatives => self.derivatives += 1,
        }
    }

    /// Total cells counted.
    pub fn cells(&self) -> u32 {
        self.buffers + self.derivatives
    }

    /// Count of `kind`.
    pub fn of(&self, kind: StorageKind) -> u32 {
        match kind {
            StorageKind::Buffer => self.buffers,
            StorageKind::Derivatives => self.derivatives,
        }
    }

    /// Reals occupied by these cells' time data.
    pub fn reals(&self, config: &ArenaConfig) -> usize {
        self.buffers as usize * config.dofs_len as usize
            + self.derivatives as usize * config.derivatives_len as usize
    }
}

impl std::ops::Add for SlotCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            buffers: self.buffers + rhs.buffers,
            derivatives: self.derivatives + rhs.derivatives,
        }
    }
}

/// Counts of a ghost or copy layer, in total and per region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerCounts {
    /// Whole layer.
    pub total: SlotCounts,
    /// One entry per communication region.
    pub regions: SmallVec<[SlotCounts; 4]>,
}

/// Counts of one cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterCounts {
    /// Ghost layer.
    pub ghost: LayerCounts,
    /// Copy layer.
    pub copy: LayerCounts,
    /// Interior layer.
    pub interior: SlotCounts,
}

impl ClusterCounts {
    /// Counts over all three layers.
    pub fn total(&self) -> SlotCounts {
        self.ghost.total + self.copy.total + self.interior
    }
}

fn count_range(
    range: Range<u32>,
    provisions: &[Provision],
) -> Result<SlotCounts, LayoutError> {
    let mut counts = SlotCounts::default();
    for id in range {
        let provision = provisions[id as usize];
        let kind = provision.exclusive().ok_or(LayoutError::NotExclusive {
            cell: CellId(id),
            provision,
        })?;
        counts.add(kind);
    }
    Ok(counts)
}

fn count_regions(
    regions: &[Range<u32>],
    provisions: &[Provision],
) -> Result<LayerCounts, LayoutError> {
    let mut layer = LayerCounts::default();
    for range in regions {
        let counts = count_range(range.clone(), provisions)?;
        layer.total = layer.total + counts;
        layer.regions.push(counts);
    }
    Ok(layer)
}

/// Count buffer and derivative cells per cluster, layer and region.
///
/// Must run after [`correct_ghost_region_setups`]: every cell, ghost or
/// local, has to be exclusive by now.
pub fn derive_layer_layouts(
    clusters: &[ClusterCells],
    provisions: &[Provision],
) -> Result<Vec<ClusterCounts>, LayoutError> {
    clusters
        .iter()
        .map(|cells| {
            Ok(ClusterCounts {
                ghost: count_regions(&cells.ghost_regions, provisions)?,
                copy: count_regions(&cells.copy_regions, provisions)?,
                interior: count_range(cells.interior.clone(), provisions)?,
            })
        })
        .collect()
}
