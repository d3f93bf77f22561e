//! Mesh structure handed over by the partitioner.
//!
//! For every local cluster the partitioner reports how many cells sit in
//! the ghost, copy and interior layers, and how the ghost and copy layers
//! split into communication regions. A region is keyed by the remote rank
//! and by the global cluster the remote side of the region belongs to.

use smallvec::SmallVec;

use crate::id::{GlobalClusterId, RankId};

/// One communication region of a ghost or copy layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommRegion {
    /// Rank on the other side of the region.
    pub rank: RankId,
    /// Global cluster of the cells on the other side.
    ///
    /// For a ghost region these are the mirrored cells themselves; for a
    /// copy region these are the remote cells that read the local ones.
    pub remote_cluster: GlobalClusterId,
    /// Number of cells in the region.
    pub cells: u32,
    /// Number of leading cells that carry derivatives.
    ///
    /// Only meaningful for ghost regions: the partitioner orders the
    /// derivative cells of a ghost region first.
    pub derivatives: u32,
}

impl CommRegion {
    /// A region of `cells` cells exchanged with `rank`.
    pub fn new(rank: RankId, remote_cluster: GlobalClusterId, cells: u32) -> Self {
        Self {
            rank,
            remote_cluster,
            cells,
            derivatives: 0,
        }
    }

    /// Set the number of leading derivative cells (ghost regions).
    pub fn with_derivatives(mut self, derivatives: u32) -> Self {
        self.derivatives = derivatives;
        self
    }
}

/// Region structure of a single local cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterStructure {
    /// Ghost regions, in the order their cells appear in the cell array.
    pub ghost_regions: SmallVec<[CommRegion; 4]>,
    /// Copy regions, in the order their cells appear in the cell array.
    pub copy_regions: SmallVec<[CommRegion; 4]>,
    /// Number of interior cells.
    pub interior_cells: u32,
}

impl ClusterStructure {
    /// A cluster with only interior cells.
    pub fn interior(cells: u32) -> Self {
        Self {
            interior_cells: cells,
            ..Self::default()
        }
    }

    /// Total ghost cells over all regions.
    ///
    /// Cell totals are summed in `u64`; only the layout engine decides
    /// whether they fit a cell id.
    pub fn ghost_cells(&self) -> u64 {
        self.ghost_regions.iter().map(|r| u64::from(r.cells)).sum()
    }

    /// Total copy cells over all regions.
    pub fn copy_cells(&self) -> u64 {
        self.copy_regions.iter().map(|r| u64::from(r.cells)).sum()
    }

    /// Copy plus interior cells.
    pub fn local_cells(&self) -> u64 {
        self.copy_cells() + u64::from(self.interior_cells)
    }

    /// Ghost plus copy plus interior cells.
    pub fn total_cells(&self) -> u64 {
        self.ghost_cells() + self.local_cells()
    }
}

/// Region structure of every local cluster, in local cluster order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshStructure {
    /// One entry per local cluster.
    pub clusters: Vec<ClusterStructure>,
}

impl MeshStructure {
    /// Wrap a list of cluster structures.
    pub fn new(clusters: Vec<ClusterStructure>) -> Self {
        Self { clusters }
    }

    /// Number of local clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Total number of cells across all clusters and layers.
    pub fn total_cells(&self) -> u64 {
        self.clusters.iter().map(|c| c.total_cells()).sum()
    }

    /// Total number of local (copy and interior) cells.
    pub fn local_cells(&self) -> u64 {
        self.clusters.iter().map(|c| c.local_cells()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use smallvec::smallvec;

    fn halo_cluster() -> ClusterStructure {
        ClusterStructure {
            ghost_regions: smallvec![
                CommRegion::new(RankId(1), GlobalClusterId(0), 3).with_derivatives(1),
                CommRegion::new(RankId(2), GlobalClusterId(1), 2),
            ],
            copy_regions: smallvec![CommRegion::new(RankId(1), GlobalClusterId(0), 4)],
            interior_cells: 10,
        }
    }

    #[test]
    fn layer_counts_sum_regions() {
        let c = halo_cluster();
        assert_eq!(c.ghost_cells(), 5);
        assert_eq!(c.copy_cells(), 4);
        assert_eq!(c.local_cells(), 14);
        assert_eq!(c.total_cells(), 19);
    }

    #[test]
    fn totals_do_not_wrap_at_u32() {
        let huge = ClusterStructure {
            copy_regions: smallvec![CommRegion::new(RankId(1), GlobalClusterId(0), u32::MAX)],
            interior_cells: u32::MAX,
            ..ClusterStructure::default()
        };
        assert_eq!(huge.local_cells(), 2 * u64::from(u32::MAX));
        let mesh = MeshStructure::new(vec![huge.clone(), huge]);
        assert_eq!(mesh.total_cells(), 4 * u64::from(u32::MAX));
    }

    #[test]
    fn mesh_totals_span_clusters() {
        let mesh = MeshStructure::new(vec![halo_cluster(), ClusterStructure::interior(7)]);
        assert_eq!(mesh.cluster_count(), 2);
        assert_eq!(mesh.total_cells(), 26);
        assert_eq!(mesh.local_cells(), 21);
    }

    fn arb_region() -> impl Strategy<Value = CommRegion> {
        (0u32..4, 0u32..4, 0u32..64).prop_map(|(rank, cluster, cells)| {
            CommRegion::new(RankId(rank), GlobalClusterId(cluster), cells)
        })
    }

    fn arb_cluster() -> impl Strategy<Value = ClusterStructure> {
        (
            prop::collection::vec(arb_region(), 0..5),
            prop::collection::vec(arb_region(), 0..5),
            0u32..256,
        )
            .prop_map(|(ghosts, copies, interior)| ClusterStructure {
                ghost_regions: ghosts.into_iter().collect(),
                copy_regions: copies.into_iter().collect(),
                interior_cells: interior,
            })
    }

    proptest! {
        #[test]
        fn mesh_totals_are_sums_of_clusters(
            clusters in prop::collection::vec(arb_cluster(), 0..6),
        ) {
            let ghosts: u64 = clusters.iter().map(|c| c.ghost_cells()).sum();
            let local: u64 = clusters.iter().map(|c| c.local_cells()).sum();
            let mesh = MeshStructure::new(clusters);
            prop_assert_eq!(mesh.local_cells(), local);
            prop_assert_eq!(mesh.total_cells(), ghosts + local);
        }
    }
}
