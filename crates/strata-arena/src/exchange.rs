//! Per-region message descriptors.
//!
//! Slots are assigned in traversal order, so the cells of one ghost or copy
//! region occupy a contiguous run of slots in each block. A message for a
//! region is the region's buffer slots followed by its derivative slots.

use std::ops::Range;

use indexmap::IndexMap;
use strata_core::{ClusterId, GlobalClusterId, MeshStructure, RankId};

use crate::config::ArenaConfig;
use crate::error::LayoutError;
use crate::layers::{ClusterCounts, SlotCounts};

/// Key of a communication region within one layer of a cluster.
pub type RegionKey = (RankId, GlobalClusterId);

/// Slot ranges and message length of one communication region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionExchange {
    /// Remote rank.
    pub rank: RankId,
    /// Time cluster of the remote cells.
    pub remote_cluster: GlobalClusterId,
    /// Slot range in the buffer block.
    pub buffers: Range<u32>,
    /// Slot range in the derivative block.
    pub derivatives: Range<u32>,
    /// Reals per message.
    pub len: usize,
}

impl RegionExchange {
    /// Lookup key of this region.
    pub fn key(&self) -> RegionKey {
        (self.rank, self.remote_cluster)
    }
}

/// Communication regions of one layer, in mesh order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerExchange {
    regions: IndexMap<RegionKey, RegionExchange>,
}

impl LayerExchange {
    /// Region by index.
    pub fn get(&self, region: usize) -> Option<&RegionExchange> {
        self.regions.get_index(region).map(|(_, r)| r)
    }

    /// Index of the region talking to `rank` about `remote_cluster`.
    pub fn position(&self, rank: RankId, remote_cluster: GlobalClusterId) -> Option<usize> {
        self.regions.get_index_of(&(rank, remote_cluster))
    }

    /// All regions in mesh order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionExchange> {
        self.regions.values()
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the layer communicates at all.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Ghost and copy regions of one cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterExchange {
    /// Regions received into.
    pub ghost: LayerExchange,
    /// Regions sent from.
    pub copy: LayerExchange,
}

/// Next free slot per block. Slot indices stay below the cell count, which
/// `set_up_layers` bounds by `u32::MAX`.
struct SlotCursor {
    buffers: u32,
    derivatives: u32,
}

impl SlotCursor {
    fn take(&mut self, counts: SlotCounts) -> (Range<u32>, Range<u32>) {
        let buffers = self.buffers..self.buffers + counts.buffers;
        let derivatives = self.derivatives..self.derivatives + counts.derivatives;
        self.buffers = buffers.end;
        self.derivatives = derivatives.end;
        (buffers, derivatives)
    }
}

/// Build the message descriptors of every region from the slot counts.
///
/// Walks the clusters in traversal order with one running cursor per
/// block, mirroring the order in which slots were assigned.
pub fn initialize_communication_structure(
    config: &ArenaConfig,
    mesh: &MeshStructure,
    counts: &[ClusterCounts],
) -> Result<Vec<ClusterExchange>, LayoutError> {
    let mut cursor = SlotCursor {
        buffers: 0,
        derivatives: 0,
    };
    let mut exchange = Vec::with_capacity(counts.len());
    for (c, (structure, counts)) in mesh.clusters.iter().zip(counts).enumerate() {
        let cluster = ClusterId(c as u32);
        let mut layers = ClusterExchange::default();
        for (layer, regions, region_counts) in [
            (&mut layers.ghost, &structure.ghost_regions, &counts.ghost.regions),
            (&mut layers.copy, &structure.copy_regions, &counts.copy.regions),
        ] {
            for (region, region_counts) in regions.iter().zip(region_counts) {
                let (buffers, derivatives) = cursor.take(*region_counts);
                let entry = RegionExchange {
                    rank: region.rank,
                    remote_cluster: region.remote_cluster,
                    buffers,
                    derivatives,
                    len: region_counts.reals(config),
                };
                if layer.regions.insert(entry.key(), entry).is_some() {
                    return Err(LayoutError::DuplicateRegion {
                        cluster,
                        rank: region.rank,
                        remote_cluster: region.remote_cluster,
                    });
                }
            }
        }
        cursor.take(counts.interior);
        exchange.push(layers);
    }
    Ok(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerCounts;
    use smallvec::smallvec;
    use strata_core::{ClusterStructure, CommRegion};

    fn counts(b: u32, d: u32) -> SlotCounts {
        SlotCounts {
            buffers: b,
            derivatives: d,
        }
    }

    fn layer(regions: &[SlotCounts]) -> LayerCounts {
        LayerCounts {
            total: regions.iter().fold(SlotCounts::default(), |a, r| a + *r),
            regions: regions.iter().copied().collect(),
        }
    }

    #[test]
    fn ranges_follow_traversal_order() {
        let mesh = MeshStructure::new(vec![
            ClusterStructure {
                ghost_regions: smallvec![
                    CommRegion::new(RankId(1), GlobalClusterId(0), 2).with_derivatives(1),
                    CommRegion::new(RankId(1), GlobalClusterId(1), 1),
                ],
                copy_regions: smallvec![CommRegion::new(RankId(1), GlobalClusterId(0), 3)],
                interior_cells: 2,
            },
            ClusterStructure {
                ghost_regions: smallvec![CommRegion::new(RankId(2), GlobalClusterId(1), 1)],
                ..ClusterStructure::default()
            },
        ]);
        let all = vec![
            ClusterCounts {
                ghost: layer(&[counts(1, 1), counts(1, 0)]),
                copy: layer(&[counts(2, 1)]),
                interior: counts(1, 1),
            },
            ClusterCounts {
                ghost: layer(&[counts(0, 1)]),
                ..ClusterCounts::default()
            },
        ];
        let config = ArenaConfig::with_sizes(4, 10);
        let exchange = initialize_communication_structure(&config, &mesh, &all).unwrap();

        let g0 = exchange[0].ghost.get(0).unwrap();
        assert_eq!(g0.buffers, 0..1);
        assert_eq!(g0.derivatives, 0..1);
        assert_eq!(g0.len, 14);
        let g1 = exchange[0].ghost.get(1).unwrap();
        assert_eq!(g1.buffers, 1..2);
        assert_eq!(g1.derivatives, 1..1);
        let c0 = exchange[0].copy.get(0).unwrap();
        assert_eq!(c0.buffers, 2..4);
        assert_eq!(c0.derivatives, 1..2);
        assert_eq!(c0.len, 2 * 4 + 10);
        // Interior of cluster 0 consumes buffer 4 and derivative 2.
        let g = exchange[1].ghost.get(0).unwrap();
        assert_eq!(g.buffers, 5..5);
        assert_eq!(g.derivatives, 3..4);

        assert_eq!(exchange[0].ghost.position(RankId(1), GlobalClusterId(1)), Some(1));
        assert_eq!(exchange[0].ghost.position(RankId(2), GlobalClusterId(1)), None);
        assert!(exchange[1].copy.is_empty());
    }

    #[test]
    fn duplicate_region_keys_rejected() {
        let mesh = MeshStructure::new(vec![ClusterStructure {
            copy_regions: smallvec![
                CommRegion::new(RankId(1), GlobalClusterId(0), 1),
                CommRegion::new(RankId(1), GlobalClusterId(0), 1),
            ],
            ..ClusterStructure::default()
        }]);
        let all = vec![ClusterCounts {
            copy: layer(&[counts(1, 0), counts(1, 0)]),
            ..ClusterCounts::default()
        }];
        let err = initialize_communication_structure(&ArenaConfig::default(), &mesh, &all)
            .unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateRegion { .. }));
    }
}
