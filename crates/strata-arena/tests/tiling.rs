//! Property tests for the layout invariants over random cluster setups.
//!
//! Every generated mesh has random ghost, copy and interior sizes and
//! random exclusive provisions. After setup, every cell must carry exactly
//! one storage kind, the slots must tile both blocks without gaps or
//! overlaps, and every communication region must be a contiguous run of
//! slots whose size matches its message length.

use proptest::prelude::*;
use strata_arena::{ArenaConfig, LayoutError, MemoryLayout};
use strata_core::{
    CellId, CellInfo, ClusterId, ClusterStructure, CommRegion, GlobalClusterId, MeshStructure,
    Provision, RankId, StorageKind,
};

#[derive(Clone, Debug)]
struct ClusterSpec {
    ghost: Vec<(u32, u32)>,
    copy: Vec<u32>,
    interior: u32,
}

fn arb_cluster() -> impl Strategy<Value = ClusterSpec> {
    (
        prop::collection::vec((1u32..5).prop_flat_map(|n| (Just(n), 0..=n)), 0..3),
        prop::collection::vec(1u32..5, 0..3),
        0u32..8,
    )
        .prop_map(|(ghost, copy, interior)| ClusterSpec {
            ghost,
            copy,
            interior,
        })
}

fn build_mesh(specs: &[ClusterSpec]) -> MeshStructure {
    MeshStructure::new(
        specs
            .iter()
            .enumerate()
            .map(|(c, spec)| ClusterStructure {
                ghost_regions: spec
                    .ghost
                    .iter()
                    .enumerate()
                    .map(|(r, &(cells, ders))| {
                        CommRegion::new(RankId(r as u32 + 1), GlobalClusterId(c as u32), cells)
                            .with_derivatives(ders)
                    })
                    .collect(),
                copy_regions: spec
                    .copy
                    .iter()
                    .enumerate()
                    .map(|(r, &cells)| {
                        CommRegion::new(RankId(r as u32 + 1), GlobalClusterId(c as u32), cells)
                    })
                    .collect(),
                interior_cells: spec.interior,
            })
            .collect(),
    )
}

fn build_cells(specs: &[ClusterSpec], kinds: &[bool]) -> Vec<CellInfo> {
    let mut cells = Vec::new();
    let mut k = kinds.iter().cycle();
    for spec in specs {
        for &(n, _) in &spec.ghost {
            cells.extend((0..n).map(|_| CellInfo::new(Provision::Both)));
        }
        let local = spec.copy.iter().sum::<u32>() + spec.interior;
        for _ in 0..local {
            let derivatives = *k.next().unwrap_or(&false);
            cells.push(CellInfo::new(Provision::from_flags(!derivatives, derivatives)));
        }
    }
    cells
}

fn setup(specs: &[ClusterSpec], kinds: &[bool]) -> Result<MemoryLayout, LayoutError> {
    let mesh = build_mesh(specs);
    let cells = build_cells(specs, kinds);
    let ids: Vec<_> = (0..specs.len() as u32).map(GlobalClusterId).collect();
    MemoryLayout::new(ArenaConfig::with_sizes(3, 7), &mesh, &cells, &ids)
}

proptest! {
    #[test]
    fn slots_tile_each_block(
        specs in prop::collection::vec(arb_cluster(), 1..4),
        kinds in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let layout = setup(&specs, &kinds).unwrap();
        let topo = layout.topology();

        for kind in [StorageKind::Buffer, StorageKind::Derivatives] {
            let block = layout.time().block(kind);
            let mut ranges: Vec<_> = topo
                .slots()
                .iter()
                .filter(|s| s.kind() == kind)
                .map(|s| s.range())
                .collect();
            ranges.sort_by_key(|r| r.start);
            let mut cursor = 0;
            for range in &ranges {
                prop_assert_eq!(range.start, cursor);
                prop_assert_eq!(range.len(), block.slot_len() as usize);
                cursor = range.end;
            }
            prop_assert_eq!(cursor, block.as_slice().len());
            prop_assert!(block.is_exhausted());
        }
    }

    #[test]
    fn every_cell_is_exclusive_and_sized(
        specs in prop::collection::vec(arb_cluster(), 1..4),
        kinds in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let layout = setup(&specs, &kinds).unwrap();
        for id in 0..layout.topology().cell_count() as u32 {
            let (kind, data) = layout.time_data(CellId(id)).unwrap();
            let cell = layout.topology().cell(CellId(id)).unwrap();
            prop_assert_eq!(cell.storage(), kind);
            let expected = match kind {
                StorageKind::Buffer => 3,
                StorageKind::Derivatives => 7,
            };
            prop_assert_eq!(data.len(), expected);
        }
    }

    #[test]
    fn regions_match_message_lengths(
        specs in prop::collection::vec(arb_cluster(), 1..4),
        kinds in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let layout = setup(&specs, &kinds).unwrap();
        let topo = layout.topology();
        for c in 0..topo.cluster_count() as u32 {
            let exchange = topo.exchange(ClusterId(c)).unwrap();
            prop_assert_eq!(exchange.ghost.len(), specs[c as usize].ghost.len());
            for (r, region) in exchange.copy.iter().enumerate() {
                let payload = layout.gather_copy_region(ClusterId(c), r).unwrap();
                prop_assert_eq!(payload.len(), region.len);
            }
            for (r, region) in exchange.ghost.iter().enumerate() {
                let (cells, ders) = specs[c as usize].ghost[r];
                prop_assert_eq!(region.derivatives.len() as u32, ders);
                prop_assert_eq!(region.buffers.len() as u32, cells - ders);
            }
        }
    }
}

#[test]
fn local_both_is_rejected_after_correction() {
    let specs = vec![ClusterSpec {
        ghost: vec![],
        copy: vec![],
        interior: 2,
    }];
    let mesh = build_mesh(&specs);
    let mut cells = build_cells(&specs, &[false]);
    cells[1].provision = Provision::Both;
    let err = MemoryLayout::new(
        ArenaConfig::with_sizes(3, 7),
        &mesh,
        &cells,
        &[GlobalClusterId(0)],
    )
    .err();
    assert!(matches!(err, Some(LayoutError::NotExclusive { .. })));
}
