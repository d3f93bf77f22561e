//! Benchmark profiles and utilities for the Strata LTS scheduler.
//!
//! Provides pre-built mesh profiles for benchmarking and examples:
//!
//! - [`reference_profile`]: 10K cells in 3 clusters, order-4 slots
//! - [`stress_profile`]: 100K cells in 4 clusters, order-2 slots
//! - [`deep_hierarchy`]: one cell per cluster, many clusters, for
//!   measuring scheduling overhead alone
//! - [`cluster_counts`]: deterministic split of a cell budget over clusters

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use strata_arena::ArenaConfig;
use strata_core::{GlobalClusterId, RankId, Real};
use strata_engine::{CommMode, EngineConfig};
use strata_test_utils::Chain;

/// A mesh and the engine settings to run it with.
#[derive(Clone, Debug)]
pub struct Profile {
    pub chain: Chain,
    pub config: EngineConfig,
}

/// Slot sizes for an order-`order` elastic discretisation without
/// constant data; the benchmarks measure scheduling and layout, not
/// kernels.
fn arena(order: u32) -> ArenaConfig {
    ArenaConfig {
        local_data_len: 0,
        neighbor_data_len: 0,
        ..ArenaConfig::for_order(order, ArenaConfig::DEFAULT_QUANTITIES)
    }
}

/// Split `cells` over `clusters` clusters, halving the share of each
/// finer cluster. Every cluster gets at least one cell.
pub fn cluster_counts(cells: usize, clusters: usize) -> Vec<usize> {
    let weights: Vec<usize> = (0..clusters).map(|g| 1 << (clusters - 1 - g)).collect();
    let total: usize = weights.iter().sum();
    let mut counts: Vec<usize> = weights.iter().map(|w| (cells * w / total).max(1)).collect();
    let assigned: usize = counts.iter().sum();
    if assigned < cells {
        counts[0] += cells - assigned;
    }
    counts
}

/// A strip with `counts[g]` cells in cluster `g`, coarsest first, on
/// `ranks` contiguous ranks of near-equal size.
pub fn strip(widths: Vec<Real>, counts: &[usize], ranks: u32) -> Chain {
    let clusters: Vec<GlobalClusterId> = counts
        .iter()
        .enumerate()
        .flat_map(|(g, &n)| std::iter::repeat(GlobalClusterId(g as u32)).take(n))
        .collect();
    let len = clusters.len();
    let per_rank = len.div_ceil(ranks.max(1) as usize).max(1);
    let ranks = (0..len).map(|i| RankId((i / per_rank) as u32)).collect();
    Chain {
        widths,
        clusters,
        ranks,
    }
}

/// Reference profile: 10K cells, widths 1, 1/2, 1/4, order-4 slots.
pub fn reference_profile(ranks: u32) -> Profile {
    Profile {
        chain: strip(vec![1.0, 0.5, 0.25], &cluster_counts(10_000, 3), ranks),
        config: EngineConfig {
            arena: arena(4),
            ..EngineConfig::default()
        },
    }
}

/// Stress profile: 100K cells, widths 1 down to 1/8, order-2 slots.
pub fn stress_profile(ranks: u32) -> Profile {
    Profile {
        chain: strip(vec![1.0, 0.5, 0.25, 0.125], &cluster_counts(100_000, 4), ranks),
        config: EngineConfig {
            arena: arena(2),
            ..EngineConfig::default()
        },
    }
}

/// `clusters` clusters of rate 2 with one cell each.
pub fn deep_hierarchy(clusters: usize) -> Profile {
    let widths = (0..clusters).map(|g| 0.5f64.powi(g as i32)).collect();
    Profile {
        chain: strip(widths, &vec![1; clusters], 1),
        config: EngineConfig {
            comm_mode: CommMode::Inline,
            arena: ArenaConfig::with_sizes(2, 4),
            ..EngineConfig::default()
        },
    }
}
