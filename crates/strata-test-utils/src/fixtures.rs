//! Mesh fixtures.
//!
//! A [`Chain`] is a one-dimensional strip of cells: cell `g` shares face 0
//! with cell `g - 1` and face 1 with cell `g + 1`. Face 2 is a free
//! surface and face 3 an outflow boundary. Every cell is assigned a time
//! cluster and a rank; [`Chain::partition`] cuts the strip into one
//! [`RankFixture`] per rank, with ghost and copy regions wherever the
//! strip crosses a rank boundary.
//!
//! A cell provides derivatives when one of its chain neighbours is in a
//! finer cluster, a buffer otherwise.

use std::collections::BTreeMap;

use strata_core::{
    CellId, CellInfo, ClusterId, ClusterStructure, CommRegion, FaceType, GlobalClusterId,
    MeshStructure, Provision, RankId, Real, StorageKind, Transport,
};
use strata_arena::ArenaConfig;
use strata_engine::{CommMode, ConfigError, EngineConfig, Kernels, TimeManager, TimeStepping};

use crate::kernels::AnalyticKernels;

/// Engine settings sized for the kernel doubles: two-real buffers and
/// four-real derivative slots.
pub fn engine_config(comm_mode: CommMode) -> EngineConfig {
    EngineConfig {
        comm_mode,
        arena: ArenaConfig::with_sizes(2, 4),
        ..EngineConfig::default()
    }
}

/// Cell assignment of a one-dimensional strip.
#[derive(Clone, Debug)]
pub struct Chain {
    /// CFL width of every global cluster, coarsest first.
    pub widths: Vec<Real>,
    /// Global cluster of every cell.
    pub clusters: Vec<GlobalClusterId>,
    /// Rank of every cell.
    pub ranks: Vec<RankId>,
}

/// What one rank sees of a [`Chain`].
#[derive(Clone, Debug)]
pub struct RankFixture {
    pub rank: RankId,
    pub time_stepping: TimeStepping,
    pub mesh: MeshStructure,
    pub cells: Vec<CellInfo>,
    pub mesh_to_clusters: Vec<(ClusterId, CellId)>,
    /// Chain index of every mesh id.
    pub chain_index: Vec<usize>,
    /// Faces per mesh id that contribute flux (regular and free surface).
    pub flux_faces: Vec<u32>,
}

impl RankFixture {
    /// Build a [`TimeManager`] over this rank's share of the strip.
    pub fn manager(
        &self,
        config: EngineConfig,
        kernels: Box<dyn Kernels>,
        transport: Box<dyn Transport>,
    ) -> Result<TimeManager, ConfigError> {
        TimeManager::new(
            config,
            self.time_stepping.clone(),
            &self.mesh,
            &self.cells,
            self.mesh_to_clusters.clone(),
            kernels,
            transport,
        )
    }

    /// Cells whose `dofs[0]` differs from what [`AnalyticKernels`] should
    /// have accumulated over `[start, end]`, as `(chain index, expected,
    /// actual)`.
    pub fn analytic_mismatches(
        &self,
        manager: &TimeManager,
        start: Real,
        end: Real,
    ) -> Vec<(usize, Real, Real)> {
        let mut mismatches = Vec::new();
        for (mesh_id, &(_, cell)) in self.mesh_to_clusters.iter().enumerate() {
            let expected = AnalyticKernels::expected(self.flux_faces[mesh_id], start, end);
            let actual = manager
                .layout()
                .cell_dofs(cell)
                .map(|dofs| dofs[0])
                .unwrap_or(Real::NAN);
            if !((expected - actual).abs() <= 1e-9 * expected.abs().max(1.0)) {
                mismatches.push((self.chain_index[mesh_id], expected, actual));
            }
        }
        mismatches
    }
}

impl Chain {
    /// Single-rank strip with `cells_per_cluster` cells per cluster,
    /// coarsest cluster first.
    pub fn single_rank(widths: Vec<Real>, cells_per_cluster: usize) -> Self {
        let clusters: Vec<GlobalClusterId> = (0..widths.len() as u32)
            .flat_map(|g| std::iter::repeat(GlobalClusterId(g)).take(cells_per_cluster))
            .collect();
        let ranks = vec![RankId(0); clusters.len()];
        Self {
            widths,
            clusters,
            ranks,
        }
    }

    /// The single-rank strip, cut so that the first `split` cells live
    /// on rank 0 and the rest on rank 1.
    pub fn two_ranks(widths: Vec<Real>, cells_per_cluster: usize, split: usize) -> Self {
        let mut chain = Self::single_rank(widths, cells_per_cluster);
        for (g, rank) in chain.ranks.iter_mut().enumerate() {
            if g >= split {
                *rank = RankId(1);
            }
        }
        chain
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the strip is empty.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of ranks.
    pub fn rank_count(&self) -> usize {
        self.ranks.iter().map(|r| r.0 as usize + 1).max().unwrap_or(0)
    }

    fn neighbors(&self, g: usize) -> impl Iterator<Item = usize> + '_ {
        [g.checked_sub(1), Some(g + 1)]
            .into_iter()
            .flatten()
            .filter(move |&n| n < self.len())
    }

    /// Representation cell `g` provides.
    pub fn storage(&self, g: usize) -> StorageKind {
        if self.neighbors(g).any(|n| self.clusters[n] > self.clusters[g]) {
            StorageKind::Derivatives
        } else {
            StorageKind::Buffer
        }
    }

    /// Regular plus free-surface faces of cell `g`.
    pub fn flux_faces(&self, g: usize) -> u32 {
        self.neighbors(g).count() as u32 + 1
    }

    /// Cut the strip into one fixture per rank.
    ///
    /// # Panics
    ///
    /// Panics when a cell would need to appear in two regions, which a
    /// contiguous cut never produces.
    pub fn partition(&self) -> Vec<RankFixture> {
        (0..self.rank_count() as u32)
            .map(|r| self.fixture(RankId(r)))
            .collect()
    }

    fn fixture(&self, rank: RankId) -> RankFixture {
        let local: Vec<usize> = (0..self.len()).filter(|&g| self.ranks[g] == rank).collect();
        let mut local_clusters: Vec<GlobalClusterId> =
            local.iter().map(|&g| self.clusters[g]).collect();
        local_clusters.sort();
        local_clusters.dedup();

        let key = |n: usize| (self.ranks[n], self.clusters[n]);

        let mut structures = Vec::new();
        let mut order: Vec<(usize, bool)> = Vec::new(); // (chain index, is ghost)
        let mut ghost_owner: BTreeMap<usize, GlobalClusterId> = BTreeMap::new();

        for &c in &local_clusters {
            let members: Vec<usize> = local
                .iter()
                .copied()
                .filter(|&g| self.clusters[g] == c)
                .collect();

            let mut ghosts: BTreeMap<(RankId, GlobalClusterId), Vec<usize>> = BTreeMap::new();
            let mut copies: BTreeMap<(RankId, GlobalClusterId), Vec<usize>> = BTreeMap::new();
            let mut interior = Vec::new();
            for &g in &members {
                let remote: Vec<usize> = self
                    .neighbors(g)
                    .filter(|&n| self.ranks[n] != rank)
                    .collect();
                match remote.as_slice() {
                    [] => interior.push(g),
                    [n] => copies.entry(key(*n)).or_default().push(g),
                    [a, b] => {
                        assert_eq!(key(*a), key(*b), "cell {g} would join two copy regions");
                        copies.entry(key(*a)).or_default().push(g);
                    }
                    _ => unreachable!(),
                }
                for n in remote {
                    if let Some(previous) = ghost_owner.insert(n, c) {
                        assert_eq!(previous, c, "ghost cell {n} would join two clusters");
                    }
                    let region = ghosts.entry(key(n)).or_default();
                    if !region.contains(&n) {
                        region.push(n);
                    }
                }
            }

            let mut structure = ClusterStructure::interior(interior.len() as u32);
            for ((remote_rank, remote_cluster), mut cells) in ghosts {
                cells.sort_by_key(|&n| (self.storage(n) != StorageKind::Derivatives, n));
                let derivatives = cells
                    .iter()
                    .filter(|&&n| self.storage(n) == StorageKind::Derivatives)
                    .count() as u32;
                structure.ghost_regions.push(
                    CommRegion::new(remote_rank, remote_cluster, cells.len() as u32)
                        .with_derivatives(derivatives),
                );
                order.extend(cells.into_iter().map(|n| (n, true)));
            }
            for ((remote_rank, remote_cluster), cells) in copies {
                structure
                    .copy_regions
                    .push(CommRegion::new(remote_rank, remote_cluster, cells.len() as u32));
                order.extend(cells.into_iter().map(|g| (g, false)));
            }
            order.extend(interior.into_iter().map(|g| (g, false)));
            structures.push(structure);
        }

        let mut position: BTreeMap<usize, CellId> = BTreeMap::new();
        for (i, &(g, _)) in order.iter().enumerate() {
            position.insert(g, CellId(i as u32));
        }

        let cells: Vec<CellInfo> = order
            .iter()
            .map(|&(g, ghost)| self.cell_info(g, ghost, &position))
            .collect();

        let cluster_of = |g: usize| {
            let global = self.clusters[g];
            let index = local_clusters
                .iter()
                .position(|&c| c == global)
                .unwrap_or_default();
            ClusterId(index as u32)
        };
        let mesh_to_clusters = local
            .iter()
            .map(|&g| (cluster_of(g), position[&g]))
            .collect();
        let flux_faces = local.iter().map(|&g| self.flux_faces(g)).collect();

        RankFixture {
            rank,
            time_stepping: TimeStepping::new(self.widths.clone(), local_clusters)
                .expect("chain widths must form valid rates"),
            mesh: MeshStructure::new(structures),
            cells,
            mesh_to_clusters,
            chain_index: local,
            flux_faces,
        }
    }

    fn cell_info(&self, g: usize, ghost: bool, position: &BTreeMap<usize, CellId>) -> CellInfo {
        let own = self.storage(g);
        let provision = if ghost {
            // The remote side offers both; region order decides.
            Provision::Both
        } else {
            Provision::from(own)
        };
        let mut info = CellInfo::new(provision).with_face(2, FaceType::FreeSurface, None, own);
        let sides = [(0, g.checked_sub(1)), (1, Some(g + 1))];
        for (face, neighbor) in sides {
            let Some(n) = neighbor.filter(|&n| n < self.len()) else {
                continue;
            };
            info = info.with_face(
                face,
                FaceType::Regular,
                position.get(&n).copied(),
                self.storage(n),
            );
        }
        info
    }
}
