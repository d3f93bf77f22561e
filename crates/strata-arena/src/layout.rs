//! The memory layout of all clusters, built once at setup.
//!
//! [`MemoryLayout::new`] runs the setup passes in order and owns the
//! result: the time-data blocks, the DOF and constant-data blocks, and the
//! read-only [`Topology`] describing cells, slots, faces and regions.

use strata_core::{
    CellId, CellInfo, CellLayout, ClusterId, GlobalClusterId, MeshStructure, Real, StorageKind,
    FACES_PER_CELL,
};
use tracing::{debug, info};

use crate::block::{CellBlock, MemoryBlock};
use crate::config::ArenaConfig;
use crate::error::LayoutError;
use crate::exchange::{initialize_communication_structure, ClusterExchange, RegionExchange};
use crate::faces::{initialize_face_neighbors, FaceInputs};
use crate::handle::{FaceNeighbor, SlotHandle};
use crate::layers::{
    correct_ghost_region_setups, derive_layer_layouts, set_up_layers, ClusterCells,
    ClusterCounts, Layer, SlotCounts,
};

// ── Topology ────────────────────────────────────────────────────

/// Immutable description of the layout.
///
/// Indexed by [`CellId`] for per-cell data and by [`ClusterId`] for
/// per-cluster data. Face neighbours exist for local cells only.
#[derive(Debug)]
pub struct Topology {
    global_ids: Vec<GlobalClusterId>,
    clusters: Vec<ClusterCells>,
    counts: Vec<ClusterCounts>,
    cells: Vec<CellLayout>,
    owners: Vec<ClusterId>,
    time_clusters: Vec<GlobalClusterId>,
    slots: Vec<SlotHandle>,
    face_neighbors: Vec<[FaceNeighbor; FACES_PER_CELL]>,
    exchange: Vec<ClusterExchange>,
}

impl Topology {
    /// Number of local clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Global id of a local cluster.
    pub fn global_id(&self, cluster: ClusterId) -> Option<GlobalClusterId> {
        self.global_ids.get(cluster.index()).copied()
    }

    /// Global ids of all local clusters.
    pub fn global_ids(&self) -> &[GlobalClusterId] {
        &self.global_ids
    }

    /// Cell ranges of a cluster.
    pub fn cluster_cells(&self, cluster: ClusterId) -> Option<&ClusterCells> {
        self.clusters.get(cluster.index())
    }

    /// Buffer and derivative counts of a cluster.
    pub fn counts(&self, cluster: ClusterId) -> Option<&ClusterCounts> {
        self.counts.get(cluster.index())
    }

    /// Communication regions of a cluster.
    pub fn exchange(&self, cluster: ClusterId) -> Option<&ClusterExchange> {
        self.exchange.get(cluster.index())
    }

    /// Total cells, ghost cells included.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Frozen layout of a cell.
    pub fn cell(&self, cell: CellId) -> Option<&CellLayout> {
        self.cells.get(cell.index())
    }

    /// Frozen layouts of all cells.
    pub fn cells(&self) -> &[CellLayout] {
        &self.cells
    }

    /// Slot of a cell's time data.
    pub fn slot(&self, cell: CellId) -> Option<SlotHandle> {
        self.slots.get(cell.index()).copied()
    }

    /// Slots of all cells, in cell order.
    pub fn slots(&self) -> &[SlotHandle] {
        &self.slots
    }

    /// Local cluster holding a cell (ghost cells included).
    pub fn owner(&self, cell: CellId) -> Option<ClusterId> {
        self.owners.get(cell.index()).copied()
    }

    /// Time cluster a cell advances with.
    ///
    /// For a ghost cell this is the remote cluster of its region.
    pub fn time_cluster(&self, cell: CellId) -> Option<GlobalClusterId> {
        self.time_clusters.get(cell.index()).copied()
    }

    /// Layer of a cell within its cluster.
    pub fn layer(&self, cell: CellId) -> Option<Layer> {
        let owner = self.owner(cell)?;
        self.clusters[owner.index()].layer_of(cell)
    }

    /// Index of a local cell into the DOF and constant-data blocks.
    pub fn local_index(&self, cell: CellId) -> Result<u32, LayoutError> {
        let owner = self.owner(cell).ok_or(LayoutError::UnknownCell { cell })?;
        let cluster = &self.clusters[owner.index()];
        if cluster.ghost.contains(&cell.0) {
            return Err(LayoutError::NotLocal { cell });
        }
        Ok(cluster.first_local + (cell.0 - cluster.copy.start))
    }

    /// Resolved faces of a local cell.
    pub fn face_neighbors(&self, cell: CellId) -> Result<&[FaceNeighbor; FACES_PER_CELL], LayoutError> {
        let local = self.local_index(cell)?;
        Ok(&self.face_neighbors[local as usize])
    }
}

// ── Time data ───────────────────────────────────────────────────

/// The two time-data blocks.
pub struct TimeData {
    /// Time-integrated buffers.
    pub buffers: MemoryBlock,
    /// Time derivatives.
    pub derivatives: MemoryBlock,
}

impl TimeData {
    /// Block holding `kind`.
    pub fn block(&self, kind: StorageKind) -> &MemoryBlock {
        match kind {
            StorageKind::Buffer => &self.buffers,
            StorageKind::Derivatives => &self.derivatives,
        }
    }

    /// Mutable block holding `kind`.
    pub fn block_mut(&mut self, kind: StorageKind) -> &mut MemoryBlock {
        match kind {
            StorageKind::Buffer => &mut self.buffers,
            StorageKind::Derivatives => &mut self.derivatives,
        }
    }

    /// Contents of a slot.
    pub fn slot(&self, handle: SlotHandle) -> &[Real] {
        self.block(handle.kind()).slot(handle)
    }

    /// Mutable contents of a slot.
    pub fn slot_mut(&mut self, handle: SlotHandle) -> &mut [Real] {
        self.block_mut(handle.kind()).slot_mut(handle)
    }

    /// Memory usage of both blocks in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.buffers.memory_bytes() + self.derivatives.memory_bytes()
    }
}

// ── Setup passes ────────────────────────────────────────────────

/// Allocate the DOF and constant-data blocks for `local_cells` cells.
pub fn allocate_constant_data(config: &ArenaConfig, local_cells: u32) -> (CellBlock, CellBlock) {
    (
        CellBlock::new(local_cells, config.dofs_len),
        CellBlock::new(local_cells, config.constant_len()),
    )
}

/// Size both time-data blocks from the counts and assign one slot per
/// cell in cell order.
///
/// Assigning more or fewer slots of a kind than were counted is fatal.
pub fn allocate_internal_state(
    config: &ArenaConfig,
    counts: &[ClusterCounts],
    cells: &[CellLayout],
) -> Result<(TimeData, Vec<SlotHandle>), LayoutError> {
    let total = counts
        .iter()
        .fold(SlotCounts::default(), |acc, c| acc + c.total());
    let mut time = TimeData {
        buffers: MemoryBlock::new(StorageKind::Buffer, total.buffers, config.dofs_len),
        derivatives: MemoryBlock::new(
            StorageKind::Derivatives,
            total.derivatives,
            config.derivatives_len,
        ),
    };

    let mut slots = Vec::with_capacity(cells.len());
    for (i, layout) in cells.iter().enumerate() {
        let kind = layout.storage();
        let block = time.block_mut(kind);
        let slot = block.alloc().ok_or(LayoutError::SlotOverflow {
            kind,
            cell: CellId(i as u32),
            capacity: block.capacity(),
        })?;
        slots.push(slot);
    }

    for block in [&time.buffers, &time.derivatives] {
        if !block.is_exhausted() {
            return Err(LayoutError::SlotUnderflow {
                kind: block.kind(),
                assigned: block.used(),
                counted: block.capacity(),
            });
        }
    }
    Ok((time, slots))
}

fn freeze_cells(
    cells: &[CellInfo],
    provisions: &[strata_core::Provision],
) -> Result<Vec<CellLayout>, LayoutError> {
    cells
        .iter()
        .zip(provisions)
        .enumerate()
        .map(|(i, (info, &provision))| {
            let kind = provision.exclusive().ok_or(LayoutError::NotExclusive {
                cell: CellId(i as u32),
                provision,
            })?;
            Ok(CellLayout::freeze(info, kind))
        })
        .collect()
}

// ── MemoryLayout ────────────────────────────────────────────────

/// Split mutable view of a layout, for kernels that read one part while
/// writing another.
pub struct LayoutParts<'a> {
    /// Slot sizes.
    pub config: &'a ArenaConfig,
    /// Cells, slots, faces and regions.
    pub topology: &'a Topology,
    /// Buffer and derivative blocks.
    pub time: &'a mut TimeData,
    /// Degrees of freedom of local cells.
    pub dofs: &'a mut CellBlock,
    /// Constant data of local cells.
    pub constants: &'a mut CellBlock,
}

/// All memory of one rank's clusters.
pub struct MemoryLayout {
    config: ArenaConfig,
    topology: Topology,
    time: TimeData,
    dofs: CellBlock,
    constants: CellBlock,
}

impl MemoryLayout {
    /// Build the layout.
    ///
    /// `cells` holds every cell of the concatenated array, ghost cells
    /// included; `global_ids` holds the time cluster of each local
    /// cluster.
    pub fn new(
        config: ArenaConfig,
        mesh: &MeshStructure,
        cells: &[CellInfo],
        global_ids: &[GlobalClusterId],
    ) -> Result<Self, LayoutError> {
        config.validate()?;
        if global_ids.len() != mesh.cluster_count() {
            return Err(LayoutError::ClusterCountMismatch {
                mesh: mesh.cluster_count(),
                global_ids: global_ids.len(),
            });
        }

        // 1. Cell ranges per cluster, layer and region.
        let clusters = set_up_layers(mesh, cells.len())?;

        // 2. Ghost provisions from region position.
        let mut provisions: Vec<_> = cells.iter().map(|c| c.provision).collect();
        correct_ghost_region_setups(mesh, &clusters, &mut provisions)?;

        // 3. Counts, rejecting non-exclusive cells.
        let counts = derive_layer_layouts(&clusters, &provisions)?;
        let layouts = freeze_cells(cells, &provisions)?;

        // 4. Per-local-cell blocks.
        let local_cells = u32::try_from(mesh.local_cells())
            .map_err(|_| LayoutError::TooManyCells { cells: mesh.local_cells() })?;
        let (dofs, constants) = allocate_constant_data(&config, local_cells);

        // 5. Time-data blocks and slots.
        let (time, slots) = allocate_internal_state(&config, &counts, &layouts)?;

        // 6. Owners and time clusters of every cell.
        let mut owners = vec![ClusterId(0); cells.len()];
        let mut time_clusters = vec![GlobalClusterId(0); cells.len()];
        for (c, (ranges, structure)) in clusters.iter().zip(&mesh.clusters).enumerate() {
            for id in ranges.all() {
                owners[id as usize] = ClusterId(c as u32);
                time_clusters[id as usize] = global_ids[c];
            }
            for (range, region) in ranges.ghost_regions.iter().zip(&structure.ghost_regions) {
                for id in range.clone() {
                    time_clusters[id as usize] = region.remote_cluster;
                }
            }
        }

        // 7. Faces.
        let face_neighbors = initialize_face_neighbors(
            &FaceInputs {
                cells: &layouts,
                slots: &slots,
                time_clusters: &time_clusters,
            },
            &clusters,
        )?;

        // 8. Message descriptors.
        let exchange = initialize_communication_structure(&config, mesh, &counts)?;

        for (c, count) in counts.iter().enumerate() {
            debug!(
                cluster = c,
                global = %global_ids[c],
                ghost = count.ghost.total.cells(),
                copy = count.copy.total.cells(),
                interior = count.interior.cells(),
                "cluster layout"
            );
        }
        info!(
            clusters = mesh.cluster_count(),
            cells = cells.len(),
            buffers = time.buffers.capacity(),
            derivatives = time.derivatives.capacity(),
            bytes = time.memory_bytes() + dofs.memory_bytes() + constants.memory_bytes(),
            "memory layout ready"
        );

        Ok(Self {
            config,
            topology: Topology {
                global_ids: global_ids.to_vec(),
                clusters,
                counts,
                cells: layouts,
                owners,
                time_clusters,
                slots,
                face_neighbors,
                exchange,
            },
            time,
            dofs,
            constants,
        })
    }

    /// Slot sizes.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Cells, slots, faces and regions.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Buffer and derivative blocks.
    pub fn time(&self) -> &TimeData {
        &self.time
    }

    /// DOF block of local cells.
    pub fn dofs(&self) -> &CellBlock {
        &self.dofs
    }

    /// Mutable DOF block.
    pub fn dofs_mut(&mut self) -> &mut CellBlock {
        &mut self.dofs
    }

    /// Constant-data block of local cells.
    pub fn constants(&self) -> &CellBlock {
        &self.constants
    }

    /// Mutable constant-data block.
    pub fn constants_mut(&mut self) -> &mut CellBlock {
        &mut self.constants
    }

    /// Borrow every part at once.
    pub fn parts_mut(&mut self) -> LayoutParts<'_> {
        LayoutParts {
            config: &self.config,
            topology: &self.topology,
            time: &mut self.time,
            dofs: &mut self.dofs,
            constants: &mut self.constants,
        }
    }

    /// Storage kind and time data of a cell.
    pub fn time_data(&self, cell: CellId) -> Result<(StorageKind, &[Real]), LayoutError> {
        let slot = self
            .topology
            .slot(cell)
            .ok_or(LayoutError::UnknownCell { cell })?;
        Ok((slot.kind(), self.time.slot(slot)))
    }

    /// Degrees of freedom of a local cell.
    pub fn cell_dofs(&self, cell: CellId) -> Result<&[Real], LayoutError> {
        let local = self.topology.local_index(cell)?;
        Ok(self.dofs.cell(local))
    }

    /// Mutable degrees of freedom of a local cell.
    pub fn cell_dofs_mut(&mut self, cell: CellId) -> Result<&mut [Real], LayoutError> {
        let local = self.topology.local_index(cell)?;
        Ok(self.dofs.cell_mut(local))
    }

    fn region(
        &self,
        cluster: ClusterId,
        region: usize,
        layer: Layer,
    ) -> Result<&RegionExchange, LayoutError> {
        let exchange = self
            .topology
            .exchange(cluster)
            .ok_or(LayoutError::UnknownRegion { cluster, region })?;
        let layer = match layer {
            Layer::Copy => &exchange.copy,
            _ => &exchange.ghost,
        };
        layer
            .get(region)
            .ok_or(LayoutError::UnknownRegion { cluster, region })
    }

    /// Copy the time data of a copy region into a message payload.
    pub fn gather_copy_region(
        &self,
        cluster: ClusterId,
        region: usize,
    ) -> Result<Vec<Real>, LayoutError> {
        let exchange = self.region(cluster, region, Layer::Copy)?;
        let mut payload = Vec::with_capacity(exchange.len);
        payload.extend_from_slice(self.time.buffers.slots(exchange.buffers.clone()));
        payload.extend_from_slice(self.time.derivatives.slots(exchange.derivatives.clone()));
        Ok(payload)
    }

    /// Copy a received payload into the slots of a ghost region.
    pub fn scatter_ghost_region(
        &mut self,
        cluster: ClusterId,
        region: usize,
        payload: &[Real],
    ) -> Result<(), LayoutError> {
        let exchange = self.region(cluster, region, Layer::Ghost)?.clone();
        if payload.len() != exchange.len {
            return Err(LayoutError::PayloadLength {
                cluster,
                region,
                expected: exchange.len,
                actual: payload.len(),
            });
        }
        let buffers = self.time.buffers.slots_mut(exchange.buffers);
        let split = buffers.len();
        buffers.copy_from_slice(&payload[..split]);
        self.time
            .derivatives
            .slots_mut(exchange.derivatives)
            .copy_from_slice(&payload[split..]);
        Ok(())
    }

    /// Total memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.time.memory_bytes() + self.dofs.memory_bytes() + self.constants.memory_bytes()
    }
}
