//! The seam to the numerical kernels.
//!
//! The scheduler never transforms degrees of freedom itself. It hands a
//! [`LocalStep`] or a [`NeighboringStep`] to a [`Kernels`] implementation
//! for the cells of one layer of one cluster.
//!
//! # Split borrows
//!
//! A local step (prediction) reads the DOFs and writes the time data of
//! its cells. A neighbouring step (correction) reads the time data of the
//! cells and their face neighbours and writes the DOFs. Each context
//! holds exactly the borrows its phase needs.

use std::ops::Range;

use strata_arena::{CellBlock, FaceNeighbor, Layer, LayoutError, TimeData, Topology};
use strata_core::{
    CellId, CellLayout, ClusterId, GlobalClusterId, KernelError, Real, ReceiverId, StorageKind,
    FACES_PER_CELL,
};

use crate::source::LocatedSource;

/// Scalar description of the step being executed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    /// Local cluster.
    pub cluster: ClusterId,
    /// Global cluster.
    pub global: GlobalClusterId,
    /// Copy or interior.
    pub layer: Layer,
    /// Start of the step interval, the cluster's last full update time.
    pub start_time: Real,
    /// Width of the step interval.
    pub time_step_width: Real,
    /// Offset of `start_time` within the current coarser-neighbour
    /// interval.
    pub sub_time_start: Real,
    /// Buffers restart accumulation with this prediction.
    pub reset_lts_buffers: bool,
    /// This prediction closes a coarser-neighbour interval.
    pub send_lts_buffers: bool,
    /// Dynamic rupture is enabled for this cluster.
    pub dynamic_rupture: bool,
}

impl StepInfo {
    /// End of the step interval.
    pub fn end_time(&self) -> Real {
        self.start_time + self.time_step_width
    }
}

fn lookup(error: LayoutError) -> KernelError {
    KernelError::ExecutionFailed {
        reason: error.to_string(),
    }
}

fn layout_of(topology: &Topology, cell: CellId) -> Result<&CellLayout, KernelError> {
    topology
        .cell(cell)
        .ok_or_else(|| lookup(LayoutError::UnknownCell { cell }))
}

// ── LocalStep ───────────────────────────────────────────────────────

/// Context of a prediction over the cells of one layer.
pub struct LocalStep<'a> {
    info: StepInfo,
    cells: Range<u32>,
    topology: &'a Topology,
    dofs: &'a CellBlock,
    constants: &'a CellBlock,
    time: &'a mut TimeData,
}

impl<'a> LocalStep<'a> {
    /// Construct a local step context.
    ///
    /// Called by the scheduler; exposed for kernel unit tests.
    pub fn new(
        info: StepInfo,
        cells: Range<u32>,
        topology: &'a Topology,
        dofs: &'a CellBlock,
        constants: &'a CellBlock,
        time: &'a mut TimeData,
    ) -> Self {
        Self {
            info,
            cells,
            topology,
            dofs,
            constants,
            time,
        }
    }

    /// Step parameters.
    pub fn info(&self) -> &StepInfo {
        &self.info
    }

    /// Cells to integrate.
    pub fn cells(&self) -> impl Iterator<Item = CellId> {
        self.cells.clone().map(CellId)
    }

    /// Frozen layout of a cell.
    pub fn layout(&self, cell: CellId) -> Result<&CellLayout, KernelError> {
        layout_of(self.topology, cell)
    }

    /// Degrees of freedom of a cell at the start of the step.
    pub fn dofs(&self, cell: CellId) -> Result<&[Real], KernelError> {
        let local = self.topology.local_index(cell).map_err(lookup)?;
        Ok(self.dofs.cell(local))
    }

    /// Constant data of a cell.
    pub fn constants(&self, cell: CellId) -> Result<&[Real], KernelError> {
        let local = self.topology.local_index(cell).map_err(lookup)?;
        Ok(self.constants.cell(local))
    }

    /// The cell's buffer or derivative slot, to be filled by the
    /// prediction.
    pub fn time_data_mut(&mut self, cell: CellId) -> Result<(StorageKind, &mut [Real]), KernelError> {
        let slot = self
            .topology
            .slot(cell)
            .ok_or_else(|| lookup(LayoutError::UnknownCell { cell }))?;
        Ok((slot.kind(), self.time.slot_mut(slot)))
    }
}

// ── NeighboringStep ─────────────────────────────────────────────────

/// Context of a correction over the cells of one layer.
pub struct NeighboringStep<'a> {
    info: StepInfo,
    cells: Range<u32>,
    topology: &'a Topology,
    time: &'a TimeData,
    constants: &'a CellBlock,
    sources: &'a [LocatedSource],
    dofs: &'a mut CellBlock,
}

impl<'a> NeighboringStep<'a> {
    /// Construct a neighbouring step context.
    ///
    /// Called by the scheduler; exposed for kernel unit tests.
    pub fn new(
        info: StepInfo,
        cells: Range<u32>,
        topology: &'a Topology,
        time: &'a TimeData,
        constants: &'a CellBlock,
        sources: &'a [LocatedSource],
        dofs: &'a mut CellBlock,
    ) -> Self {
        Self {
            info,
            cells,
            topology,
            time,
            constants,
            sources,
            dofs,
        }
    }

    /// Step parameters.
    pub fn info(&self) -> &StepInfo {
        &self.info
    }

    /// Cells to correct.
    pub fn cells(&self) -> impl Iterator<Item = CellId> {
        self.cells.clone().map(CellId)
    }

    /// Frozen layout of a cell.
    pub fn layout(&self, cell: CellId) -> Result<&CellLayout, KernelError> {
        layout_of(self.topology, cell)
    }

    /// Resolved faces of a cell.
    pub fn face_neighbors(
        &self,
        cell: CellId,
    ) -> Result<&'a [FaceNeighbor; FACES_PER_CELL], KernelError> {
        self.topology.face_neighbors(cell).map_err(lookup)
    }

    /// Time data behind a face, `None` for outflow faces.
    pub fn neighbor_data(&self, face: &FaceNeighbor) -> Option<&[Real]> {
        face.slot().map(|slot| self.time.slot(slot))
    }

    /// The cell's own time data from the preceding prediction.
    pub fn own_time_data(&self, cell: CellId) -> Result<(StorageKind, &[Real]), KernelError> {
        let slot = self
            .topology
            .slot(cell)
            .ok_or_else(|| lookup(LayoutError::UnknownCell { cell }))?;
        Ok((slot.kind(), self.time.slot(slot)))
    }

    /// Constant data of a cell.
    pub fn constants(&self, cell: CellId) -> Result<&[Real], KernelError> {
        let local = self.topology.local_index(cell).map_err(lookup)?;
        Ok(self.constants.cell(local))
    }

    /// Point sources located in the cells of this step.
    ///
    /// Each contributes `amplitudes × time_integral(start, end)` over the
    /// step interval.
    pub fn point_sources(&self) -> &'a [LocatedSource] {
        self.sources
    }

    /// Degrees of freedom of a cell, to be advanced to the end of the
    /// step.
    pub fn dofs_mut(&mut self, cell: CellId) -> Result<&mut [Real], KernelError> {
        let local = self.topology.local_index(cell).map_err(lookup)?;
        Ok(self.dofs.cell_mut(local))
    }
}

// ── Receivers ───────────────────────────────────────────────────────

/// Inputs for sampling one receiver at one point in time.
#[derive(Clone, Copy, Debug)]
pub struct ReceiverView<'a> {
    /// Receiver being sampled.
    pub receiver: ReceiverId,
    /// Cell containing the receiver.
    pub cell: CellId,
    /// Sampling time, within `[start_time, start_time + dt)`.
    pub time: Real,
    /// Start of the current prediction interval.
    pub start_time: Real,
    /// Degrees of freedom at `start_time`.
    pub dofs: &'a [Real],
    /// Representation of `time_data`.
    pub storage: StorageKind,
    /// The cell's buffer or derivatives for the current prediction.
    pub time_data: &'a [Real],
}

// ── Kernels ─────────────────────────────────────────────────────────

/// The numerical kernels driven by the scheduler.
///
/// # Object safety
///
/// This trait is object-safe; the scheduler stores the implementation as
/// `Box<dyn Kernels>`.
///
/// # Example
///
/// ```
/// use strata_core::KernelError;
/// use strata_engine::{Kernels, LocalStep, NeighboringStep};
///
/// struct Idle;
///
/// impl Kernels for Idle {
///     fn local_integration(&self, _step: &mut LocalStep<'_>) -> Result<(), KernelError> {
///         Ok(())
///     }
///
///     fn neighboring_integration(
///         &self,
///         _step: &mut NeighboringStep<'_>,
///     ) -> Result<(), KernelError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Kernels: Send + 'static {
    /// Time prediction: fill the buffer or derivative slot of every cell
    /// in `step` from its degrees of freedom.
    fn local_integration(&self, step: &mut LocalStep<'_>) -> Result<(), KernelError>;

    /// Correction: advance the degrees of freedom of every cell in `step`
    /// using its own and its face neighbours' time data, and add the
    /// contribution of the step's point sources.
    fn neighboring_integration(&self, step: &mut NeighboringStep<'_>) -> Result<(), KernelError>;

    /// Evaluate a receiver. The default records the cell's DOFs at the
    /// start of the interval.
    fn sample_receiver(&self, view: &ReceiverView<'_>) -> Vec<Real> {
        view.dofs.to_vec()
    }
}
