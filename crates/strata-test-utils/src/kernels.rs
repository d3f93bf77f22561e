//! Kernel doubles for scheduler tests.
//!
//! - [`AnalyticKernels`]: integrates the flux `f(t) = t` exactly, so the
//!   final DOFs reveal whether every neighbour was read at the right time.
//! - [`RecordingKernels`]: records the [`StepInfo`] of every call.
//! - [`NoopKernels`]: does nothing.
//! - [`FailAfter`]: fails deterministically after N successful calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use strata_arena::{FaceNeighbor, FaceRelation};
use strata_core::{CellId, KernelError, Real, StorageKind};
use strata_engine::{Kernels, LocalStep, NeighboringStep, StepInfo};

// ── AnalyticKernels ─────────────────────────────────────────────────

/// Exact time integration of the flux `f(t) = t`.
///
/// A buffer slot holds `[∫ over the last step, ∫ accumulated since the
/// last reset]`. A derivative slot holds the Taylor expansion
/// `[value, slope, expansion point]`. The correction adds, for every face
/// with a slot, the integral of the neighbour's flux over the cell's own
/// step to `dofs[0]`; a cell with `n` flux faces ends at `n * T^2 / 2`
/// when started from zero at time zero. Point sources add
/// `amplitudes[0]` times their slip-rate integral over the step.
///
/// Requires slots of at least 2 (buffers) and 3 (derivatives) reals.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnalyticKernels;

impl AnalyticKernels {
    /// Flux contribution of `t` over `[a, b]`.
    pub fn integral(a: Real, b: Real) -> Real {
        (b * b - a * a) / 2.0
    }

    /// Expected `dofs[0]` of a cell with `faces` flux faces after
    /// integrating from `start` to `end`.
    pub fn expected(faces: u32, start: Real, end: Real) -> Real {
        Real::from(faces) * Self::integral(start, end)
    }

    fn face_flux(
        step: &NeighboringStep<'_>,
        cell: CellId,
        face: usize,
        neighbor: &FaceNeighbor,
    ) -> Result<Real, KernelError> {
        let FaceNeighbor::Slot { slot, relation, .. } = neighbor else {
            return Ok(0.0);
        };
        let info = step.info();
        let data = step.neighbor_data(neighbor).unwrap_or(&[]);
        let inconsistent = |reason: String| KernelError::InconsistentNeighbor {
            cell,
            face,
            reason,
        };
        match (slot.kind(), relation) {
            (StorageKind::Buffer, FaceRelation::Same) => Ok(data[0]),
            (StorageKind::Buffer, FaceRelation::Finer) => Ok(data[1]),
            (StorageKind::Buffer, FaceRelation::Coarser) => Err(inconsistent(
                "coarser neighbour provides a buffer".to_string(),
            )),
            (StorageKind::Derivatives, _) => {
                let (value, slope, expansion) = (data[0], data[1], data[2]);
                if *relation == FaceRelation::Coarser {
                    let interval_start = info.start_time - info.sub_time_start;
                    if (expansion - interval_start).abs() > 1e-9 * interval_start.abs().max(1.0) {
                        return Err(inconsistent(format!(
                            "derivatives expanded at {expansion}, interval starts at {interval_start}"
                        )));
                    }
                }
                let (a, b) = (info.start_time, info.end_time());
                Ok(value * (b - a)
                    + slope * ((b - expansion).powi(2) - (a - expansion).powi(2)) / 2.0)
            }
        }
    }
}

impl Kernels for AnalyticKernels {
    fn local_integration(&self, step: &mut LocalStep<'_>) -> Result<(), KernelError> {
        let info = *step.info();
        let (t0, t1) = (info.start_time, info.end_time());
        let cells: Vec<CellId> = step.cells().collect();
        for cell in cells {
            let (kind, data) = step.time_data_mut(cell)?;
            match kind {
                StorageKind::Buffer => {
                    if info.reset_lts_buffers {
                        data[1] = 0.0;
                    }
                    data[0] = Self::integral(t0, t1);
                    data[1] += data[0];
                }
                StorageKind::Derivatives => {
                    data[0] = t0;
                    data[1] = 1.0;
                    data[2] = t0;
                }
            }
        }
        Ok(())
    }

    fn neighboring_integration(&self, step: &mut NeighboringStep<'_>) -> Result<(), KernelError> {
        let cells: Vec<CellId> = step.cells().collect();
        for cell in cells {
            let faces = step.face_neighbors(cell)?;
            let mut flux = 0.0;
            for (face, neighbor) in faces.iter().enumerate() {
                flux += Self::face_flux(step, cell, face, neighbor)?;
            }
            if !flux.is_finite() {
                return Err(KernelError::NonFinite { cell });
            }
            step.dofs_mut(cell)?[0] += flux;
        }
        let (t0, t1) = (step.info().start_time, step.info().end_time());
        for located in step.point_sources() {
            let amplitude = located.source.amplitudes.first().copied().unwrap_or(0.0);
            step.dofs_mut(located.cell)?[0] += amplitude * located.source.time_integral(t0, t1);
        }
        Ok(())
    }
}

// ── RecordingKernels ────────────────────────────────────────────────

/// Which kernel was called.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Prediction.
    Local,
    /// Correction.
    Neighboring,
}

/// One recorded kernel call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Call {
    pub phase: Phase,
    pub info: StepInfo,
}

/// Records every call, in order, behind a shared log.
///
/// Clone the log with [`RecordingKernels::log`] before boxing the kernels
/// into a `TimeManager`.
#[derive(Clone, Debug, Default)]
pub struct RecordingKernels {
    log: Arc<Mutex<Vec<Call>>>,
}

impl RecordingKernels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the call log.
    pub fn log(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.log)
    }

    /// Snapshot of the calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, phase: Phase, info: StepInfo) -> Result<(), KernelError> {
        let mut log = self.log.lock().map_err(|_| KernelError::ExecutionFailed {
            reason: "call log poisoned".to_string(),
        })?;
        log.push(Call { phase, info });
        Ok(())
    }
}

impl Kernels for RecordingKernels {
    fn local_integration(&self, step: &mut LocalStep<'_>) -> Result<(), KernelError> {
        self.record(Phase::Local, *step.info())
    }

    fn neighboring_integration(&self, step: &mut NeighboringStep<'_>) -> Result<(), KernelError> {
        self.record(Phase::Neighboring, *step.info())
    }
}

// ── NoopKernels ─────────────────────────────────────────────────────

/// Leaves DOFs and time data untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopKernels;

impl Kernels for NoopKernels {
    fn local_integration(&self, _step: &mut LocalStep<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    fn neighboring_integration(&self, _step: &mut NeighboringStep<'_>) -> Result<(), KernelError> {
        Ok(())
    }
}

// ── FailAfter ───────────────────────────────────────────────────────

/// Succeeds `succeed_count` times, counting both phases, then fails
/// every call.
///
/// Uses `AtomicUsize` for the call counter so it satisfies `Send`.
#[derive(Debug)]
pub struct FailAfter {
    pub succeed_count: usize,
    call_count: AtomicUsize,
}

impl FailAfter {
    pub fn new(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many kernel calls were made.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn tick(&self) -> Result<(), KernelError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(KernelError::ExecutionFailed {
                reason: format!("failed on call {}", n + 1),
            });
        }
        Ok(())
    }
}

impl Kernels for FailAfter {
    fn local_integration(&self, _step: &mut LocalStep<'_>) -> Result<(), KernelError> {
        self.tick()
    }

    fn neighboring_integration(&self, _step: &mut NeighboringStep<'_>) -> Result<(), KernelError> {
        self.tick()
    }
}
