//! Point sources.
//!
//! A point source injects `amplitudes × ∫ s(t) dt` into the DOFs of its
//! cell, where `s` is a sampled slip-rate time function. Sources are
//! distributed to the cluster owning their cell and handed to the kernels
//! with every correction of that cell's layer: the correction is the only
//! step that writes DOFs.

use strata_arena::Layer;
use strata_core::{CellId, Real, SourceId};

use crate::config::ConfigError;

/// A point source as supplied by the simulation driver.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSource {
    /// Source id.
    pub id: SourceId,
    /// Mesh id of the cell containing the source.
    pub mesh_id: usize,
    /// Per-quantity scaling of the time integral, interpreted by the
    /// kernels.
    pub amplitudes: Vec<Real>,
    /// Time of the first slip-rate sample.
    pub onset_time: Real,
    /// Spacing of the slip-rate samples.
    pub sampling_interval: Real,
    /// Slip-rate samples, linearly interpolated. Zero outside their span.
    pub slip_rates: Vec<Real>,
}

impl PointSource {
    /// Check that the time function and amplitudes are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reject = |reason| ConfigError::InvalidPointSource {
            id: self.id,
            reason,
        };
        if self.amplitudes.is_empty() {
            return Err(reject("no amplitudes"));
        }
        if self.slip_rates.len() < 2 {
            return Err(reject("fewer than two slip-rate samples"));
        }
        if !(self.sampling_interval.is_finite() && self.sampling_interval > 0.0) {
            return Err(reject("sampling interval must be finite and positive"));
        }
        let finite = |v: &Real| v.is_finite();
        if !self.onset_time.is_finite()
            || !self.amplitudes.iter().all(finite)
            || !self.slip_rates.iter().all(finite)
        {
            return Err(reject("non-finite value"));
        }
        Ok(())
    }

    /// End of the last slip-rate sample.
    pub fn end_time(&self) -> Real {
        self.onset_time + self.slip_rates.len().saturating_sub(1) as Real * self.sampling_interval
    }

    /// Integral of the slip rate over `[from, to]`.
    ///
    /// Exact for the piecewise linear interpolant, so integrals over
    /// adjacent intervals add up to the integral over their union.
    pub fn time_integral(&self, from: Real, to: Real) -> Real {
        let segments = self.slip_rates.len().saturating_sub(1);
        if to <= from || segments == 0 {
            return 0.0;
        }
        let dt = self.sampling_interval;
        let first = ((from - self.onset_time) / dt).floor().max(0.0) as usize;
        let last = (((to - self.onset_time) / dt).ceil().max(0.0) as usize).min(segments);

        let mut integral = 0.0;
        for k in first..last {
            let t0 = self.onset_time + k as Real * dt;
            let lo = from.max(t0);
            let hi = to.min(t0 + dt);
            if hi <= lo {
                continue;
            }
            let (a, b) = (self.slip_rates[k], self.slip_rates[k + 1]);
            let at = |t: Real| a + (b - a) * (t - t0) / dt;
            integral += 0.5 * (at(lo) + at(hi)) * (hi - lo);
        }
        integral
    }
}

/// A point source resolved to its cell.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatedSource {
    /// Cell containing the source.
    pub cell: CellId,
    /// The source.
    pub source: PointSource,
}

/// Point sources of one cluster, split by the layer of their cell.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClusterSources {
    copy: Vec<LocatedSource>,
    interior: Vec<LocatedSource>,
}

impl ClusterSources {
    /// File `source` under `layer`. Ghost cells carry no sources.
    pub fn push(&mut self, layer: Layer, source: LocatedSource) -> bool {
        match layer {
            Layer::Copy => self.copy.push(source),
            Layer::Interior => self.interior.push(source),
            Layer::Ghost => return false,
        }
        true
    }

    pub fn layer(&self, layer: Layer) -> &[LocatedSource] {
        match layer {
            Layer::Copy => &self.copy,
            Layer::Interior => &self.interior,
            Layer::Ghost => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatedSource> {
        self.copy.iter().chain(&self.interior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> PointSource {
        // 0 at t = 1, 2 at t = 2, back to 0 at t = 3.
        PointSource {
            id: SourceId(0),
            mesh_id: 0,
            amplitudes: vec![1.0],
            onset_time: 1.0,
            sampling_interval: 1.0,
            slip_rates: vec![0.0, 2.0, 0.0],
        }
    }

    #[test]
    fn integral_of_triangle() {
        let s = ramp();
        assert_eq!(s.end_time(), 3.0);
        assert!((s.time_integral(0.0, 10.0) - 2.0).abs() < 1e-12);
        assert!((s.time_integral(1.0, 2.0) - 1.0).abs() < 1e-12);
        assert!((s.time_integral(1.5, 2.5) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn nothing_outside_the_samples() {
        let s = ramp();
        assert_eq!(s.time_integral(-5.0, 1.0), 0.0);
        assert_eq!(s.time_integral(3.0, 9.0), 0.0);
        assert_eq!(s.time_integral(2.0, 2.0), 0.0);
    }

    #[test]
    fn adjacent_intervals_add_up() {
        let s = ramp();
        let whole = s.time_integral(0.3, 2.9);
        let split: Real = [0.3, 0.9, 1.25, 1.7, 2.2, 2.9]
            .windows(2)
            .map(|w| s.time_integral(w[0], w[1]))
            .sum();
        assert!((whole - split).abs() < 1e-12);
    }

    #[test]
    fn unusable_sources_rejected() {
        let mut s = ramp();
        s.slip_rates.truncate(1);
        assert!(matches!(
            s.validate(),
            Err(ConfigError::InvalidPointSource { .. })
        ));

        let mut s = ramp();
        s.sampling_interval = 0.0;
        assert!(s.validate().is_err());

        let mut s = ramp();
        s.amplitudes[0] = Real::NAN;
        assert!(s.validate().is_err());

        assert!(ramp().validate().is_ok());
    }

    #[test]
    fn ghost_layer_takes_no_sources() {
        let mut set = ClusterSources::default();
        let located = LocatedSource {
            cell: CellId(3),
            source: ramp(),
        };
        assert!(!set.push(Layer::Ghost, located.clone()));
        assert!(set.push(Layer::Interior, located));
        assert_eq!(set.layer(Layer::Interior).len(), 1);
        assert!(set.layer(Layer::Copy).is_empty());
        assert_eq!(set.iter().count(), 1);
    }
}
