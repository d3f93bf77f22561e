//! Slot sizes of the layout engine.

use crate::error::LayoutError;

/// Per-cell storage sizes, in reals.
///
/// Mirrors the generated kernels' aligned sizes: a buffer slot holds one
/// set of time-integrated degrees of freedom, a derivative slot holds the
/// full Taylor expansion of the time prediction. Validated at construction
/// of the [`MemoryLayout`](crate::MemoryLayout); immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Reals per degree-of-freedom set (`DOFS`). Also the buffer slot size.
    pub dofs_len: u32,

    /// Reals per derivative slot (`DERS`).
    ///
    /// Must be at least `dofs_len`: the zeroth derivative is the state.
    pub derivatives_len: u32,

    /// Reals of cell-local constant data (star matrices, flux solvers).
    pub local_data_len: u32,

    /// Reals of neighbour constant data (neighbouring flux solvers).
    pub neighbor_data_len: u32,
}

impl ArenaConfig {
    /// Default convergence order of the discretisation.
    pub const DEFAULT_ORDER: u32 = 6;

    /// Default number of physical quantities (elastic: 6 stresses + 3 velocities).
    pub const DEFAULT_QUANTITIES: u32 = 9;

    /// Default reals of local constant data per cell.
    pub const DEFAULT_LOCAL_DATA: u32 = 567;

    /// Default reals of neighbour constant data per cell.
    pub const DEFAULT_NEIGHBOR_DATA: u32 = 324;

    /// Sizes for an ADER-DG discretisation of the given order.
    ///
    /// A tetrahedral basis of order `o` has `o(o+1)(o+2)/6` functions.
    /// The k-th time derivative is represented in the basis of order
    /// `order - k`, so the derivative slot stacks all of them.
    pub fn for_order(order: u32, quantities: u32) -> Self {
        let basis = |o: u32| o * (o + 1) * (o + 2) / 6;
        let derivatives: u32 = (1..=order).map(basis).sum();
        Self {
            dofs_len: basis(order) * quantities,
            derivatives_len: derivatives * quantities,
            local_data_len: Self::DEFAULT_LOCAL_DATA,
            neighbor_data_len: Self::DEFAULT_NEIGHBOR_DATA,
        }
    }

    /// Explicit slot sizes, mostly useful for tests.
    pub fn with_sizes(dofs_len: u32, derivatives_len: u32) -> Self {
        Self {
            dofs_len,
            derivatives_len,
            local_data_len: 0,
            neighbor_data_len: 0,
        }
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.dofs_len == 0 {
            return Err(LayoutError::InvalidConfig {
                reason: "dofs_len must be at least 1".into(),
            });
        }
        if self.derivatives_len < self.dofs_len {
            return Err(LayoutError::InvalidConfig {
                reason: format!(
                    "derivatives_len {} is smaller than dofs_len {}",
                    self.derivatives_len, self.dofs_len
                ),
            });
        }
        Ok(())
    }

    /// Constant-data reals per local cell.
    pub fn constant_len(&self) -> u32 {
        self.local_data_len + self.neighbor_data_len
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::for_order(Self::DEFAULT_ORDER, Self::DEFAULT_QUANTITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_order_six_elastic() {
        let config = ArenaConfig::default();
        assert_eq!(config.dofs_len, 56 * 9);
        assert_eq!(config.derivatives_len, (56 + 35 + 20 + 10 + 4 + 1) * 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn order_one_derivatives_equal_dofs() {
        let config = ArenaConfig::for_order(1, 3);
        assert_eq!(config.dofs_len, 3);
        assert_eq!(config.derivatives_len, 3);
    }

    #[test]
    fn zero_dofs_rejected() {
        let config = ArenaConfig::with_sizes(0, 4);
        assert!(matches!(
            config.validate(),
            Err(LayoutError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn derivatives_smaller_than_dofs_rejected() {
        let config = ArenaConfig::with_sizes(8, 4);
        assert!(config.validate().is_err());
    }
}
