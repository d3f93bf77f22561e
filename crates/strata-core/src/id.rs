//! Strongly-typed identifiers and the [`Real`] scalar alias.

use std::fmt;

/// Floating-point type of every degree of freedom, buffer and derivative.
pub type Real = f64;

/// Identifies a time cluster on the local rank.
///
/// Local ids are dense: `ClusterId(n)` is the n-th cluster handed to the
/// scheduler, in ascending global order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub u32);

impl ClusterId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClusterId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a time cluster across all ranks.
///
/// Global ids order clusters by time-step width: `GlobalClusterId(0)` is
/// the coarsest cluster, and every increment halves (or otherwise divides)
/// the width by an integer rate. A larger id is therefore a finer cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalClusterId(pub u32);

impl GlobalClusterId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GlobalClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for GlobalClusterId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of a cell in the concatenated cell array of the local rank.
///
/// The array is laid out cluster by cluster; within a cluster the ghost
/// cells come first, then the copy cells, then the interior cells. Face
/// neighbour ids in [`CellInfo`](crate::CellInfo) refer to this index space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl CellId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CellId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a rank (process) taking part in the halo exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RankId(pub u32);

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RankId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifier a simulation driver assigns to a receiver (seismometer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(pub u32);

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ReceiverId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifier a simulation driver assigns to a point source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SourceId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_ids_order_coarse_before_fine() {
        let coarse = GlobalClusterId(0);
        let fine = GlobalClusterId(2);
        assert!(coarse < fine);
        assert_eq!(fine.index(), 2);
    }

    #[test]
    fn display_prints_raw_value() {
        assert_eq!(ClusterId(3).to_string(), "3");
        assert_eq!(CellId::from(17).to_string(), "17");
        assert_eq!(RankId(1).to_string(), "1");
    }
}
