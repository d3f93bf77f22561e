//! Slot handles and resolved face neighbours.
//!
//! A [`SlotHandle`] encodes where a cell's time data lives: which block,
//! the offset into that block, and the slot length. Handles are plain
//! values; the [`MemoryLayout`](crate::MemoryLayout) owns the storage.

use std::fmt;
use std::ops::Range;

use strata_core::{CellId, StorageKind};

/// Location of one cell's buffer or derivative slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct SlotHandle {
    /// Block the slot lives in.
    pub(crate) kind: StorageKind,
    /// Offset of the first real within the block.
    pub(crate) offset: usize,
    /// Length of the slot in reals.
    pub(crate) len: u32,
}

impl SlotHandle {
    pub(crate) fn new(kind: StorageKind, offset: usize, len: u32) -> Self {
        Self { kind, offset, len }
    }

    /// Block the slot lives in.
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Offset of the first real within the block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the slot in reals.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether the slot holds no reals.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Range of the slot within its block.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len as usize
    }

    /// Whether two slots share any real.
    pub fn overlaps(&self, other: &SlotHandle) -> bool {
        self.kind == other.kind
            && self.offset < other.offset + other.len as usize
            && other.offset < self.offset + self.len as usize
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SlotHandle({:?}, off={}, len={})",
            self.kind, self.offset, self.len
        )
    }
}

/// Time-step relation between a cell and the neighbour across a face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaceRelation {
    /// Both cells advance with the same width.
    Same,
    /// The neighbour advances with a larger width.
    Coarser,
    /// The neighbour advances with a smaller width.
    Finer,
}

/// Resolved time-data source of one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceNeighbor {
    /// Outflow boundary: the flux term is absent.
    Absent,
    /// Flux is evaluated against `slot`, owned by `cell`.
    ///
    /// For free-surface faces `cell` is the cell itself.
    Slot {
        /// Cell owning the slot.
        cell: CellId,
        /// The buffer or derivative slot.
        slot: SlotHandle,
        /// Time-step relation to the owner of the slot.
        relation: FaceRelation,
    },
}

impl FaceNeighbor {
    /// The slot, if the face has one.
    pub fn slot(&self) -> Option<SlotHandle> {
        match self {
            Self::Absent => None,
            Self::Slot { slot, .. } => Some(*slot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_accessors() {
        let h = SlotHandle::new(StorageKind::Derivatives, 30, 10);
        assert_eq!(h.kind(), StorageKind::Derivatives);
        assert_eq!(h.offset(), 30);
        assert_eq!(h.len(), 10);
        assert_eq!(h.range(), 30..40);
        assert!(!h.is_empty());
    }

    #[test]
    fn adjacent_slots_do_not_overlap() {
        let a = SlotHandle::new(StorageKind::Buffer, 0, 8);
        let b = SlotHandle::new(StorageKind::Buffer, 8, 8);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn slots_in_different_blocks_never_overlap() {
        let a = SlotHandle::new(StorageKind::Buffer, 0, 8);
        let b = SlotHandle::new(StorageKind::Derivatives, 0, 8);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn shared_real_is_overlap() {
        let a = SlotHandle::new(StorageKind::Buffer, 0, 8);
        let b = SlotHandle::new(StorageKind::Buffer, 7, 8);
        assert!(a.overlaps(&b));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn offsets_beyond_u32_keep_slots_apart() {
        let base = u32::MAX as usize;
        let a = SlotHandle::new(StorageKind::Derivatives, base - 4, 1134);
        let b = SlotHandle::new(StorageKind::Derivatives, base + 1130, 1134);
        assert_eq!(a.range().end, b.offset());
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn absent_face_has_no_slot() {
        assert_eq!(FaceNeighbor::Absent.slot(), None);
        let slot = SlotHandle::new(StorageKind::Buffer, 4, 4);
        let face = FaceNeighbor::Slot {
            cell: CellId(1),
            slot,
            relation: FaceRelation::Same,
        };
        assert_eq!(face.slot(), Some(slot));
    }
}
