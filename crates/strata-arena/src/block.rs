//! Flat memory blocks with fixed slot sizes.
//!
//! A [`MemoryBlock`] holds every slot of one storage kind. It is sized once
//! from the counted cells, handed out slot by slot in traversal order via
//! bump allocation, and never resized. A [`CellBlock`] is the simpler
//! per-local-cell variant used for degrees of freedom and constant data.

use std::ops::Range;

use strata_core::{Real, StorageKind};

use crate::handle::SlotHandle;

/// One flat allocation of equally sized slots.
///
/// All slots are zero-initialised at creation. The cursor only moves
/// forward; once setup is done the block is full and frozen.
pub struct MemoryBlock {
    kind: StorageKind,
    /// Backing storage, `capacity * slot_len` reals.
    data: Vec<Real>,
    slot_len: u32,
    capacity: u32,
    /// Next free slot.
    cursor: u32,
}

impl MemoryBlock {
    /// Create a zeroed block of `slots` slots of `slot_len` reals each.
    pub fn new(kind: StorageKind, slots: u32, slot_len: u32) -> Self {
        Self {
            kind,
            data: vec![0.0; slots as usize * slot_len as usize],
            slot_len,
            capacity: slots,
            cursor: 0,
        }
    }

    /// Bump-allocate the next slot.
    ///
    /// Returns `None` once every counted slot has been handed out.
    pub fn alloc(&mut self) -> Option<SlotHandle> {
        if self.cursor >= self.capacity {
            return None;
        }
        let handle = SlotHandle::new(
            self.kind,
            slot_offset(self.cursor, self.slot_len),
            self.slot_len,
        );
        self.cursor += 1;
        Some(handle)
    }

    /// Shared view of one slot.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this block.
    pub fn slot(&self, handle: SlotHandle) -> &[Real] {
        debug_assert_eq!(handle.kind(), self.kind);
        &self.data[handle.range()]
    }

    /// Mutable view of one slot.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this block.
    pub fn slot_mut(&mut self, handle: SlotHandle) -> &mut [Real] {
        debug_assert_eq!(handle.kind(), self.kind);
        &mut self.data[handle.range()]
    }

    /// Shared view of a contiguous run of slots.
    pub fn slots(&self, slots: Range<u32>) -> &[Real] {
        &self.data[self.real_range(slots)]
    }

    /// Mutable view of a contiguous run of slots.
    pub fn slots_mut(&mut self, slots: Range<u32>) -> &mut [Real] {
        let range = self.real_range(slots);
        &mut self.data[range]
    }

    fn real_range(&self, slots: Range<u32>) -> Range<usize> {
        let len = self.slot_len as usize;
        slots.start as usize * len..slots.end as usize * len
    }

    /// Storage kind of every slot.
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Reals per slot.
    pub fn slot_len(&self) -> u32 {
        self.slot_len
    }

    /// Number of slots handed out so far.
    pub fn used(&self) -> u32 {
        self.cursor
    }

    /// Number of slots the block was sized for.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether every slot has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.capacity
    }

    /// The whole block.
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<Real>()
    }
}

/// Offset in reals of slot `slot`, computed in `usize`.
fn slot_offset(slot: u32, slot_len: u32) -> usize {
    slot as usize * slot_len as usize
}

/// Fixed-stride storage with one entry per local cell.
pub struct CellBlock {
    data: Vec<Real>,
    stride: u32,
}

impl CellBlock {
    /// Create a zeroed block of `cells` entries of `stride` reals.
    pub fn new(cells: u32, stride: u32) -> Self {
        Self {
            data: vec![0.0; cells as usize * stride as usize],
            stride,
        }
    }

    /// Entry of the local cell with index `local`.
    ///
    /// # Panics
    ///
    /// Panics if `local` is out of range.
    pub fn cell(&self, local: u32) -> &[Real] {
        let start = local as usize * self.stride as usize;
        &self.data[start..start + self.stride as usize]
    }

    /// Mutable entry of the local cell with index `local`.
    ///
    /// # Panics
    ///
    /// Panics if `local` is out of range.
    pub fn cell_mut(&mut self, local: u32) -> &mut [Real] {
        let start = local as usize * self.stride as usize;
        &mut self.data[start..start + self.stride as usize]
    }

    /// Reals per entry.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride as usize
        }
    }

    /// Whether the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole block.
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    /// The whole block, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<Real>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn order_six_offsets_do_not_wrap() {
        // 3.8M derivative slots of 1134 reals run past u32::MAX.
        assert_eq!(slot_offset(3_800_000, 1134), 4_309_200_000);
        assert!(slot_offset(3_800_000, 1134) > u32::MAX as usize);
    }

    #[test]
    fn block_is_zeroed() {
        let block = MemoryBlock::new(StorageKind::Buffer, 4, 3);
        assert_eq!(block.as_slice().len(), 12);
        assert!(block.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sequential_alloc_advances_by_slot_len() {
        let mut block = MemoryBlock::new(StorageKind::Derivatives, 3, 5);
        let a = block.alloc().unwrap();
        let b = block.alloc().unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 5);
        assert_eq!(b.len(), 5);
        assert_eq!(b.kind(), StorageKind::Derivatives);
        assert_eq!(block.used(), 2);
    }

    #[test]
    fn alloc_fails_when_exhausted() {
        let mut block = MemoryBlock::new(StorageKind::Buffer, 1, 4);
        assert!(block.alloc().is_some());
        assert!(block.is_exhausted());
        assert!(block.alloc().is_none());
    }

    #[test]
    fn empty_block_is_exhausted_immediately() {
        let mut block = MemoryBlock::new(StorageKind::Buffer, 0, 4);
        assert!(block.is_exhausted());
        assert!(block.alloc().is_none());
        assert_eq!(block.memory_bytes(), 0);
    }

    #[test]
    fn slot_writes_are_visible_in_slot_ranges() {
        let mut block = MemoryBlock::new(StorageKind::Buffer, 3, 2);
        let _first = block.alloc().unwrap();
        let second = block.alloc().unwrap();
        block.slot_mut(second).copy_from_slice(&[1.0, 2.0]);
        assert_eq!(block.slots(1..3), &[1.0, 2.0, 0.0, 0.0]);
        block.slots_mut(0..1).fill(7.0);
        assert_eq!(block.as_slice()[..2], [7.0, 7.0]);
    }

    #[test]
    fn cell_block_entries_are_disjoint() {
        let mut block = CellBlock::new(3, 2);
        block.cell_mut(1).fill(4.0);
        assert_eq!(block.cell(0), &[0.0, 0.0]);
        assert_eq!(block.cell(1), &[4.0, 4.0]);
        assert_eq!(block.cell(2), &[0.0, 0.0]);
        assert_eq!(block.len(), 3);
    }

    #[test]
    fn zero_stride_cell_block_is_empty() {
        let block = CellBlock::new(10, 0);
        assert!(block.is_empty());
        assert_eq!(block.len(), 0);
    }
}
