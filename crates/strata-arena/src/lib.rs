//! Memory layout engine for clustered local time-stepping.
//!
//! Partitions the cells of every time cluster into ghost, copy and
//! interior layers, decides per cell whether a time-integrated buffer or a
//! set of time derivatives is stored, and places all of it in flat,
//! never-resized blocks addressed through [`SlotHandle`]s.
//!
//! # Architecture
//!
//! ```text
//! MemoryLayout (built once by MemoryLayout::new)
//! ├── Topology (read-only after setup)
//! │   ├── ClusterCells × clusters   ghost | copy | interior ranges
//! │   ├── CellLayout × cells        frozen storage kind + faces
//! │   ├── SlotHandle × cells        one slot per cell
//! │   ├── [FaceNeighbor; 4] × local cells
//! │   └── ClusterExchange × clusters per-region message descriptors
//! ├── TimeData
//! │   ├── MemoryBlock (Buffer)      DOFS reals per slot
//! │   └── MemoryBlock (Derivatives) DERS reals per slot
//! ├── CellBlock (dofs)              DOFS reals per local cell
//! └── CellBlock (constants)         local + neighbour data per local cell
//! ```
//!
//! # Setup passes
//!
//! | Pass | Module |
//! |------|--------|
//! | `set_up_layers` | [`layers`] |
//! | `correct_ghost_region_setups` | [`layers`] |
//! | `derive_layer_layouts` | [`layers`] |
//! | `allocate_constant_data` | [`layout`] |
//! | `allocate_internal_state` | [`layout`] |
//! | `initialize_face_neighbors` | [`faces`] |
//! | `initialize_communication_structure` | [`exchange`] |
//!
//! Slots are handed out in cell order, so every ghost and copy region is a
//! contiguous run of slots in each block and the slots tile each block
//! exactly.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod config;
pub mod error;
pub mod exchange;
pub mod faces;
pub mod handle;
pub mod layers;
pub mod layout;

// Public re-exports for the primary API surface.
pub use block::{CellBlock, MemoryBlock};
pub use config::ArenaConfig;
pub use error::LayoutError;
pub use exchange::{ClusterExchange, LayerExchange, RegionExchange, RegionKey};
pub use handle::{FaceNeighbor, FaceRelation, SlotHandle};
pub use layers::{ClusterCells, ClusterCounts, Layer, LayerCounts, SlotCounts};
pub use layout::{LayoutParts, MemoryLayout, TimeData, Topology};
