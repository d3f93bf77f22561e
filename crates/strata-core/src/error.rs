//! Error types shared across the Strata workspace.
//!
//! Both enums describe failures of external collaborators: the numerical
//! kernels and the transport. The layout engine and the scheduler wrap
//! them in their own error types.

use std::error::Error;
use std::fmt;

use crate::id::{CellId, RankId};
use crate::traits::MessageKey;

/// Errors reported by the numerical-kernel collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// The kernel failed for a reason of its own.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A non-finite value was produced for a cell.
    NonFinite {
        /// The cell whose data became non-finite.
        cell: CellId,
    },
    /// The kernel found the time data of a neighbour unusable.
    InconsistentNeighbor {
        /// The cell being updated.
        cell: CellId,
        /// The face that was read.
        face: usize,
        /// What was wrong with it.
        reason: String,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "kernel failed: {reason}"),
            Self::NonFinite { cell } => write!(f, "non-finite data in cell {cell}"),
            Self::InconsistentNeighbor { cell, face, reason } => {
                write!(f, "cell {cell} face {face}: {reason}")
            }
        }
    }
}

impl Error for KernelError {}

/// Errors from non-blocking sends and receives.
///
/// All of them are fatal to the run; recovery is a restart from a
/// checkpoint, outside of this core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The peer hung up.
    Disconnected {
        /// Rank that is no longer reachable.
        rank: RankId,
    },
    /// No route to the requested rank.
    UnknownRank {
        /// The rank that was addressed.
        rank: RankId,
    },
    /// A message arrived with a different length than the posted receive.
    LengthMismatch {
        /// Key of the message.
        key: MessageKey,
        /// Length of the posted receive.
        expected: usize,
        /// Length of the payload that arrived.
        actual: usize,
    },
    /// A receive was posted twice without being completed.
    DuplicateReceive {
        /// Key of the receive.
        key: MessageKey,
    },
    /// The transport does not support the requested operation.
    Unsupported {
        /// Description of what was attempted.
        reason: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { rank } => write!(f, "rank {rank} disconnected"),
            Self::UnknownRank { rank } => write!(f, "no route to rank {rank}"),
            Self::LengthMismatch {
                key,
                expected,
                actual,
            } => write!(
                f,
                "message {key}: expected {expected} reals, received {actual}"
            ),
            Self::DuplicateReceive { key } => {
                write!(f, "receive for message {key} posted twice")
            }
            Self::Unsupported { reason } => write!(f, "unsupported transport operation: {reason}"),
        }
    }
}

impl Error for TransportError {}
