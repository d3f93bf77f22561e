//! The transport seam used for halo exchange.

use std::fmt;

use crate::error::TransportError;
use crate::id::{GlobalClusterId, RankId, Real};

/// Routing key of one halo message.
///
/// A copy region of cluster `source_cluster` on rank `source` feeds the
/// ghost region of cluster `target_cluster` on rank `target`. Messages
/// with the same key are delivered in the order they were sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    /// Sending rank.
    pub source: RankId,
    /// Receiving rank.
    pub target: RankId,
    /// Global cluster of the sending copy region.
    pub source_cluster: GlobalClusterId,
    /// Global cluster of the receiving ghost region.
    pub target_cluster: GlobalClusterId,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_cluster, self.target, self.target_cluster
        )
    }
}

/// Non-blocking point-to-point transport.
///
/// Every call returns immediately. Completion is observed by polling
/// [`test_send`](Transport::test_send) and
/// [`test_receive`](Transport::test_receive); the scheduler never waits.
///
/// # Object safety
///
/// This trait is object-safe; the scheduler stores the transport as
/// `Box<dyn Transport>` and may move it onto a progress thread.
pub trait Transport: Send + 'static {
    /// Rank this transport endpoint belongs to.
    fn rank(&self) -> RankId;

    /// Start sending `payload` under `key`.
    fn post_send(&mut self, key: MessageKey, payload: Vec<Real>) -> Result<(), TransportError>;

    /// Whether the send posted under `key` has completed.
    ///
    /// Returns `true` when no send is outstanding for `key`.
    fn test_send(&mut self, key: MessageKey) -> Result<bool, TransportError>;

    /// Start receiving a message of `len` reals under `key`.
    fn post_receive(&mut self, key: MessageKey, len: usize) -> Result<(), TransportError>;

    /// Poll the receive posted under `key`.
    ///
    /// Returns the payload exactly once, when it has arrived.
    fn test_receive(&mut self, key: MessageKey) -> Result<Option<Vec<Real>>, TransportError>;
}
