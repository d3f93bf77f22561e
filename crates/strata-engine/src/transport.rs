//! Transport implementations.
//!
//! [`NullTransport`] serves single-rank runs and rejects any traffic.
//! [`ChannelTransport`] connects ranks living in one process through
//! crossbeam channels, one per ordered rank pair.

use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use indexmap::IndexMap;
use strata_core::{MessageKey, RankId, Real, Transport, TransportError};

// ── NullTransport ───────────────────────────────────────────────────

/// Transport of a run without remote ranks.
#[derive(Clone, Copy, Debug)]
pub struct NullTransport {
    rank: RankId,
}

impl NullTransport {
    /// Transport for `rank`.
    pub fn new(rank: RankId) -> Self {
        Self { rank }
    }

    fn refuse<T>(&self, key: MessageKey) -> Result<T, TransportError> {
        Err(TransportError::Unsupported {
            reason: format!("single-rank run cannot route message {key}"),
        })
    }
}

impl Transport for NullTransport {
    fn rank(&self) -> RankId {
        self.rank
    }

    fn post_send(&mut self, key: MessageKey, _payload: Vec<Real>) -> Result<(), TransportError> {
        self.refuse(key)
    }

    fn test_send(&mut self, key: MessageKey) -> Result<bool, TransportError> {
        self.refuse(key)
    }

    fn post_receive(&mut self, key: MessageKey, _len: usize) -> Result<(), TransportError> {
        self.refuse(key)
    }

    fn test_receive(&mut self, key: MessageKey) -> Result<Option<Vec<Real>>, TransportError> {
        self.refuse(key)
    }
}

// ── ChannelTransport ────────────────────────────────────────────────

struct Envelope {
    key: MessageKey,
    payload: Vec<Real>,
}

/// In-process transport endpoint of one rank.
///
/// Sends complete as soon as they are posted; the channel buffers the
/// payload. Arriving messages are parked per key until a matching
/// receive is tested, so messages under one key are delivered in order.
pub struct ChannelTransport {
    rank: RankId,
    /// Indexed by target rank.
    outboxes: Vec<Option<Sender<Envelope>>>,
    /// Indexed by source rank.
    inboxes: Vec<Option<Receiver<Envelope>>>,
    arrived: IndexMap<MessageKey, VecDeque<Vec<Real>>>,
    posted: IndexMap<MessageKey, usize>,
}

impl ChannelTransport {
    /// Connected endpoints for `ranks` ranks, indexed by rank.
    pub fn network(ranks: usize) -> Vec<ChannelTransport> {
        let mut endpoints: Vec<ChannelTransport> = (0..ranks)
            .map(|r| ChannelTransport {
                rank: RankId(r as u32),
                outboxes: (0..ranks).map(|_| None).collect(),
                inboxes: (0..ranks).map(|_| None).collect(),
                arrived: IndexMap::new(),
                posted: IndexMap::new(),
            })
            .collect();
        for source in 0..ranks {
            for target in 0..ranks {
                if source == target {
                    continue;
                }
                let (tx, rx) = unbounded();
                endpoints[source].outboxes[target] = Some(tx);
                endpoints[target].inboxes[source] = Some(rx);
            }
        }
        endpoints
    }

    /// Number of ranks in the network.
    pub fn ranks(&self) -> usize {
        self.outboxes.len()
    }

    /// Move everything waiting in the channel from `source` into the
    /// per-key parking area. Returns whether the channel is disconnected.
    fn drain(&mut self, source: RankId) -> Result<bool, TransportError> {
        let inbox = self
            .inboxes
            .get(source.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownRank { rank: source })?;
        loop {
            match inbox.try_recv() {
                Ok(envelope) => self
                    .arrived
                    .entry(envelope.key)
                    .or_default()
                    .push_back(envelope.payload),
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Ok(true),
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> RankId {
        self.rank
    }

    fn post_send(&mut self, key: MessageKey, payload: Vec<Real>) -> Result<(), TransportError> {
        let outbox = self
            .outboxes
            .get(key.target.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownRank { rank: key.target })?;
        outbox
            .send(Envelope { key, payload })
            .map_err(|_| TransportError::Disconnected { rank: key.target })
    }

    fn test_send(&mut self, _key: MessageKey) -> Result<bool, TransportError> {
        Ok(true)
    }

    fn post_receive(&mut self, key: MessageKey, len: usize) -> Result<(), TransportError> {
        if self.posted.contains_key(&key) {
            return Err(TransportError::DuplicateReceive { key });
        }
        self.posted.insert(key, len);
        Ok(())
    }

    fn test_receive(&mut self, key: MessageKey) -> Result<Option<Vec<Real>>, TransportError> {
        let Some(&expected) = self.posted.get(&key) else {
            return Ok(None);
        };
        let disconnected = self.drain(key.source)?;
        match self.arrived.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(payload) => {
                self.posted.shift_remove(&key);
                if payload.len() != expected {
                    return Err(TransportError::LengthMismatch {
                        key,
                        expected,
                        actual: payload.len(),
                    });
                }
                Ok(Some(payload))
            }
            None if disconnected => Err(TransportError::Disconnected { rank: key.source }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::GlobalClusterId;

    fn key(source: u32, target: u32, cluster: u32) -> MessageKey {
        MessageKey {
            source: RankId(source),
            target: RankId(target),
            source_cluster: GlobalClusterId(cluster),
            target_cluster: GlobalClusterId(cluster),
        }
    }

    #[test]
    fn null_transport_refuses_traffic() {
        let mut t = NullTransport::new(RankId(0));
        assert!(t.post_send(key(0, 1, 0), vec![]).is_err());
        assert!(t.post_receive(key(1, 0, 0), 1).is_err());
        assert!(t.test_send(key(0, 1, 0)).is_err());
        assert!(t.test_receive(key(1, 0, 0)).is_err());
    }

    #[test]
    fn messages_match_by_key_in_order() {
        let mut net = ChannelTransport::network(2);
        let mut b = net.pop().unwrap();
        let mut a = net.pop().unwrap();
        assert_eq!(a.rank(), RankId(0));
        assert_eq!(b.ranks(), 2);

        a.post_send(key(0, 1, 1), vec![1.0]).unwrap();
        a.post_send(key(0, 1, 0), vec![2.0, 2.0]).unwrap();
        a.post_send(key(0, 1, 1), vec![3.0]).unwrap();
        assert!(a.test_send(key(0, 1, 1)).unwrap());

        b.post_receive(key(0, 1, 0), 2).unwrap();
        b.post_receive(key(0, 1, 1), 1).unwrap();
        assert_eq!(b.test_receive(key(0, 1, 0)).unwrap(), Some(vec![2.0, 2.0]));
        assert_eq!(b.test_receive(key(0, 1, 1)).unwrap(), Some(vec![1.0]));
        // Not re-posted yet.
        assert_eq!(b.test_receive(key(0, 1, 1)).unwrap(), None);
        b.post_receive(key(0, 1, 1), 1).unwrap();
        assert_eq!(b.test_receive(key(0, 1, 1)).unwrap(), Some(vec![3.0]));
    }

    #[test]
    fn pending_receive_returns_none() {
        let mut net = ChannelTransport::network(2);
        let mut b = net.pop().unwrap();
        b.post_receive(key(0, 1, 0), 3).unwrap();
        assert_eq!(b.test_receive(key(0, 1, 0)).unwrap(), None);
        drop(net);
    }

    #[test]
    fn duplicate_receive_rejected() {
        let mut net = ChannelTransport::network(2);
        let mut b = net.pop().unwrap();
        b.post_receive(key(0, 1, 0), 3).unwrap();
        assert_eq!(
            b.post_receive(key(0, 1, 0), 3),
            Err(TransportError::DuplicateReceive { key: key(0, 1, 0) })
        );
    }

    #[test]
    fn length_mismatch_detected() {
        let mut net = ChannelTransport::network(2);
        let mut b = net.pop().unwrap();
        let mut a = net.pop().unwrap();
        a.post_send(key(0, 1, 0), vec![1.0, 2.0]).unwrap();
        b.post_receive(key(0, 1, 0), 3).unwrap();
        assert!(matches!(
            b.test_receive(key(0, 1, 0)),
            Err(TransportError::LengthMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn dropped_peer_reports_disconnect() {
        let mut net = ChannelTransport::network(2);
        let mut b = net.pop().unwrap();
        drop(net);
        b.post_receive(key(0, 1, 0), 1).unwrap();
        assert_eq!(
            b.test_receive(key(0, 1, 0)),
            Err(TransportError::Disconnected { rank: RankId(0) })
        );
        assert_eq!(
            b.post_send(key(1, 0, 0), vec![1.0]),
            Err(TransportError::Disconnected { rank: RankId(0) })
        );
    }

    #[test]
    fn unknown_rank_rejected() {
        let mut net = ChannelTransport::network(2);
        assert_eq!(
            net[0].post_send(key(0, 5, 0), vec![]),
            Err(TransportError::UnknownRank { rank: RankId(5) })
        );
    }
}
