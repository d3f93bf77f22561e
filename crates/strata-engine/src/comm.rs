//! Communication overlap.
//!
//! Every cluster tracks its own outstanding sends and receives in an
//! [`Outstanding`] record. [`Comm`] makes progress on them in one of two
//! ways:
//!
//! - **Inline:** the control thread tests the transport directly each time
//!   a copy-queue item is polled.
//! - **Thread:** a progress thread owns the transport. Requests reach it
//!   through one channel; completions come back through one channel per
//!   cluster, so a cluster only ever sees its own traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use smallvec::SmallVec;
use strata_core::{ClusterId, MessageKey, Real, Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::config::ConfigError;
use crate::scheduler::SchedulerError;

// ── Outstanding ─────────────────────────────────────────────────────

/// Requests a cluster has posted and not yet seen complete.
#[derive(Debug, Default)]
pub(crate) struct Outstanding {
    pub sends: SmallVec<[MessageKey; 4]>,
    /// `(ghost region, key)`.
    pub receives: SmallVec<[(usize, MessageKey); 4]>,
    /// Completed receives whose payload has not been scattered yet.
    pub arrived: Vec<(usize, Vec<Real>)>,
}

impl Outstanding {
    fn complete_receive(&mut self, region: usize, key: MessageKey, payload: Vec<Real>) {
        if let Some(pos) = self
            .receives
            .iter()
            .position(|&(r, k)| r == region && k == key)
        {
            self.receives.remove(pos);
        }
        self.arrived.push((region, payload));
    }
}

// ── Messages to and from the progress thread ───────────────────────

pub(crate) enum CommRequest {
    Send {
        cluster: ClusterId,
        key: MessageKey,
        payload: Vec<Real>,
    },
    Receive {
        cluster: ClusterId,
        region: usize,
        key: MessageKey,
        len: usize,
    },
}

pub(crate) enum Completion {
    Sent {
        key: MessageKey,
    },
    Received {
        region: usize,
        key: MessageKey,
        payload: Vec<Real>,
    },
    Failed(TransportError),
}

// ── Comm ────────────────────────────────────────────────────────────

/// Current owner of the transport.
pub(crate) enum Comm {
    Inline(Box<dyn Transport>),
    Thread(CommThread),
    /// The progress thread died and took the transport with it.
    Lost,
}

impl Comm {
    pub fn is_thread(&self) -> bool {
        matches!(self, Self::Thread(_))
    }

    pub fn post_send(
        &mut self,
        cluster: ClusterId,
        pending: &mut Outstanding,
        key: MessageKey,
        payload: Vec<Real>,
    ) -> Result<(), SchedulerError> {
        trace!(%cluster, %key, len = payload.len(), "post send");
        match self {
            Self::Inline(transport) => transport.post_send(key, payload)?,
            Self::Thread(thread) => thread.request(CommRequest::Send {
                cluster,
                key,
                payload,
            })?,
            Self::Lost => return Err(SchedulerError::CommThreadDisconnected),
        }
        pending.sends.push(key);
        Ok(())
    }

    pub fn post_receive(
        &mut self,
        cluster: ClusterId,
        pending: &mut Outstanding,
        region: usize,
        key: MessageKey,
        len: usize,
    ) -> Result<(), SchedulerError> {
        trace!(%cluster, %key, len, "post receive");
        match self {
            Self::Inline(transport) => transport.post_receive(key, len)?,
            Self::Thread(thread) => thread.request(CommRequest::Receive {
                cluster,
                region,
                key,
                len,
            })?,
            Self::Lost => return Err(SchedulerError::CommThreadDisconnected),
        }
        pending.receives.push((region, key));
        Ok(())
    }

    /// Collect whatever completed for `cluster`.
    pub fn progress(
        &mut self,
        cluster: ClusterId,
        pending: &mut Outstanding,
    ) -> Result<(), SchedulerError> {
        match self {
            Self::Inline(transport) => {
                let mut i = 0;
                while i < pending.sends.len() {
                    if transport.test_send(pending.sends[i])? {
                        pending.sends.swap_remove(i);
                    } else {
                        i += 1;
                    }
                }
                let mut i = 0;
                while i < pending.receives.len() {
                    let (region, key) = pending.receives[i];
                    match transport.test_receive(key)? {
                        Some(payload) => pending.complete_receive(region, key, payload),
                        None => i += 1,
                    }
                }
                Ok(())
            }
            Self::Thread(thread) => thread.collect(cluster, pending),
            Self::Lost if pending.sends.is_empty() && pending.receives.is_empty() => Ok(()),
            Self::Lost => Err(SchedulerError::CommThreadDisconnected),
        }
    }
}

// ── CommThread ──────────────────────────────────────────────────────

/// Handle to a running progress thread.
///
/// Dropping the handle stops and joins the thread; an explicit
/// [`stop`](CommThread::stop) also returns the transport.
pub(crate) struct CommThread {
    requests: Sender<CommRequest>,
    completions: Vec<Receiver<Completion>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn Transport>>>,
}

impl CommThread {
    pub fn spawn(transport: Box<dyn Transport>, clusters: usize) -> Result<Self, ConfigError> {
        let (requests, request_rx) = unbounded();
        let (completion_txs, completions): (Vec<_>, Vec<_>) =
            (0..clusters).map(|_| unbounded()).unzip();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = CommWorker {
            transport,
            requests: request_rx,
            completions: completion_txs,
            stop: Arc::clone(&stop),
            sends: Vec::new(),
            receives: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name("strata-comm".into())
            .spawn(move || worker.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("communication thread: {e}"),
            })?;
        debug!(clusters, "communication thread started");
        Ok(Self {
            requests,
            completions,
            stop,
            handle: Some(handle),
        })
    }

    fn request(&self, request: CommRequest) -> Result<(), SchedulerError> {
        self.requests
            .send(request)
            .map_err(|_| SchedulerError::CommThreadDisconnected)
    }

    pub fn collect(
        &self,
        cluster: ClusterId,
        pending: &mut Outstanding,
    ) -> Result<(), SchedulerError> {
        let rx = self
            .completions
            .get(cluster.index())
            .ok_or(SchedulerError::CommThreadDisconnected)?;
        loop {
            match rx.try_recv() {
                Ok(Completion::Sent { key }) => {
                    if let Some(pos) = pending.sends.iter().position(|&k| k == key) {
                        pending.sends.remove(pos);
                    }
                }
                Ok(Completion::Received {
                    region,
                    key,
                    payload,
                }) => pending.complete_receive(region, key, payload),
                Ok(Completion::Failed(e)) => return Err(e.into()),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    if pending.sends.is_empty() && pending.receives.is_empty() {
                        return Ok(());
                    }
                    return Err(SchedulerError::CommThreadDisconnected);
                }
            }
        }
    }

    /// Signal the thread, wait for it to flush outstanding sends, and
    /// take the transport back.
    ///
    /// Completions posted before the thread exited stay available to
    /// [`collect`](Self::collect) until the handle is dropped.
    pub fn stop(&mut self) -> Result<Box<dyn Transport>, SchedulerError> {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .handle
            .take()
            .ok_or(SchedulerError::CommThreadDisconnected)?;
        let transport = handle
            .join()
            .map_err(|_| SchedulerError::CommThreadDisconnected)?;
        debug!("communication thread stopped");
        Ok(transport)
    }
}

impl Drop for CommThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("communication thread still running at drop; stopping it");
            self.stop.store(true, Ordering::Release);
            let _ = handle.join();
        }
    }
}

// ── CommWorker ──────────────────────────────────────────────────────

/// State owned by the progress thread.
struct CommWorker {
    transport: Box<dyn Transport>,
    requests: Receiver<CommRequest>,
    completions: Vec<Sender<Completion>>,
    stop: Arc<AtomicBool>,
    sends: Vec<(ClusterId, MessageKey)>,
    receives: Vec<(ClusterId, usize, MessageKey)>,
}

impl CommWorker {
    /// Progress loop. Runs until stopped and every send has completed,
    /// then hands the transport back through the join handle.
    fn run(mut self) -> Box<dyn Transport> {
        loop {
            let stopping = self.stop.load(Ordering::Acquire);

            // 1. Post new requests.
            let mut progressed = self.drain_requests();

            // 2. Test outstanding requests.
            progressed |= self.poll_sends();
            progressed |= self.poll_receives();

            if stopping && self.sends.is_empty() {
                if !self.receives.is_empty() {
                    warn!(
                        receives = self.receives.len(),
                        "communication thread stopped with receives outstanding"
                    );
                }
                break;
            }
            if !progressed {
                thread::yield_now();
            }
        }
        self.transport
    }

    fn notify(&self, cluster: ClusterId, completion: Completion) {
        if let Some(tx) = self.completions.get(cluster.index()) {
            // The scheduler may already be gone during shutdown.
            let _ = tx.send(completion);
        }
    }

    fn drain_requests(&mut self) -> bool {
        let mut progressed = false;
        while let Ok(request) = self.requests.try_recv() {
            progressed = true;
            match request {
                CommRequest::Send {
                    cluster,
                    key,
                    payload,
                } => match self.transport.post_send(key, payload) {
                    Ok(()) => self.sends.push((cluster, key)),
                    Err(e) => self.notify(cluster, Completion::Failed(e)),
                },
                CommRequest::Receive {
                    cluster,
                    region,
                    key,
                    len,
                } => match self.transport.post_receive(key, len) {
                    Ok(()) => self.receives.push((cluster, region, key)),
                    Err(e) => self.notify(cluster, Completion::Failed(e)),
                },
            }
        }
        progressed
    }

    fn poll_sends(&mut self) -> bool {
        let mut progressed = false;
        let mut i = 0;
        while i < self.sends.len() {
            let (cluster, key) = self.sends[i];
            match self.transport.test_send(key) {
                Ok(false) => i += 1,
                Ok(true) => {
                    self.sends.swap_remove(i);
                    self.notify(cluster, Completion::Sent { key });
                    progressed = true;
                }
                Err(e) => {
                    self.sends.swap_remove(i);
                    self.notify(cluster, Completion::Failed(e));
                    progressed = true;
                }
            }
        }
        progressed
    }

    fn poll_receives(&mut self) -> bool {
        let mut progressed = false;
        let mut i = 0;
        while i < self.receives.len() {
            let (cluster, region, key) = self.receives[i];
            match self.transport.test_receive(key) {
                Ok(None) => i += 1,
                Ok(Some(payload)) => {
                    self.receives.swap_remove(i);
                    self.notify(
                        cluster,
                        Completion::Received {
                            region,
                            key,
                            payload,
                        },
                    );
                    progressed = true;
                }
                Err(e) => {
                    self.receives.swap_remove(i);
                    self.notify(cluster, Completion::Failed(e));
                    progressed = true;
                }
            }
        }
        progressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use strata_core::{GlobalClusterId, RankId};

    fn key() -> MessageKey {
        MessageKey {
            source: RankId(0),
            target: RankId(1),
            source_cluster: GlobalClusterId(0),
            target_cluster: GlobalClusterId(0),
        }
    }

    fn wait(comm: &mut Comm, pending: &mut Outstanding) {
        for _ in 0..100_000 {
            comm.progress(ClusterId(0), pending).unwrap();
            if pending.sends.is_empty() && pending.receives.is_empty() {
                return;
            }
            thread::yield_now();
        }
        panic!("requests did not complete");
    }

    fn exchange(mut sender: Comm, mut receiver: Comm) -> (Comm, Comm) {
        let mut out = Outstanding::default();
        let mut inn = Outstanding::default();
        receiver
            .post_receive(ClusterId(0), &mut inn, 3, key(), 2)
            .unwrap();
        sender
            .post_send(ClusterId(0), &mut out, key(), vec![1.0, 2.0])
            .unwrap();
        wait(&mut sender, &mut out);
        wait(&mut receiver, &mut inn);
        assert_eq!(inn.arrived, vec![(3, vec![1.0, 2.0])]);
        (sender, receiver)
    }

    #[test]
    fn inline_progress_completes_requests() {
        let mut net = ChannelTransport::network(2);
        let b = net.pop().unwrap();
        let a = net.pop().unwrap();
        exchange(Comm::Inline(Box::new(a)), Comm::Inline(Box::new(b)));
    }

    #[test]
    fn thread_progress_completes_requests() {
        let mut net = ChannelTransport::network(2);
        let b = net.pop().unwrap();
        let a = net.pop().unwrap();
        let sender = Comm::Thread(CommThread::spawn(Box::new(a), 1).unwrap());
        let receiver = Comm::Thread(CommThread::spawn(Box::new(b), 1).unwrap());
        let (sender, receiver) = exchange(sender, receiver);
        for comm in [sender, receiver] {
            match comm {
                Comm::Thread(mut thread) => {
                    let transport = thread.stop().unwrap();
                    assert!(transport.rank() == RankId(0) || transport.rank() == RankId(1));
                }
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn transport_failures_surface_through_the_thread() {
        let mut net = ChannelTransport::network(2);
        let a = net.remove(0);
        drop(net);
        let mut comm = Comm::Thread(CommThread::spawn(Box::new(a), 1).unwrap());
        let mut pending = Outstanding::default();
        comm.post_send(ClusterId(0), &mut pending, key(), vec![1.0])
            .unwrap();
        let mut result = Ok(());
        for _ in 0..100_000 {
            result = comm.progress(ClusterId(0), &mut pending);
            if result.is_err() {
                break;
            }
            thread::yield_now();
        }
        assert!(matches!(result, Err(SchedulerError::Transport(_))));
    }

    #[test]
    fn lost_comm_rejects_new_traffic() {
        let mut comm = Comm::Lost;
        let mut pending = Outstanding::default();
        assert!(comm.progress(ClusterId(0), &mut pending).is_ok());
        assert_eq!(
            comm.post_send(ClusterId(0), &mut pending, key(), vec![]),
            Err(SchedulerError::CommThreadDisconnected)
        );
    }
}
