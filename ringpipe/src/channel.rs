//! Channels: independent ring instances, each with its own connections,
//! work queue and profiling counters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Result, RingError};
use crate::topology::Ring;
use crate::transport::{MAX_CONNS, RecvConnector, SendConnector};
use crate::types::Rank;
use crate::work::WorkFifo;

/// Index of a channel within its communicator.
pub type ChannelId = u32;

/// Connections to one reachable rank.
pub struct Peer {
    pub rank: Rank,
    pub send: [Option<SendConnector>; MAX_CONNS],
    pub recv: [Option<RecvConnector>; MAX_CONNS],
}

impl Peer {
    fn new(rank: Rank) -> Self {
        Self {
            rank,
            send: std::array::from_fn(|_| None),
            recv: std::array::from_fn(|_| None),
        }
    }
}

/// Peer arena with a rank-to-slot index.
#[derive(Default)]
pub struct PeerTable {
    peers: Vec<Peer>,
    index: HashMap<Rank, usize>,
}

impl PeerTable {
    pub fn get(&self, rank: Rank) -> Option<&Peer> {
        self.index.get(&rank).map(|&i| &self.peers[i])
    }

    pub fn get_or_insert(&mut self, rank: Rank) -> &mut Peer {
        let i = *self.index.entry(rank).or_insert_with(|| {
            self.peers.push(Peer::new(rank));
            self.peers.len() - 1
        });
        &mut self.peers[i]
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Receive connector from `prev` and send connector to `next` on
    /// `conn_index`, borrowed together. `prev` and `next` may be the same
    /// rank (two-rank ring).
    pub fn ring_pair(
        &mut self,
        prev: Rank,
        next: Rank,
        conn_index: usize,
    ) -> (Option<&mut RecvConnector>, Option<&mut SendConnector>) {
        let p = self.index.get(&prev).copied();
        let n = self.index.get(&next).copied();
        match (p, n) {
            (Some(p), Some(n)) if p == n => {
                let peer = &mut self.peers[p];
                (peer.recv[conn_index].as_mut(), peer.send[conn_index].as_mut())
            }
            (Some(p), Some(n)) => {
                let (from, to) = if p < n {
                    let (lo, hi) = self.peers.split_at_mut(n);
                    (&mut lo[p], &mut hi[0])
                } else {
                    let (lo, hi) = self.peers.split_at_mut(p);
                    (&mut hi[0], &mut lo[n])
                };
                (from.recv[conn_index].as_mut(), to.send[conn_index].as_mut())
            }
            (Some(p), None) => (self.peers[p].recv[conn_index].as_mut(), None),
            (None, Some(n)) => (None, self.peers[n].send[conn_index].as_mut()),
            (None, None) => (None, None),
        }
    }
}

/// Live profiling counters of a channel.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    pub(crate) send_bytes: AtomicU64,
    pub(crate) recv_bytes: AtomicU64,
    pub(crate) send_wait_polls: AtomicU64,
    pub(crate) recv_wait_polls: AtomicU64,
    pub(crate) primitive_calls: AtomicU64,
    pub(crate) ops_completed: AtomicU64,
}

impl ChannelCounters {
    pub fn snapshot(&self) -> ChannelProfile {
        ChannelProfile {
            send_bytes: self.send_bytes.load(Ordering::Relaxed),
            recv_bytes: self.recv_bytes.load(Ordering::Relaxed),
            send_wait_polls: self.send_wait_polls.load(Ordering::Relaxed),
            recv_wait_polls: self.recv_wait_polls.load(Ordering::Relaxed),
            primitive_calls: self.primitive_calls.load(Ordering::Relaxed),
            ops_completed: self.ops_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ChannelCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelProfile {
    /// Payload bytes handed to the next rank.
    pub send_bytes: u64,
    /// Payload bytes consumed from the previous rank.
    pub recv_bytes: u64,
    /// Failed polls while waiting for send room.
    pub send_wait_polls: u64,
    /// Failed polls while waiting for incoming data.
    pub recv_wait_polls: u64,
    pub primitive_calls: u64,
    pub ops_completed: u64,
}

pub struct Channel {
    id: ChannelId,
    ring: Ring,
    peers: Mutex<PeerTable>,
    /// Set once the link to `ring.prev` / `ring.next` is installed, so
    /// submission can check links without taking the peer lock.
    recv_connected: [AtomicBool; MAX_CONNS],
    send_connected: [AtomicBool; MAX_CONNS],
    work_queue: WorkFifo,
    counters: ChannelCounters,
}

impl Channel {
    pub fn new(id: ChannelId, ring: Ring, work_fifo_depth: usize) -> Self {
        Self {
            id,
            ring,
            peers: Mutex::new(PeerTable::default()),
            recv_connected: std::array::from_fn(|_| AtomicBool::new(false)),
            send_connected: std::array::from_fn(|_| AtomicBool::new(false)),
            work_queue: WorkFifo::new(id, work_fifo_depth),
            counters: ChannelCounters::default(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn work_queue(&self) -> &WorkFifo {
        &self.work_queue
    }

    pub fn counters(&self) -> &ChannelCounters {
        &self.counters
    }

    /// Lock the peer arena. Held by the execution group for the duration of
    /// one operation.
    pub fn peers(&self) -> Result<std::sync::MutexGuard<'_, PeerTable>> {
        self.peers
            .lock()
            .map_err(|_| RingError::LockPoisoned("channel peers"))
    }

    /// Install the receive end of the link from `ring.prev`.
    pub fn install_recv(&self, conn_index: usize, conn: RecvConnector) -> Result<()> {
        let peer = conn.peer();
        self.check_link(conn_index, peer, self.ring.prev, "recv")?;
        self.peers()?.get_or_insert(peer).recv[conn_index] = Some(conn);
        self.recv_connected[conn_index].store(true, Ordering::Release);
        Ok(())
    }

    /// Install the send end of the link to `ring.next`.
    pub fn install_send(&self, conn_index: usize, conn: SendConnector) -> Result<()> {
        let peer = conn.peer();
        self.check_link(conn_index, peer, self.ring.next, "send")?;
        self.peers()?.get_or_insert(peer).send[conn_index] = Some(conn);
        self.send_connected[conn_index].store(true, Ordering::Release);
        Ok(())
    }

    fn check_link(
        &self,
        conn_index: usize,
        peer: Rank,
        expected: Rank,
        direction: &str,
    ) -> Result<()> {
        if conn_index >= MAX_CONNS {
            return Err(RingError::config(format!(
                "conn_index {conn_index} out of range (max {MAX_CONNS})"
            )));
        }
        if peer != expected {
            return Err(RingError::ring(
                self.id,
                format!("{direction} link to rank {peer}, ring neighbour is {expected}"),
            ));
        }
        Ok(())
    }

    /// Fail unless both ring neighbours have a connector on `conn_index`.
    ///
    /// Never waits on a running operation.
    pub fn check_connected(&self, conn_index: usize) -> Result<()> {
        if self.ring.n_ranks() == 1 {
            return Ok(());
        }
        if !connected(&self.recv_connected, conn_index) {
            return Err(RingError::NotConnected {
                channel: self.id,
                peer: self.ring.prev,
                conn_index,
                direction: "recv",
            });
        }
        if !connected(&self.send_connected, conn_index) {
            return Err(RingError::NotConnected {
                channel: self.id,
                peer: self.ring.next,
                conn_index,
                direction: "send",
            });
        }
        Ok(())
    }
}

fn connected(flags: &[AtomicBool; MAX_CONNS], conn_index: usize) -> bool {
    flags
        .get(conn_index)
        .is_some_and(|f| f.load(Ordering::Acquire))
}
