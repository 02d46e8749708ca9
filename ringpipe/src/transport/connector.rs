use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use super::{NUM_STEPS, SpinWait};
use crate::error::Result;
use crate::types::{NUM_PROTOCOLS, Protocol, Rank};

bitflags! {
    /// Transport capability flags advertised for a link.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct ConnFlags: u8 {
        const DIRECT_WRITE = 0b0000_0001;
        const DIRECT_READ = 0b0000_0010;
        /// Slot buffers are shared with other links of the same peer.
        const SHARED = 0b0010_0000;
    }
}

impl ConnFlags {
    /// Producer may write straight into the consumer's user buffer.
    pub fn is_direct(self) -> bool {
        self.intersects(Self::DIRECT_WRITE | Self::DIRECT_READ)
    }
}

/// State shared by the two ends of one directional link.
///
/// `tail` counts steps published by the producer, `head` counts steps
/// released by the consumer. `0 <= tail - head <= NUM_STEPS` at all times.
pub struct ConnShared {
    buffs: [Box<[AtomicU64]>; NUM_PROTOCOLS],
    head: AtomicU64,
    tail: AtomicU64,
    flags: ConnFlags,
}

impl ConnShared {
    /// Allocate zeroed slot buffers. Sizes are in bytes and must be
    /// multiples of `NUM_STEPS * 8` (checked by `RingConfig::validate`).
    pub fn new(buff_sizes: &[usize; NUM_PROTOCOLS], flags: ConnFlags) -> Arc<Self> {
        let buffs = std::array::from_fn(|i| {
            (0..buff_sizes[i] / 8)
                .map(|_| AtomicU64::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        Arc::new(Self {
            buffs,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            flags,
        })
    }

    /// Whole buffer of one protocol.
    pub fn buff(&self, proto: Protocol) -> &[AtomicU64] {
        &self.buffs[proto.index()]
    }

    /// The slot that `step` maps to.
    pub fn slot(&self, proto: Protocol, step: u64) -> &[AtomicU64] {
        let buff = self.buff(proto);
        let words = buff.len() / NUM_STEPS;
        let idx = (step % NUM_STEPS as u64) as usize;
        &buff[idx * words..(idx + 1) * words]
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Published but not yet released steps.
    pub fn in_flight(&self) -> u64 {
        let head = self.head();
        self.tail().saturating_sub(head)
    }

    pub fn flags(&self) -> ConnFlags {
        self.flags
    }
}

/// Steps handed out by [`SendConnector::acquire_send_slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub first_step: u64,
    pub steps: u64,
}

impl SlotRange {
    /// Slot indices, in step order.
    pub fn slots(&self) -> impl Iterator<Item = usize> + use<> {
        let first = self.first_step;
        (first..first + self.steps).map(|s| (s % NUM_STEPS as u64) as usize)
    }
}

/// Producer end of a link.
pub struct SendConnector {
    conn: Arc<ConnShared>,
    peer: Rank,
    step: u64,
    ll_last_cleaning: u64,
}

impl SendConnector {
    pub fn new(conn: Arc<ConnShared>, peer: Rank) -> Self {
        Self {
            conn,
            peer,
            step: 0,
            ll_last_cleaning: 0,
        }
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Steps committed so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn conn(&self) -> &ConnShared {
        &self.conn
    }

    /// Step at which the LL slot flags were last rewritten.
    pub fn ll_last_cleaning(&self) -> u64 {
        self.ll_last_cleaning
    }

    /// Whether `steps` more steps fit in the window right now.
    pub fn has_room(&self, steps: u64) -> bool {
        self.step + steps <= self.conn.head() + NUM_STEPS as u64
    }

    /// Block until `steps` slots past the current step are free.
    ///
    /// Nothing is mutated; the step only advances in [`commit_send`].
    ///
    /// [`commit_send`]: SendConnector::commit_send
    pub fn acquire_send_slot(&self, steps: u64, wait: &SpinWait<'_>) -> Result<SlotRange> {
        debug_assert!(steps as usize <= NUM_STEPS, "window is {NUM_STEPS} steps");
        wait.until(|| self.has_room(steps))?;
        Ok(SlotRange {
            first_step: self.step,
            steps,
        })
    }

    /// Publish `steps` staged steps to the consumer and advance the step.
    pub fn commit_send(&mut self, steps: u64) {
        self.step += steps;
        self.conn.tail.store(self.step, Ordering::Release);
    }

    pub(crate) fn mark_ll_cleaned(&mut self, step: u64) {
        self.ll_last_cleaning = step;
    }
}

/// Consumer end of a link.
pub struct RecvConnector {
    conn: Arc<ConnShared>,
    peer: Rank,
    step: u64,
}

impl RecvConnector {
    pub fn new(conn: Arc<ConnShared>, peer: Rank) -> Self {
        Self { conn, peer, step: 0 }
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Steps released so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn conn(&self) -> &ConnShared {
        &self.conn
    }

    /// Whether the producer has published `steps` steps past ours.
    pub fn has_data(&self, steps: u64) -> bool {
        self.conn.tail() >= self.step + steps
    }

    /// Block until the producer's `tail` covers `steps` more steps.
    pub fn wait_recv(&self, steps: u64, wait: &SpinWait<'_>) -> Result<()> {
        wait.until(|| self.has_data(steps))
    }

    /// Hand `steps` consumed slots back to the producer.
    pub fn release_recv_slot(&mut self, steps: u64) {
        self.step += steps;
        self.conn.head.store(self.step, Ordering::Release);
    }
}
