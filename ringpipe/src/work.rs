//! Work descriptors: the self-contained, one-shot unit an execution group
//! consumes for one operation on one channel.

use crossbeam_queue::ArrayQueue;

use crate::error::{Result, RingError};
use crate::memory::DeviceBuffer;
use crate::types::{Algorithm, CollFunc, DataType, Protocol, Rank, ReduceOp};

/// Peers a registered work element can address directly, minus one.
pub const MAX_DIRECT_ARITY: usize = 7;

/// Everything an execution group needs to run its share of a collective.
#[derive(Debug, Clone)]
pub struct CollWork {
    pub func: CollFunc,
    pub algorithm: Algorithm,
    pub protocol: Protocol,
    /// Logical thread width; scales chunk alignment.
    pub n_threads: u16,
    pub send_buff: DeviceBuffer,
    pub recv_buff: DeviceBuffer,
    /// Elements in the whole operation (not this channel's share).
    pub count: usize,
    pub dtype: DataType,
    /// LL chunk size, in elements, used once fewer than a full loop remain.
    pub last_chunk_size: usize,
    pub op: ReduceOp,
    pub red_op_arg: u64,
    pub root: Rank,
    /// This channel's position among the operation's channels.
    pub bid: u32,
    pub n_channels: u32,
    pub conn_index: usize,
    pub op_count: u64,
}

impl CollWork {
    pub fn in_place(&self) -> bool {
        self.send_buff.ptr_eq(&self.recv_buff)
    }
}

/// Buffers of peers reachable by direct load/store, indexed by arity slot.
#[derive(Debug, Clone, Default)]
pub struct DirectBuffers {
    pub dn_inputs: [Option<DeviceBuffer>; MAX_DIRECT_ARITY + 1],
    pub dn_outputs: [Option<DeviceBuffer>; MAX_DIRECT_ARITY + 1],
    pub up_outputs: [Option<DeviceBuffer>; MAX_DIRECT_ARITY + 1],
}

impl DirectBuffers {
    /// Number of peers with at least one registered buffer.
    pub fn arity(&self) -> usize {
        (0..=MAX_DIRECT_ARITY)
            .filter(|&i| {
                self.dn_inputs[i].is_some()
                    || self.dn_outputs[i].is_some()
                    || self.up_outputs[i].is_some()
            })
            .count()
    }
}

/// Work queue entry.
#[derive(Debug, Clone)]
pub enum WorkDescriptor {
    /// Staged transfer through connection buffers.
    Coll(CollWork),
    /// Same work, plus peer buffers registered for direct access.
    Registered {
        coll: CollWork,
        direct: Box<DirectBuffers>,
    },
}

impl WorkDescriptor {
    pub fn coll(&self) -> &CollWork {
        match self {
            WorkDescriptor::Coll(coll) | WorkDescriptor::Registered { coll, .. } => coll,
        }
    }

    pub fn direct(&self) -> Option<&DirectBuffers> {
        match self {
            WorkDescriptor::Coll(_) => None,
            WorkDescriptor::Registered { direct, .. } => Some(direct),
        }
    }
}

/// Bounded FIFO of one channel's pending work.
pub struct WorkFifo {
    channel: u32,
    queue: ArrayQueue<WorkDescriptor>,
}

impl WorkFifo {
    pub fn new(channel: u32, depth: usize) -> Self {
        Self {
            channel,
            queue: ArrayQueue::new(depth),
        }
    }

    pub fn push(&self, work: WorkDescriptor) -> Result<()> {
        self.queue.push(work).map_err(|_| RingError::WorkQueueFull {
            channel: self.channel,
            capacity: self.queue.capacity(),
        })
    }

    pub fn pop(&self) -> Option<WorkDescriptor> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Entries that can still be pushed.
    pub fn free_slots(&self) -> usize {
        self.queue.capacity() - self.queue.len()
    }
}
