//! Per-rank communicator: channels, configuration, abort token and the
//! host-side submission path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelId, ChannelProfile};
use crate::collective::{self, ExecutionGroup, LaunchHandle};
use crate::config::{MAX_CHANNELS, RingConfig};
use crate::error::{Result, RingError};
use crate::memory::DeviceBuffer;
use crate::protocol;
use crate::topology::{self, Ring};
use crate::transport::{ConnFlags, MAX_CONNS, local};
use crate::types::{Algorithm, CollFunc, DataType, Protocol, Rank, ReduceOp};
use crate::work::{CollWork, DirectBuffers, WorkDescriptor};

/// A collective operation as submitted by the host.
///
/// Defaults: ring algorithm, Simple protocol, all channels, connection 0.
#[derive(Debug, Clone)]
pub struct CollOp {
    pub func: CollFunc,
    pub algorithm: Algorithm,
    pub protocol: Protocol,
    pub send_buff: DeviceBuffer,
    pub recv_buff: DeviceBuffer,
    pub count: usize,
    pub dtype: DataType,
    pub op: ReduceOp,
    pub root: Rank,
    /// `None` uses every channel of the communicator.
    pub n_channels: Option<u32>,
    pub conn_index: usize,
    pub direct: Option<DirectBuffers>,
}

impl CollOp {
    /// Reduce `count` elements of every rank's `send_buff` into the root's
    /// `recv_buff`.
    pub fn reduce(
        send_buff: DeviceBuffer,
        recv_buff: DeviceBuffer,
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    ) -> Self {
        Self {
            func: CollFunc::Reduce,
            algorithm: Algorithm::Ring,
            protocol: Protocol::Simple,
            send_buff,
            recv_buff,
            count,
            dtype,
            op,
            root,
            n_channels: None,
            conn_index: 0,
            direct: None,
        }
    }

    /// Copy `count` elements of the root's `send_buff` into every rank's
    /// `recv_buff`.
    pub fn broadcast(
        send_buff: DeviceBuffer,
        recv_buff: DeviceBuffer,
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Self {
        Self {
            func: CollFunc::Broadcast,
            ..Self::reduce(send_buff, recv_buff, count, dtype, ReduceOp::Sum, root)
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_channels(mut self, n_channels: u32) -> Self {
        self.n_channels = Some(n_channels);
        self
    }

    pub fn with_conn_index(mut self, conn_index: usize) -> Self {
        self.conn_index = conn_index;
        self
    }

    /// Attach peer buffers registered for direct access.
    pub fn with_direct(mut self, direct: DirectBuffers) -> Self {
        self.direct = Some(direct);
        self
    }
}

/// One rank's view of the engine.
///
/// Built once at setup and read-only afterwards, apart from the work queues
/// and the abort token.
pub struct Communicator {
    rank: Rank,
    n_ranks: u32,
    channels: Vec<Arc<Channel>>,
    config: Arc<RingConfig>,
    abort: CancellationToken,
    op_count: AtomicU64,
}

impl Communicator {
    /// Build a communicator from one ring permutation per channel.
    ///
    /// Connections are not created here; see [`transport::local`](crate::transport::local).
    pub fn new(
        rank: Rank,
        n_ranks: u32,
        rings: &[Vec<Rank>],
        config: RingConfig,
        abort: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        if n_ranks == 0 || rank >= n_ranks {
            return Err(RingError::InvalidRank {
                rank,
                world_size: n_ranks,
            });
        }
        if rings.is_empty() || rings.len() > MAX_CHANNELS {
            return Err(RingError::config(format!(
                "channel count must be in 1..={MAX_CHANNELS}, got {}",
                rings.len()
            )));
        }

        let mut channels = Vec::with_capacity(rings.len());
        for (id, order) in rings.iter().enumerate() {
            let id = id as ChannelId;
            if order.len() != n_ranks as usize {
                return Err(RingError::ring(
                    id,
                    format!("ring has {} ranks, communicator has {n_ranks}", order.len()),
                ));
            }
            let ring = Ring::from_order(id, rank, order)?;
            channels.push(Arc::new(Channel::new(id, ring, config.work_fifo_depth)));
        }

        tracing::debug!(rank, n_ranks, n_channels = channels.len(), "communicator created");
        Ok(Self {
            rank,
            n_ranks,
            channels,
            config: Arc::new(config),
            abort,
            op_count: AtomicU64::new(0),
        })
    }

    /// Create `n_ranks` in-process communicators over identity rings,
    /// fully connected on every connection index.
    pub fn bootstrap_local(
        n_ranks: u32,
        n_channels: usize,
        config: RingConfig,
    ) -> Result<Vec<Communicator>> {
        Self::bootstrap_local_with_rings(topology::default_rings(n_ranks, n_channels), config)
    }

    /// Like [`bootstrap_local`](Self::bootstrap_local) with explicit ring
    /// permutations. All communicators share one abort token.
    pub fn bootstrap_local_with_rings(
        rings: Vec<Vec<Rank>>,
        config: RingConfig,
    ) -> Result<Vec<Communicator>> {
        let n_ranks = rings.first().map_or(0, |order| order.len() as u32);
        let abort = CancellationToken::new();
        let comms = (0..n_ranks)
            .map(|rank| Communicator::new(rank, n_ranks, &rings, config.clone(), abort.clone()))
            .collect::<Result<Vec<_>>>()?;
        if comms.is_empty() {
            return Err(RingError::config("no ranks to bootstrap"));
        }
        for conn_index in 0..MAX_CONNS {
            local::connect_rings(&comms, conn_index, ConnFlags::empty())?;
        }
        Ok(comms)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn n_ranks(&self) -> u32 {
        self.n_ranks
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id as usize).map(|c| c.as_ref())
    }

    pub fn ring(&self, id: ChannelId) -> Option<&Ring> {
        self.channel(id).map(Channel::ring)
    }

    pub fn channel_profile(&self, id: ChannelId) -> Option<ChannelProfile> {
        self.channel(id).map(|c| c.counters().snapshot())
    }

    /// Operations enqueued so far.
    pub fn op_count(&self) -> u64 {
        self.op_count.load(Ordering::Relaxed)
    }

    /// Token observed by every wait of every execution group.
    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// Cancel in-flight and queued work. Blocked groups return `Cancelled`.
    pub fn abort(&self) {
        tracing::warn!(rank = self.rank, "communicator aborted");
        self.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Validate `op`, split it into one work descriptor per channel and queue
    /// them. Returns the operation's `op_count`.
    ///
    /// Nothing is queued unless every channel has room.
    pub fn enqueue(&self, op: CollOp) -> Result<u64> {
        collective::kernel_for(op.func, op.algorithm, op.protocol)?;
        if op.root >= self.n_ranks {
            return Err(RingError::InvalidRank {
                rank: op.root,
                world_size: self.n_ranks,
            });
        }
        let n_channels = op.n_channels.unwrap_or(self.channels.len() as u32);
        if n_channels == 0 || n_channels as usize > self.channels.len() {
            return Err(RingError::config(format!(
                "operation wants {n_channels} channels, communicator has {}",
                self.channels.len()
            )));
        }
        if op.conn_index >= MAX_CONNS {
            return Err(RingError::config(format!(
                "conn_index {} out of range (max {MAX_CONNS})",
                op.conn_index
            )));
        }
        if op.func.reduces() && !op.dtype.is_reducible() {
            return Err(RingError::UnsupportedDType {
                dtype: op.dtype,
                op: "reduce",
            });
        }
        self.check_buffers(&op)?;

        let channels = &self.channels[..n_channels as usize];
        for channel in channels {
            channel.check_connected(op.conn_index)?;
            if channel.work_queue().free_slots() == 0 {
                return Err(RingError::WorkQueueFull {
                    channel: channel.id(),
                    capacity: channel.work_queue().capacity(),
                });
            }
        }

        let elem_size = op.dtype.size_in_bytes();
        let last_chunk_size = if op.protocol == Protocol::Ll {
            collective::ll_last_chunk_size(
                op.count * elem_size,
                n_channels as usize,
                self.config.n_threads as usize,
                protocol::bytes_per_step(Protocol::Ll, self.config.buff_size(Protocol::Ll)),
                elem_size,
            )
        } else {
            0
        };
        let red_op_arg = if op.func.reduces() {
            op.op.red_op_arg(self.n_ranks)
        } else {
            0
        };
        let op_count = self.op_count.fetch_add(1, Ordering::Relaxed);

        for (bid, channel) in channels.iter().enumerate() {
            let coll = CollWork {
                func: op.func,
                algorithm: op.algorithm,
                protocol: op.protocol,
                n_threads: self.config.n_threads,
                send_buff: op.send_buff.clone(),
                recv_buff: op.recv_buff.clone(),
                count: op.count,
                dtype: op.dtype,
                last_chunk_size,
                op: op.op,
                red_op_arg,
                root: op.root,
                bid: bid as u32,
                n_channels,
                conn_index: op.conn_index,
                op_count,
            };
            let work = match &op.direct {
                Some(direct) => WorkDescriptor::Registered {
                    coll,
                    direct: Box::new(direct.clone()),
                },
                None => WorkDescriptor::Coll(coll),
            };
            channel.work_queue().push(work)?;
        }

        tracing::debug!(
            rank = self.rank,
            op_count,
            func = %op.func,
            protocol = %op.protocol,
            count = op.count,
            n_channels,
            "collective enqueued"
        );
        Ok(op_count)
    }

    /// Start one execution group per channel with queued work.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self) -> LaunchHandle {
        let groups: Vec<ExecutionGroup> = self
            .channels
            .iter()
            .filter(|c| !c.work_queue().is_empty())
            .map(|c| {
                ExecutionGroup::new(
                    self.rank,
                    Arc::clone(c),
                    Arc::clone(&self.config),
                    self.abort.clone(),
                )
            })
            .collect();
        tracing::debug!(rank = self.rank, n_groups = groups.len(), "launching execution groups");
        LaunchHandle::spawn(self.rank, groups)
    }

    /// Input and output must hold `count` elements wherever they are used.
    fn check_buffers(&self, op: &CollOp) -> Result<()> {
        let expected = op.count * op.dtype.size_in_bytes();
        let is_root = self.rank == op.root;
        let (needs_send, needs_recv) = match op.func {
            CollFunc::Broadcast => (is_root, true),
            _ => (true, is_root || self.n_ranks == 1),
        };
        for (needed, buf) in [(needs_send, &op.send_buff), (needs_recv, &op.recv_buff)] {
            if needed && buf.len_bytes() < expected {
                return Err(RingError::BufferSizeMismatch {
                    expected,
                    actual: buf.len_bytes(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("n_ranks", &self.n_ranks)
            .field("n_channels", &self.channels.len())
            .field("op_count", &self.op_count())
            .finish()
    }
}
