//! Collective kernels and the machinery that runs them.
//!
//! A collective is looked up in the `(function, algorithm, protocol)`
//! dispatch table and executed by one [`ExecutionGroup`] per channel. Each
//! table entry is the ring scheduler specialised for one wire protocol.

mod broadcast;
mod chunk;
mod handle;
mod reduce;

pub use broadcast::BroadcastRole;
pub use chunk::{ChunkSchedule, ll_last_chunk_size};
pub use handle::{LaunchGroup, LaunchHandle};
pub use reduce::ReduceRole;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, ChannelId, PeerTable};
use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::protocol::{self, LlFlags, ProtoEnv, ProtoLl, ProtoLl128, ProtoSimple};
use crate::reduce::apply_post_op;
use crate::topology::Ring;
use crate::types::{Algorithm, CollFunc, Protocol, Rank};
use crate::work::{CollWork, WorkDescriptor};

/// Everything a kernel needs besides the work descriptor.
pub(crate) struct KernelArgs<'a> {
    pub env: ProtoEnv<'a>,
    pub ring: &'a Ring,
    pub peers: &'a mut PeerTable,
    pub config: &'a RingConfig,
}

impl KernelArgs<'_> {
    fn schedule(&self, proto: Protocol, work: &CollWork) -> Result<ChunkSchedule> {
        ChunkSchedule::new(
            proto,
            work.count,
            work.n_channels as usize,
            work.bid as usize,
            work.n_threads as usize,
            work.dtype.size_in_bytes(),
            protocol::bytes_per_step(proto, self.config.buff_size(proto)),
            work.last_chunk_size,
        )
    }
}

pub(crate) type Kernel = fn(&mut KernelArgs<'_>, &CollWork) -> Result<()>;

// ── Dispatch table ──

/// Kernel for a `(function, algorithm, protocol)` triple.
pub(crate) fn kernel_for(
    func: CollFunc,
    algorithm: Algorithm,
    protocol: Protocol,
) -> Result<Kernel> {
    let kernel: Kernel = match (func, algorithm, protocol) {
        (CollFunc::Reduce, Algorithm::Ring, Protocol::Simple) => {
            reduce::run_ring_reduce::<ProtoSimple>
        }
        (CollFunc::Reduce, Algorithm::Ring, Protocol::Ll) => reduce::run_ring_reduce::<ProtoLl>,
        (CollFunc::Reduce, Algorithm::Ring, Protocol::Ll128) => {
            reduce::run_ring_reduce::<ProtoLl128>
        }
        (CollFunc::Broadcast, Algorithm::Ring, Protocol::Simple) => {
            broadcast::run_ring_broadcast::<ProtoSimple>
        }
        (CollFunc::Broadcast, Algorithm::Ring, Protocol::Ll) => {
            broadcast::run_ring_broadcast::<ProtoLl>
        }
        (CollFunc::Broadcast, Algorithm::Ring, Protocol::Ll128) => {
            broadcast::run_ring_broadcast::<ProtoLl128>
        }
        _ => {
            return Err(RingError::Unsupported {
                func,
                algorithm,
                protocol,
            });
        }
    };
    Ok(kernel)
}

/// Whether a kernel exists for the triple.
pub fn is_supported(func: CollFunc, algorithm: Algorithm, protocol: Protocol) -> bool {
    kernel_for(func, algorithm, protocol).is_ok()
}

/// Single-rank collective: copy input to output, with the post-op if asked.
///
/// Only the first channel copies, so the post-op is applied once.
pub(crate) fn local_copy(work: &CollWork, post_op: bool) -> Result<()> {
    let n_bytes = work.count * work.dtype.size_in_bytes();
    if work.bid != 0 || n_bytes == 0 {
        return Ok(());
    }
    let mut data = work.send_buff.read(0, n_bytes)?;
    if post_op {
        apply_post_op(&mut data, work.count, work.dtype, work.op, work.red_op_arg)?;
    }
    work.recv_buff.write(0, &data)
}

// ── Execution group ──

/// The worker of one (rank, channel): drains the channel's work queue in
/// FIFO order on a dedicated blocking thread.
pub(crate) struct ExecutionGroup {
    rank: Rank,
    channel: Arc<Channel>,
    config: Arc<RingConfig>,
    cancel: CancellationToken,
}

impl ExecutionGroup {
    pub(crate) fn new(
        rank: Rank,
        channel: Arc<Channel>,
        config: Arc<RingConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rank,
            channel,
            config,
            cancel,
        }
    }

    pub(crate) fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    /// Run every queued operation. On the first failure the rest of the
    /// queue is discarded and the error returned; a failure other than
    /// cancellation also fires the shared token so peers waiting on this
    /// rank unwind.
    ///
    /// Each operation is popped and run under the peer lock, so groups
    /// sharing a channel still run its queue in `op_count` order.
    pub(crate) fn run(self) -> Result<()> {
        let channel = self.channel.id();
        let mut completed = 0u64;
        loop {
            let mut peers = self.channel.peers()?;
            let Some(work) = self.channel.work_queue().pop() else {
                break;
            };
            let op_count = work.coll().op_count;
            if let Err(e) = self.execute(&work, &mut peers) {
                let mut discarded = 0usize;
                while self.channel.work_queue().pop().is_some() {
                    discarded += 1;
                }
                if e.is_cancelled() {
                    tracing::warn!(rank = self.rank, channel, op_count, discarded, "execution group cancelled");
                } else {
                    tracing::warn!(rank = self.rank, channel, op_count, discarded, error = %e, "collective failed");
                    self.cancel.cancel();
                }
                return Err(e);
            }
            completed += 1;
        }
        tracing::debug!(rank = self.rank, channel, completed, "execution group drained");
        Ok(())
    }

    fn execute(&self, work: &WorkDescriptor, peers: &mut PeerTable) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RingError::Cancelled);
        }
        let coll = work.coll();
        if let Some(direct) = work.direct() {
            // Peer buffers are carried but every transfer is staged.
            tracing::trace!(op_count = coll.op_count, arity = direct.arity(), "registered work on staged path");
        }
        let kernel = kernel_for(coll.func, coll.algorithm, coll.protocol)?;

        let env = ProtoEnv {
            channel: self.channel.id(),
            cancel: &self.cancel,
            spins_before_yield: self.config.spins_before_yield,
            ll: LlFlags::from_config(&self.config),
            counters: self.channel.counters(),
        };
        let mut args = KernelArgs {
            env,
            ring: self.channel.ring(),
            peers,
            config: &self.config,
        };
        kernel(&mut args, coll)?;

        self.channel
            .counters()
            .ops_completed
            .fetch_add(1, Ordering::Relaxed);
        tracing::trace!(rank = self.rank, channel = self.channel.id(), op_count = coll.op_count, "collective done");
        Ok(())
    }
}
