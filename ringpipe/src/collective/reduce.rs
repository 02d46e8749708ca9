use super::{KernelArgs, local_copy};
use crate::error::{Result, RingError};
use crate::protocol::{Primitives, WireProtocol};
use crate::topology::Ring;
use crate::types::Rank;
use crate::work::CollWork;

/// What one rank does in a ring reduce. Fixed for the whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceRole {
    /// Immediately downstream of the root: starts the chain with its input.
    Source,
    /// Combination terminus: receives the chain and writes the result.
    Root,
    /// Combines its input into the chain and forwards it.
    Relay,
}

impl ReduceRole {
    pub fn select(ring: &Ring, root: Rank) -> Self {
        if ring.rank() == root {
            ReduceRole::Root
        } else if ring.prev == root {
            ReduceRole::Source
        } else {
            ReduceRole::Relay
        }
    }
}

/// Ring reduce of one channel's share of `work`, specialised for `P`.
///
/// Data flows from the rank after the root around the ring back to the
/// root; each rank folds in its own input as `op(local, received)`.
pub(crate) fn run_ring_reduce<P: WireProtocol>(
    args: &mut KernelArgs<'_>,
    work: &CollWork,
) -> Result<()> {
    let ring = args.ring;
    if ring.n_ranks() == 1 {
        return local_copy(work, true);
    }

    let schedule = args.schedule(P::ID, work)?;
    let role = ReduceRole::select(ring, work.root);
    tracing::trace!(
        channel = args.env.channel,
        op_count = work.op_count,
        ?role,
        protocol = %P::ID,
        "ring reduce"
    );

    let (recv, send) = args.peers.ring_pair(ring.prev, ring.next, work.conn_index);
    let (recv, send) = match role {
        ReduceRole::Source => (None, send),
        ReduceRole::Root => (recv, None),
        ReduceRole::Relay => (recv, send),
    };
    let mut prims = Primitives::<P>::new(
        args.env,
        recv,
        send,
        &work.send_buff,
        &work.recv_buff,
        work.dtype,
        work.op,
        work.red_op_arg,
    );

    for (offset, n) in schedule.chunks() {
        if args.env.cancel.is_cancelled() {
            return Err(RingError::Cancelled);
        }
        match role {
            ReduceRole::Source => prims.send(offset, n)?,
            ReduceRole::Root => prims.recv_reduce_copy(offset, n, true)?,
            ReduceRole::Relay => prims.recv_reduce_send(offset, n)?,
        }
    }
    Ok(())
}
