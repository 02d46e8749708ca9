use super::{KernelArgs, local_copy};
use crate::error::{Result, RingError};
use crate::protocol::{Primitives, WireProtocol};
use crate::topology::Ring;
use crate::types::Rank;
use crate::work::CollWork;

/// What one rank does in a ring broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastRole {
    /// Owns the data and starts the chain.
    Root,
    /// Receives and forwards.
    Forward,
    /// Last rank before the root: receives only.
    Sink,
}

impl BroadcastRole {
    pub fn select(ring: &Ring, root: Rank) -> Self {
        if ring.rank() == root {
            BroadcastRole::Root
        } else if ring.next == root {
            BroadcastRole::Sink
        } else {
            BroadcastRole::Forward
        }
    }
}

/// Ring broadcast from `work.root`'s send buffer into every receive buffer.
pub(crate) fn run_ring_broadcast<P: WireProtocol>(
    args: &mut KernelArgs<'_>,
    work: &CollWork,
) -> Result<()> {
    let ring = args.ring;
    if ring.n_ranks() == 1 {
        return local_copy(work, false);
    }

    let schedule = args.schedule(P::ID, work)?;
    let role = BroadcastRole::select(ring, work.root);
    let in_place = work.in_place();
    tracing::trace!(
        channel = args.env.channel,
        op_count = work.op_count,
        ?role,
        protocol = %P::ID,
        "ring broadcast"
    );

    let (recv, send) = args.peers.ring_pair(ring.prev, ring.next, work.conn_index);
    let (recv, send) = match role {
        BroadcastRole::Root => (None, send),
        BroadcastRole::Sink => (recv, None),
        BroadcastRole::Forward => (recv, send),
    };
    let mut prims = Primitives::<P>::new(
        args.env,
        recv,
        send,
        &work.send_buff,
        &work.recv_buff,
        work.dtype,
        work.op,
        0,
    );

    for (offset, n) in schedule.chunks() {
        if args.env.cancel.is_cancelled() {
            return Err(RingError::Cancelled);
        }
        match role {
            BroadcastRole::Root if in_place => prims.send(offset, n)?,
            BroadcastRole::Root => prims.copy_send(offset, n)?,
            BroadcastRole::Sink => prims.recv(offset, n)?,
            BroadcastRole::Forward => prims.recv_copy_send(offset, n)?,
        }
    }
    Ok(())
}
