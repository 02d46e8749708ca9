//! In-process transport: links every rank to its ring successor through
//! shared memory.

use super::{ConnFlags, ConnShared, MAX_CONNS, RecvConnector, SendConnector};
use crate::comm::Communicator;
use crate::error::{Result, RingError};

/// Create one link per (channel, rank) from each rank to its ring `next`
/// on `conn_index`, installing the send end at the producer and the receive
/// end at the consumer.
///
/// All communicators must belong to the same group, indexed by rank.
pub fn connect_rings(comms: &[Communicator], conn_index: usize, flags: ConnFlags) -> Result<()> {
    if conn_index >= MAX_CONNS {
        return Err(RingError::config(format!(
            "conn_index {conn_index} out of range (max {MAX_CONNS})"
        )));
    }
    for (i, comm) in comms.iter().enumerate() {
        if comm.rank() as usize != i || comm.n_ranks() as usize != comms.len() {
            return Err(RingError::config(format!(
                "communicator {i} has rank {} of {}, expected {i} of {}",
                comm.rank(),
                comm.n_ranks(),
                comms.len()
            )));
        }
    }
    if comms.len() < 2 {
        return Ok(());
    }

    let n_channels = comms[0].n_channels();
    for channel in 0..n_channels as u32 {
        for comm in comms {
            let producer = comm.channel(channel).ok_or_else(|| {
                RingError::ring(channel, format!("rank {} has no such channel", comm.rank()))
            })?;
            let next = producer.ring().next;
            let consumer = comms[next as usize].channel(channel).ok_or_else(|| {
                RingError::ring(channel, format!("rank {next} has no such channel"))
            })?;
            if consumer.ring().prev != comm.rank() {
                return Err(RingError::ring(
                    channel,
                    format!(
                        "rank {} sends to {next}, but {next} receives from {}",
                        comm.rank(),
                        consumer.ring().prev
                    ),
                ));
            }

            let conn = ConnShared::new(&comm.config().buff_sizes, flags);
            producer.install_send(conn_index, SendConnector::new(conn.clone(), next))?;
            consumer.install_recv(conn_index, RecvConnector::new(conn, comm.rank()))?;
        }
    }
    tracing::debug!(
        n_ranks = comms.len(),
        n_channels,
        conn_index,
        flags = flags.bits(),
        "local ring links connected"
    );
    Ok(())
}
