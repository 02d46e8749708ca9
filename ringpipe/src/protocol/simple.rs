use std::sync::atomic::Ordering;

use super::{LlFlags, WireProtocol, clean_ll_slot, load_words, store_words};
use crate::error::Result;
use crate::transport::{RecvConnector, SendConnector, SpinWait};
use crate::types::Protocol;

/// Bulk protocol: raw words in the slot, completion signalled by `tail`.
pub struct ProtoSimple;

impl WireProtocol for ProtoSimple {
    const ID: Protocol = Protocol::Simple;

    fn read_step(
        recv: &RecvConnector,
        len: usize,
        wait: &SpinWait<'_>,
        _ll: &LlFlags,
    ) -> Result<Vec<u8>> {
        recv.wait_recv(1, wait)?;
        let slot = recv.conn().slot(Self::ID, recv.step());
        let words = len.div_ceil(8).min(slot.len());
        let mut out = Vec::with_capacity(words * 8);
        // The Acquire load of `tail` in `wait_recv` orders these.
        load_words(&slot[..words], &mut out, Ordering::Relaxed);
        out.truncate(len);
        Ok(out)
    }

    fn write_step(send: &mut SendConnector, data: &[u8], ll: &LlFlags) {
        let step = send.step();
        store_words(send.conn().slot(Self::ID, step), data, Ordering::Relaxed);
        send.commit_send(1);
        clean_ll_slot(send, step, 0, ll);
    }
}
