use std::sync::atomic::Ordering;

use super::{
    LL128_DATA_WORDS, LL128_LINE_WORDS, LlFlags, WireProtocol, clean_ll_slot, load_words,
    store_words,
};
use crate::error::Result;
use crate::transport::{RecvConnector, SendConnector, SpinWait};
use crate::types::Protocol;

const LINE_DATA_BYTES: usize = LL128_DATA_WORDS * 8;

/// 128-byte lines: 15 data words published by a release store of the
/// trailing flag word, which holds `step + 1`.
pub struct ProtoLl128;

impl ProtoLl128 {
    fn flag(step: u64) -> u64 {
        step + 1
    }
}

impl WireProtocol for ProtoLl128 {
    const ID: Protocol = Protocol::Ll128;

    fn read_step(
        recv: &RecvConnector,
        len: usize,
        wait: &SpinWait<'_>,
        _ll: &LlFlags,
    ) -> Result<Vec<u8>> {
        if len == 0 {
            recv.wait_recv(1, wait)?;
            return Ok(Vec::new());
        }
        let step = recv.step();
        let flag = Self::flag(step);
        let slot = recv.conn().slot(Self::ID, step);
        let n_lines = len.div_ceil(LINE_DATA_BYTES);
        let mut out = Vec::with_capacity(n_lines * LINE_DATA_BYTES);

        for line in slot.chunks_exact(LL128_LINE_WORDS).take(n_lines) {
            let flag_word = &line[LL128_DATA_WORDS];
            wait.until(|| flag_word.load(Ordering::Acquire) == flag)?;
            load_words(&line[..LL128_DATA_WORDS], &mut out, Ordering::Relaxed);
        }
        out.truncate(len);
        Ok(out)
    }

    fn write_step(send: &mut SendConnector, data: &[u8], ll: &LlFlags) {
        let step = send.step();
        send.commit_send(1);

        let flag = Self::flag(step);
        let slot = send.conn().slot(Self::ID, step);
        for (line, chunk) in slot
            .chunks_exact(LL128_LINE_WORDS)
            .zip(data.chunks(LINE_DATA_BYTES))
        {
            store_words(&line[..LL128_DATA_WORDS], chunk, Ordering::Relaxed);
            line[LL128_DATA_WORDS].store(flag, Ordering::Release);
        }
        clean_ll_slot(send, step, 0, ll);
    }
}
