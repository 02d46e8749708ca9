use std::sync::atomic::Ordering;

use super::{LL_DATA_BYTES, WireProtocol};
use crate::config::RingConfig;
use crate::error::Result;
use crate::transport::{RecvConnector, SendConnector, SpinWait};
use crate::types::Protocol;

/// Flag arithmetic of the LL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlFlags {
    flag_max: u64,
    clean_mask: u64,
}

impl LlFlags {
    pub fn new(flag_max: u64, clean_mask: u64) -> Self {
        Self {
            flag_max,
            clean_mask,
        }
    }

    pub fn from_config(config: &RingConfig) -> Self {
        Self::new(config.ll_flag_max, config.ll_clean_mask)
    }

    /// Flag carried by every word written at `step`.
    pub fn flag(&self, step: u64) -> u32 {
        ((step + 1) % self.flag_max) as u32
    }

    /// Whether the sender must rewrite the unused lines of the slot at `step`.
    pub fn needs_cleaning(&self, step: u64) -> bool {
        step & self.clean_mask == self.clean_mask
    }
}

/// Low-latency protocol: every 4 data bytes travel with a 4-byte flag so
/// the consumer detects arrival without reading `tail`.
///
/// A line is two 8-byte words, `data1 | flag << 32` and `data2 | flag << 32`.
/// `tail` is still advanced, before the lines are stored, so that it never
/// trails `head`; zero-length steps complete through it.
pub struct ProtoLl;

impl WireProtocol for ProtoLl {
    const ID: Protocol = Protocol::Ll;

    fn read_step(
        recv: &RecvConnector,
        len: usize,
        wait: &SpinWait<'_>,
        ll: &LlFlags,
    ) -> Result<Vec<u8>> {
        if len == 0 {
            recv.wait_recv(1, wait)?;
            return Ok(Vec::new());
        }
        let step = recv.step();
        let flag = ll.flag(step) as u64;
        let slot = recv.conn().slot(Self::ID, step);
        let n_lines = len.div_ceil(LL_DATA_BYTES);
        let mut out = Vec::with_capacity(n_lines * LL_DATA_BYTES);

        for line in slot.chunks_exact(2).take(n_lines) {
            let mut words = [0u64; 2];
            wait.until(|| {
                words = [line[0].load(Ordering::Acquire), line[1].load(Ordering::Acquire)];
                words.iter().all(|w| w >> 32 == flag)
            })?;
            for w in words {
                out.extend_from_slice(&(w as u32).to_le_bytes());
            }
        }
        out.truncate(len);
        Ok(out)
    }

    fn write_step(send: &mut SendConnector, data: &[u8], ll: &LlFlags) {
        let step = send.step();
        send.commit_send(1);

        let flag = (ll.flag(step) as u64) << 32;
        let slot = send.conn().slot(Self::ID, step);
        let mut used = 0;
        for (line, chunk) in slot.chunks_exact(2).zip(data.chunks(LL_DATA_BYTES)) {
            let mut raw = [0u8; LL_DATA_BYTES];
            raw[..chunk.len()].copy_from_slice(chunk);
            let lo = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
            let hi = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as u64;
            line[0].store(lo | flag, Ordering::Release);
            line[1].store(hi | flag, Ordering::Release);
            used += 1;
        }

        clean_ll_slot(send, step, used, ll);
    }
}

/// Overwrite the LL lines of the slot at `step`, past the first `used`,
/// with the flag of `step` when `step` falls in a cleaning window.
///
/// Every send step of a connection runs this, whatever its protocol: LL
/// slots age with the connection step, not with the last LL step.
pub(super) fn clean_ll_slot(send: &mut SendConnector, step: u64, used: usize, ll: &LlFlags) {
    if !ll.needs_cleaning(step) {
        return;
    }
    let flag = (ll.flag(step) as u64) << 32;
    for line in send.conn().slot(Protocol::Ll, step).chunks_exact(2).skip(used) {
        line[0].store(flag, Ordering::Relaxed);
        line[1].store(flag, Ordering::Relaxed);
    }
    tracing::trace!(step, peer = send.peer(), "ll slot cleaned");
    send.mark_ll_cleaned(step);
}
