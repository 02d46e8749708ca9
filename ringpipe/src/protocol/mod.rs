//! Wire protocols: three encodings of "move one step of data across a link
//! and let the consumer detect that it arrived".
//!
//! | Protocol | Slot layout                              | Completion            |
//! |----------|------------------------------------------|-----------------------|
//! | Simple   | raw little-endian words                  | `tail` counter        |
//! | LL       | 16-byte lines, 4-byte flag per 4 data B  | inline flag == step+1 |
//! | LL128    | 128-byte lines, 15 data words + 1 flag   | flag word == step+1   |
//!
//! All three sit behind [`WireProtocol`] and are driven through the same
//! [`Primitives`] capability set.

mod ll;
mod ll128;
mod primitives;
mod simple;

pub use ll::{LlFlags, ProtoLl};

use ll::clean_ll_slot;
pub use ll128::ProtoLl128;
pub use primitives::{Primitives, ProtoEnv};
pub use simple::ProtoSimple;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::transport::{NUM_STEPS, RecvConnector, SendConnector, SpinWait};
use crate::types::Protocol;

/// Bytes of one LL line: two (data, flag) word pairs.
pub const LL_LINE_BYTES: usize = 16;
/// Payload bytes of one LL line.
pub const LL_DATA_BYTES: usize = 8;
/// Bytes of one LL128 line.
pub const LL128_LINE_BYTES: usize = 128;
/// 8-byte words per LL128 line.
pub const LL128_LINE_WORDS: usize = LL128_LINE_BYTES / 8;
/// Payload words per LL128 line; the last word is the flag.
pub const LL128_DATA_WORDS: usize = LL128_LINE_WORDS - 1;
/// Staging elements per thread used to size the LL128 grain.
pub const LL128_SHMEM_ELEMS_PER_THREAD: usize = 2;

/// Payload bytes one step can carry on a buffer of `buff_size` bytes.
pub fn bytes_per_step(proto: Protocol, buff_size: usize) -> usize {
    let step = buff_size / NUM_STEPS;
    match proto {
        Protocol::Simple => step,
        Protocol::Ll => step / LL_LINE_BYTES * LL_DATA_BYTES,
        Protocol::Ll128 => step / LL128_LINE_WORDS * LL128_DATA_WORDS,
    }
}

/// Smallest unit of work one thread handles, in bytes.
pub fn bytes_per_grain(proto: Protocol) -> usize {
    match proto {
        Protocol::Simple | Protocol::Ll => 8,
        Protocol::Ll128 => {
            LL128_SHMEM_ELEMS_PER_THREAD * LL128_DATA_WORDS * 8 / LL128_LINE_WORDS
        }
    }
}

/// One wire encoding of a pipeline step.
pub trait WireProtocol: Send + Sync + 'static {
    const ID: Protocol;

    /// Wait until the current receive step holds `len` complete bytes and
    /// copy them out.
    ///
    /// Must not mutate connection state: a cancelled read leaves the step
    /// exactly where it was.
    fn read_step(
        recv: &RecvConnector,
        len: usize,
        wait: &SpinWait<'_>,
        ll: &LlFlags,
    ) -> Result<Vec<u8>>;

    /// Stage `data` into the current send slot, publish it and advance the
    /// step. The caller has already acquired the slot.
    fn write_step(send: &mut SendConnector, data: &[u8], ll: &LlFlags);
}

/// Pack bytes into consecutive words, zero-padding the last one.
fn store_words(words: &[AtomicU64], data: &[u8], order: Ordering) {
    for (word, chunk) in words.iter().zip(data.chunks(8)) {
        let mut raw = [0u8; 8];
        raw[..chunk.len()].copy_from_slice(chunk);
        word.store(u64::from_le_bytes(raw), order);
    }
}

/// Append the little-endian bytes of `words` to `out`.
fn load_words(words: &[AtomicU64], out: &mut Vec<u8>, order: Ordering) {
    for word in words {
        out.extend_from_slice(&word.load(order).to_le_bytes());
    }
}
