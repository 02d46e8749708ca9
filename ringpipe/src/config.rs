//! Setup-time tuning parameters for the ring engine.
//!
//! All values have defaults matching the reference kernel constants. Override
//! fields with struct-update syntax and call [`RingConfig::validate`] (done by
//! `Communicator::new`) before any connection is built.

use crate::error::{Result, RingError};
use crate::protocol::{self, LL128_LINE_BYTES, LL_LINE_BYTES};
use crate::transport::NUM_STEPS;
use crate::types::{NUM_PROTOCOLS, Protocol};

/// Upper bound on the logical thread width of an execution group.
pub const MAX_NTHREADS: u16 = 256;

/// Upper bound on channels per communicator.
pub const MAX_CHANNELS: usize = 32;

/// Default per-connection buffer sizes, indexed by [`Protocol::index`].
pub const DEFAULT_BUFF_SIZES: [usize; NUM_PROTOCOLS] = [
    // LL: 8 lines per thread, 256 threads, 8 steps, 16-byte lines.
    8 * 256 * NUM_STEPS * LL_LINE_BYTES,
    // LL128: 120 words per thread, 256 threads, 8 steps, 8-byte words.
    120 * 256 * NUM_STEPS * 8,
    // Simple: 4 MiB.
    1 << 22,
];

/// Tuning parameters for channels, connections and protocols.
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Logical thread width of each execution group. Scales the Simple and
    /// LL alignment granule and the LL128 minimum chunk.
    pub n_threads: u16,

    /// Bytes of slot buffer per connection and protocol (all `NUM_STEPS`
    /// slots together).
    pub buff_sizes: [usize; NUM_PROTOCOLS],

    /// LL flags are `(step + 1) % ll_flag_max`.
    pub ll_flag_max: u64,

    /// The LL sender rewrites every unused line of a slot whenever
    /// `step & ll_clean_mask == ll_clean_mask`.
    pub ll_clean_mask: u64,

    /// Capacity of each channel's work queue.
    pub work_fifo_depth: usize,

    /// Busy-spin iterations before a waiting group starts yielding its
    /// OS thread.
    pub spins_before_yield: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            n_threads: MAX_NTHREADS,
            buff_sizes: DEFAULT_BUFF_SIZES,
            ll_flag_max: 1 << 32,
            ll_clean_mask: 0x7fff_fff8,
            work_fifo_depth: 2048,
            spins_before_yield: 64,
        }
    }
}

impl RingConfig {
    /// Buffer size for one protocol.
    pub fn buff_size(&self, proto: Protocol) -> usize {
        self.buff_sizes[proto.index()]
    }

    /// Check alignment and chunk-size bounds.
    ///
    /// Violations are configuration errors: they are reported here, at
    /// setup, and never surface during a transfer.
    pub fn validate(&self) -> Result<()> {
        if self.n_threads == 0 || self.n_threads > MAX_NTHREADS {
            return Err(RingError::config(format!(
                "n_threads must be in 1..={MAX_NTHREADS}, got {}",
                self.n_threads
            )));
        }
        let thread_bytes = self.n_threads as usize * 8;

        let simple = self.buff_size(Protocol::Simple);
        if simple == 0 || simple % (NUM_STEPS * 8) != 0 {
            return Err(RingError::config(format!(
                "simple buffer of {simple} bytes is not a positive multiple of {}",
                NUM_STEPS * 8
            )));
        }
        let simple_step = protocol::bytes_per_step(Protocol::Simple, simple);
        if simple_step % thread_bytes != 0 {
            return Err(RingError::config(format!(
                "simple step of {simple_step} bytes is not a multiple of n_threads * 8 = {thread_bytes}"
            )));
        }

        let ll = self.buff_size(Protocol::Ll);
        if ll == 0 || ll % (NUM_STEPS * LL_LINE_BYTES) != 0 {
            return Err(RingError::config(format!(
                "ll buffer of {ll} bytes is not a positive multiple of {}",
                NUM_STEPS * LL_LINE_BYTES
            )));
        }
        let ll_step = protocol::bytes_per_step(Protocol::Ll, ll);
        if ll_step % thread_bytes != 0 {
            return Err(RingError::config(format!(
                "ll step payload of {ll_step} bytes is not a multiple of n_threads * 8 = {thread_bytes}"
            )));
        }

        let ll128 = self.buff_size(Protocol::Ll128);
        if ll128 == 0 || ll128 % (NUM_STEPS * LL128_LINE_BYTES) != 0 {
            return Err(RingError::config(format!(
                "ll128 buffer of {ll128} bytes is not a positive multiple of {}",
                NUM_STEPS * LL128_LINE_BYTES
            )));
        }
        // The LL128 minimum chunk for 1-byte elements must fit in one step.
        let ll128_step = protocol::bytes_per_step(Protocol::Ll128, ll128);
        let min_chunk_bytes =
            self.n_threads as usize * protocol::bytes_per_grain(Protocol::Ll128);
        if min_chunk_bytes > ll128_step {
            return Err(RingError::config(format!(
                "ll128 step payload of {ll128_step} bytes is below the minimum chunk of {min_chunk_bytes} bytes"
            )));
        }

        if self.ll_flag_max <= NUM_STEPS as u64 || self.ll_flag_max > 1 << 32 {
            return Err(RingError::config(format!(
                "ll_flag_max must be in {}..=2^32, got {}",
                NUM_STEPS + 1,
                self.ll_flag_max
            )));
        }
        if self.ll_clean_mask % NUM_STEPS as u64 != 0 || self.ll_clean_mask >= self.ll_flag_max {
            return Err(RingError::config(format!(
                "ll_clean_mask {:#x} must be a multiple of {NUM_STEPS} below ll_flag_max {:#x}",
                self.ll_clean_mask, self.ll_flag_max
            )));
        }

        // A slot must be cleaned at least once before the flag it holds comes
        // around again.
        let clean_period = if self.ll_clean_mask == 0 {
            NUM_STEPS as u64
        } else {
            2 << (63 - self.ll_clean_mask.leading_zeros())
        };
        if clean_period >= self.ll_flag_max {
            return Err(RingError::config(format!(
                "ll_clean_mask {:#x} cleans every {clean_period} steps, not within ll_flag_max {:#x}",
                self.ll_clean_mask, self.ll_flag_max
            )));
        }

        if self.work_fifo_depth == 0 {
            return Err(RingError::config("work_fifo_depth must be positive"));
        }
        Ok(())
    }
}
