//! Partitioning of an operation into per-channel pipeline chunks.

use crate::error::{Result, RingError};
use crate::protocol;
use crate::types::Protocol;

/// Chunk geometry of one channel's share of an operation, in elements.
#[derive(Debug, Clone)]
pub struct ChunkSchedule {
    proto: Protocol,
    size: usize,
    n_channels: usize,
    bid: usize,
    n_threads: usize,
    elem_size: usize,
    chunk_size: usize,
    min_chunk_ll128: usize,
    last_chunk_size: usize,
}

impl ChunkSchedule {
    /// `bytes_per_step` is the protocol's step payload; `last_chunk_size`
    /// comes from the work descriptor and only matters for LL.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        proto: Protocol,
        size: usize,
        n_channels: usize,
        bid: usize,
        n_threads: usize,
        elem_size: usize,
        bytes_per_step: usize,
        last_chunk_size: usize,
    ) -> Result<Self> {
        let chunk_size = bytes_per_step / elem_size;
        let min_chunk_ll128 = n_threads * (protocol::bytes_per_grain(Protocol::Ll128) / elem_size);
        if chunk_size == 0 || n_channels == 0 || bid >= n_channels {
            return Err(RingError::config(format!(
                "cannot schedule {proto} chunks: chunk_size {chunk_size}, bid {bid} of {n_channels}"
            )));
        }
        if proto == Protocol::Ll && size % (n_channels * chunk_size) != 0 && last_chunk_size == 0
        {
            return Err(RingError::config("ll schedule without a last chunk size"));
        }
        Ok(Self {
            proto,
            size,
            n_channels,
            bid,
            n_threads,
            elem_size,
            chunk_size,
            min_chunk_ll128,
            last_chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Elements covered by all channels in one loop iteration.
    pub fn loop_size(&self) -> usize {
        self.n_channels * self.chunk_size
    }

    /// Chunk size used by the loop iteration starting at `grid_offset`.
    pub fn real_chunk_size(&self, grid_offset: usize) -> usize {
        let remaining = self.size - grid_offset;
        match self.proto {
            Protocol::Simple => {
                let grain = self.n_threads * 8 / self.elem_size;
                self.chunk_size
                    .min(remaining.div_ceil(self.n_channels))
                    .next_multiple_of(grain)
            }
            Protocol::Ll => {
                if remaining < self.loop_size() {
                    self.last_chunk_size
                } else {
                    self.chunk_size
                }
            }
            Protocol::Ll128 => {
                let min = self.min_chunk_ll128;
                (remaining.div_ceil(self.n_channels * min) * min).min(self.chunk_size)
            }
        }
    }

    /// `(offset, n)` of every chunk this channel handles, in order. `n` may
    /// be zero for trailing channels; such steps must still be performed.
    pub fn chunks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.size)
            .step_by(self.loop_size())
            .map(move |grid_offset| {
                let real = self.real_chunk_size(grid_offset);
                let offset = grid_offset + self.bid * real;
                let n = self.size.saturating_sub(offset).min(real);
                (offset.min(self.size), n)
            })
    }
}

/// Host-side LL chunk size for the final, partial loop iteration.
pub fn ll_last_chunk_size(
    n_bytes: usize,
    n_channels: usize,
    n_threads: usize,
    bytes_per_step: usize,
    elem_size: usize,
) -> usize {
    let loop_bytes = n_channels * (bytes_per_step / elem_size) * elem_size;
    if loop_bytes == 0 {
        return 0;
    }
    (n_bytes % loop_bytes)
        .div_ceil(n_channels)
        .next_multiple_of(n_threads * 8)
        / elem_size
}
