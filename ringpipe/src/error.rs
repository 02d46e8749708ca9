use crate::types::{Algorithm, CollFunc, DataType, Protocol, Rank};

pub type Result<T> = std::result::Result<T, RingError>;

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("invalid ring on channel {channel}: {reason}")]
    InvalidRing { channel: u32, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("access of {len} bytes at offset {offset} exceeds buffer of {capacity} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("unsupported data type: {dtype:?} for operation {op}")]
    UnsupportedDType { dtype: DataType, op: &'static str },

    #[error("no kernel for {func} / {algorithm} / {protocol}")]
    Unsupported {
        func: CollFunc,
        algorithm: Algorithm,
        protocol: Protocol,
    },

    #[error("work queue of channel {channel} is full ({capacity} entries)")]
    WorkQueueFull { channel: u32, capacity: usize },

    #[error("channel {channel} has no {direction} connector to rank {peer} at index {conn_index}")]
    NotConnected {
        channel: u32,
        peer: Rank,
        conn_index: usize,
        direction: &'static str,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("execution group for channel {channel} failed: {reason}")]
    ExecutionFailed { channel: u32, reason: String },
}

impl RingError {
    /// Create an `InvalidConfig` error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidRing` error for `channel`.
    pub fn ring(channel: u32, reason: impl Into<String>) -> Self {
        Self::InvalidRing {
            channel,
            reason: reason.into(),
        }
    }

    /// True for errors raised by the cooperative abort path.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
