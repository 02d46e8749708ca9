//! Connection and flow-control layer.
//!
//! A directional link between two ranks on one channel is a [`ConnShared`]:
//! protocol-indexed slot buffers plus the `head`/`tail` step counters. The
//! producer drives it through a [`SendConnector`], the consumer through a
//! [`RecvConnector`]. Whether the peer is local or behind a proxy is invisible
//! at this level; [`local`] wires in-process links.

mod connector;
mod flow;
pub mod local;

pub use connector::{ConnFlags, ConnShared, RecvConnector, SendConnector, SlotRange};
pub use flow::SpinWait;

/// Slots per connection buffer; also the flow-control window.
pub const NUM_STEPS: usize = 8;

/// Logical connections per peer and direction.
pub const MAX_CONNS: usize = 2;
