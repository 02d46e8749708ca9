use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use super::{LlFlags, WireProtocol};
use crate::channel::ChannelCounters;
use crate::error::{Result, RingError};
use crate::memory::DeviceBuffer;
use crate::reduce::{apply_post_op, reduce_slice};
use crate::transport::{RecvConnector, SendConnector, SpinWait};
use crate::types::{DataType, ReduceOp};

/// Per-group execution environment shared by every primitive instance.
#[derive(Clone, Copy)]
pub struct ProtoEnv<'a> {
    pub channel: u32,
    pub cancel: &'a CancellationToken,
    pub spins_before_yield: u32,
    pub ll: LlFlags,
    pub counters: &'a ChannelCounters,
}

/// Which halves of a step a primitive touches.
#[derive(Debug, Clone, Copy)]
struct Shape {
    recv: bool,
    send: bool,
    /// Read the local input buffer.
    src: bool,
    /// Write the local output buffer.
    dst: bool,
    post_op: bool,
}

const SEND: Shape = Shape {
    recv: false,
    send: true,
    src: true,
    dst: false,
    post_op: false,
};
const RECV: Shape = Shape {
    recv: true,
    send: false,
    src: false,
    dst: true,
    post_op: false,
};
const COPY_SEND: Shape = Shape {
    recv: false,
    send: true,
    src: true,
    dst: true,
    post_op: false,
};
const RECV_COPY_SEND: Shape = Shape {
    recv: true,
    send: true,
    src: false,
    dst: true,
    post_op: false,
};
const RECV_REDUCE_SEND: Shape = Shape {
    recv: true,
    send: true,
    src: true,
    dst: false,
    post_op: false,
};
const RECV_REDUCE_COPY: Shape = Shape {
    recv: true,
    send: false,
    src: true,
    dst: true,
    post_op: false,
};

/// The data-movement capability set of one execution group over one ring
/// link pair, specialised for wire protocol `P`.
///
/// Every call moves exactly one pipeline step on each connector it uses,
/// including calls with `n == 0`, so all ranks stay in lock-step. All
/// waits complete before any buffer or counter is mutated.
pub struct Primitives<'a, P: WireProtocol> {
    recv: Option<&'a mut RecvConnector>,
    send: Option<&'a mut SendConnector>,
    input: &'a DeviceBuffer,
    output: &'a DeviceBuffer,
    dtype: DataType,
    op: ReduceOp,
    red_op_arg: u64,
    channel: u32,
    ll: LlFlags,
    send_wait: SpinWait<'a>,
    recv_wait: SpinWait<'a>,
    counters: &'a ChannelCounters,
    _proto: PhantomData<P>,
}

impl<'a, P: WireProtocol> Primitives<'a, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        env: ProtoEnv<'a>,
        recv: Option<&'a mut RecvConnector>,
        send: Option<&'a mut SendConnector>,
        input: &'a DeviceBuffer,
        output: &'a DeviceBuffer,
        dtype: DataType,
        op: ReduceOp,
        red_op_arg: u64,
    ) -> Self {
        Self {
            recv,
            send,
            input,
            output,
            dtype,
            op,
            red_op_arg,
            channel: env.channel,
            ll: env.ll,
            send_wait: SpinWait::new(
                env.cancel,
                env.spins_before_yield,
                &env.counters.send_wait_polls,
            ),
            recv_wait: SpinWait::new(
                env.cancel,
                env.spins_before_yield,
                &env.counters.recv_wait_polls,
            ),
            counters: env.counters,
            _proto: PhantomData,
        }
    }

    /// Forward `input[offset..offset + n]` to the next rank.
    pub fn send(&mut self, offset: usize, n: usize) -> Result<()> {
        self.generic_op(SEND, offset, n)
    }

    /// Receive into `output[offset..offset + n]`.
    pub fn recv(&mut self, offset: usize, n: usize) -> Result<()> {
        self.generic_op(RECV, offset, n)
    }

    /// Copy input to output and forward it.
    pub fn copy_send(&mut self, offset: usize, n: usize) -> Result<()> {
        self.generic_op(COPY_SEND, offset, n)
    }

    /// Receive into output and forward the same bytes.
    pub fn recv_copy_send(&mut self, offset: usize, n: usize) -> Result<()> {
        self.generic_op(RECV_COPY_SEND, offset, n)
    }

    /// Combine the local input with the received partial and forward it.
    pub fn recv_reduce_send(&mut self, offset: usize, n: usize) -> Result<()> {
        self.generic_op(RECV_REDUCE_SEND, offset, n)
    }

    /// Combine the local input with the received partial into output,
    /// optionally applying the operator's post-op.
    pub fn recv_reduce_copy(&mut self, offset: usize, n: usize, post_op: bool) -> Result<()> {
        let shape = Shape {
            post_op,
            ..RECV_REDUCE_COPY
        };
        self.generic_op(shape, offset, n)
    }

    fn missing(&self, direction: &str) -> RingError {
        RingError::ExecutionFailed {
            channel: self.channel,
            reason: format!("{} primitive without a {direction} connector", P::ID),
        }
    }

    fn generic_op(&mut self, shape: Shape, offset: usize, n: usize) -> Result<()> {
        let elem = self.dtype.size_in_bytes();
        let byte_offset = offset * elem;
        let n_bytes = n * elem;

        let local = if shape.src && n_bytes > 0 {
            Some(self.input.read(byte_offset, n_bytes)?)
        } else {
            None
        };

        // ── Waits ──
        if shape.send {
            let send = self.send.as_deref().ok_or_else(|| self.missing("send"))?;
            send.acquire_send_slot(1, &self.send_wait)?;
        }
        let received = if shape.recv {
            let recv = self.recv.as_deref().ok_or_else(|| self.missing("recv"))?;
            Some(P::read_step(recv, n_bytes, &self.recv_wait, &self.ll)?)
        } else {
            None
        };

        // ── Combine ──
        let mut data = match (local, received) {
            (Some(mut acc), Some(partial)) => {
                reduce_slice(&mut acc, &partial, n, self.dtype, self.op)?;
                acc
            }
            (Some(local), None) => local,
            (None, Some(partial)) => partial,
            (None, None) => Vec::new(),
        };
        if shape.post_op && n > 0 {
            apply_post_op(&mut data, n, self.dtype, self.op, self.red_op_arg)?;
        }

        // ── Publish ──
        if shape.dst && n_bytes > 0 {
            self.output.write(byte_offset, &data)?;
        }
        if let Some(send) = self.send.as_deref_mut().filter(|_| shape.send) {
            P::write_step(send, &data, &self.ll);
            self.counters
                .send_bytes
                .fetch_add(n_bytes as u64, Ordering::Relaxed);
        }
        if let Some(recv) = self.recv.as_deref_mut().filter(|_| shape.recv) {
            recv.release_recv_slot(1);
            self.counters
                .recv_bytes
                .fetch_add(n_bytes as u64, Ordering::Relaxed);
        }
        self.counters.primitive_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
