//! Element-wise reduction and post-op kernels over little-endian byte
//! slices, used by the protocol primitives.

use crate::error::{Result, RingError};
use crate::types::{DataType, ReduceOp};

/// Scalar element that can live in a [`DeviceBuffer`](crate::memory::DeviceBuffer).
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DataType;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),*) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = DataType::$dtype;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Self::from_le_bytes(raw)
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(
    f32 => F32, f64 => F64, i8 => I8, i32 => I32, i64 => I64, u8 => U8, u32 => U32, u64 => U64
);

/// Types that support the reduction operators and the `Avg` post-op.
trait Reducible: Element {
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;
    fn divide(self, n: u64) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum | ReduceOp::Avg => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
                #[inline]
                fn divide(self, n: u64) -> Self {
                    (self as i128 / n as i128) as $ty
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum | ReduceOp::Avg => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
                #[inline]
                fn divide(self, n: u64) -> Self {
                    self / n as $ty
                }
            }
        )*
    };
}

impl_reducible!(int: i8, i32, i64, u8, u32, u64);
impl_reducible!(float: f32, f64);

/// `dst[i] = op(dst[i], src[i])` on byte slices interpreted as `dtype` elements.
///
/// `dst` and `src` must both contain exactly `count * dtype.size_in_bytes()` bytes.
pub(crate) fn reduce_slice(
    dst: &mut [u8],
    src: &[u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<()> {
    let expected = count * dtype.size_in_bytes();
    if dst.len() != expected || src.len() != expected {
        return Err(RingError::BufferSizeMismatch {
            expected,
            actual: dst.len().min(src.len()),
        });
    }
    match dtype {
        DataType::F32 => reduce_slice_typed::<f32>(dst, src, count, op),
        DataType::F64 => reduce_slice_typed::<f64>(dst, src, count, op),
        DataType::I32 => reduce_slice_typed::<i32>(dst, src, count, op),
        DataType::I64 => reduce_slice_typed::<i64>(dst, src, count, op),
        DataType::U32 => reduce_slice_typed::<u32>(dst, src, count, op),
        DataType::U64 => reduce_slice_typed::<u64>(dst, src, count, op),
        DataType::I8 => reduce_slice_typed::<i8>(dst, src, count, op),
        DataType::U8 => reduce_slice_typed::<u8>(dst, src, count, op),
        _ => {
            return Err(RingError::UnsupportedDType {
                dtype,
                op: "reduce",
            });
        }
    }
    Ok(())
}

/// Apply the operator's finishing transform in place.
///
/// Only `Avg` has one (divide by `arg`, the rank count); every other
/// operator leaves the data untouched.
pub(crate) fn apply_post_op(
    buf: &mut [u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
    arg: u64,
) -> Result<()> {
    if op != ReduceOp::Avg {
        return Ok(());
    }
    if arg == 0 {
        return Err(RingError::config("avg post-op with a zero divisor"));
    }
    match dtype {
        DataType::F32 => divide_slice_typed::<f32>(buf, count, arg),
        DataType::F64 => divide_slice_typed::<f64>(buf, count, arg),
        DataType::I32 => divide_slice_typed::<i32>(buf, count, arg),
        DataType::I64 => divide_slice_typed::<i64>(buf, count, arg),
        DataType::U32 => divide_slice_typed::<u32>(buf, count, arg),
        DataType::U64 => divide_slice_typed::<u64>(buf, count, arg),
        DataType::I8 => divide_slice_typed::<i8>(buf, count, arg),
        DataType::U8 => divide_slice_typed::<u8>(buf, count, arg),
        _ => {
            return Err(RingError::UnsupportedDType {
                dtype,
                op: "post_op",
            });
        }
    }
    Ok(())
}

fn reduce_slice_typed<T: Reducible>(dst: &mut [u8], src: &[u8], count: usize, op: ReduceOp) {
    let t_size = std::mem::size_of::<T>();
    for i in 0..count {
        let off = i * t_size;
        let a = T::read_le(&dst[off..off + t_size]);
        let b = T::read_le(&src[off..off + t_size]);
        T::reduce(a, b, op).write_le(&mut dst[off..off + t_size]);
    }
}

fn divide_slice_typed<T: Reducible>(buf: &mut [u8], count: usize, n: u64) {
    let t_size = std::mem::size_of::<T>();
    for i in 0..count {
        let off = i * t_size;
        let v = T::read_le(&buf[off..off + t_size]);
        v.divide(n).write_le(&mut buf[off..off + t_size]);
    }
}

/// Encode a typed slice as little-endian bytes.
pub fn to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let t_size = std::mem::size_of::<T>();
    let mut out = vec![0u8; values.len() * t_size];
    for (i, v) in values.iter().enumerate() {
        v.write_le(&mut out[i * t_size..(i + 1) * t_size]);
    }
    out
}

/// Decode little-endian bytes into a typed vector. Trailing partial
/// elements are ignored.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(T::read_le)
        .collect()
}
