/// Rank of a participant in a communicator (0-indexed).
pub type Rank = u32;

/// Number of wire protocols.
pub const NUM_PROTOCOLS: usize = 3;

/// Element types supported by the engine.
///
/// Every type can be moved (broadcast); `F16` and `BF16` cannot be reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    F16 = 2,
    BF16 = 3,
    I8 = 4,
    I32 = 5,
    I64 = 6,
    U8 = 7,
    U32 = 8,
    U64 = 9,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
            DataType::F16 | DataType::BF16 => 2,
            DataType::I8 | DataType::U8 => 1,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::F16 => "f16",
            DataType::BF16 => "bf16",
            DataType::I8 => "i8",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U8 => "u8",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }

    /// Whether element-wise reduction kernels exist for this type.
    pub const fn is_reducible(self) -> bool {
        !matches!(self, DataType::F16 | DataType::BF16)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Element-wise sum across ranks.
    Sum,
    /// Element-wise product across ranks.
    Prod,
    /// Element-wise minimum across ranks.
    Min,
    /// Element-wise maximum across ranks.
    Max,
    /// Sum, divided by the rank count once at the combination terminus.
    Avg,
}

impl ReduceOp {
    /// Argument carried in the work descriptor for this operator.
    ///
    /// `Avg` carries the divisor applied by the post-op; the others carry 0.
    pub const fn red_op_arg(self, n_ranks: u32) -> u64 {
        match self {
            ReduceOp::Avg => n_ranks as u64,
            _ => 0,
        }
    }
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
            ReduceOp::Avg => f.write_str("avg"),
        }
    }
}

/// Wire protocol used to move one chunk across a connection.
///
/// Discriminants index the per-protocol buffer arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Protocol {
    /// Low latency: 8-byte words carrying 4 data bytes and a 4-byte flag.
    Ll = 0,
    /// 128-byte lines with one flag word per line.
    Ll128 = 1,
    /// Bulk copies completed by head/tail counters.
    Simple = 2,
}

impl Protocol {
    pub const ALL: [Protocol; NUM_PROTOCOLS] = [Protocol::Ll, Protocol::Ll128, Protocol::Simple];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Protocol::Ll => "ll",
            Protocol::Ll128 => "ll128",
            Protocol::Simple => "simple",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Collective algorithm. Only `Ring` has kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Algorithm {
    Tree = 0,
    Ring = 1,
    CollNet = 2,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Tree => f.write_str("tree"),
            Algorithm::Ring => f.write_str("ring"),
            Algorithm::CollNet => f.write_str("collnet"),
        }
    }
}

/// Collective function named by a work descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CollFunc {
    Broadcast = 0,
    Reduce = 1,
    AllGather = 2,
    ReduceScatter = 3,
    AllReduce = 4,
}

impl CollFunc {
    /// Whether the function combines data with a reduction operator.
    pub const fn reduces(self) -> bool {
        matches!(
            self,
            CollFunc::Reduce | CollFunc::ReduceScatter | CollFunc::AllReduce
        )
    }
}

impl std::fmt::Display for CollFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollFunc::Broadcast => f.write_str("broadcast"),
            CollFunc::Reduce => f.write_str("reduce"),
            CollFunc::AllGather => f.write_str("allgather"),
            CollFunc::ReduceScatter => f.write_str("reducescatter"),
            CollFunc::AllReduce => f.write_str("allreduce"),
        }
    }
}
