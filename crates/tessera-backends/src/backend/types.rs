//! Types for backend handles and kernel launches

use std::fmt;

/// Handle to an allocated device buffer
///
/// Buffers are opaque handles managed by the backend.
/// Use Backend methods to interact with buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Create a new buffer handle
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    /// Get the internal ID
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Scalar precision of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
}

impl DType {
    /// All precisions known to the backends
    pub const ALL: [DType; 4] = [DType::F32, DType::F64, DType::I32, DType::I64];

    /// Size of one element in bytes
    pub const fn size_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Whether the precision is a floating point type
    pub const fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
        };
        f.write_str(name)
    }
}

/// Fused elementwise kernels a device binding can provide
///
/// Operands are listed in the order they appear in [`KernelCall::operands`]:
///
/// | op         | operands  | effect                          |
/// |------------|-----------|---------------------------------|
/// | `Axpy`     | `x, y`    | `y = alpha * x + y`             |
/// | `Scale`    | `y`       | `y = alpha * y`                 |
/// | `AddInto`  | `x, y`    | `y = y + x`                     |
/// | `SubInto`  | `x, y`    | `y = y - x`                     |
/// | `MulInto`  | `x, y`    | `y = y * x`                     |
/// | `DivInto`  | `x, y`    | `y = y / x`                     |
/// | `Softplus` | `x, y`    | `y = alpha * ln(1 + exp(x))`    |
/// | `Apxdbpy`  | `x, y, z` | `z = (alpha + x) / (beta + y)`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelOp {
    Axpy,
    Scale,
    AddInto,
    SubInto,
    MulInto,
    DivInto,
    Softplus,
    Apxdbpy,
}

impl KernelOp {
    /// All kernels known to the backends
    pub const ALL: [KernelOp; 8] = [
        KernelOp::Axpy,
        KernelOp::Scale,
        KernelOp::AddInto,
        KernelOp::SubInto,
        KernelOp::MulInto,
        KernelOp::DivInto,
        KernelOp::Softplus,
        KernelOp::Apxdbpy,
    ];

    /// Number of buffer operands the kernel takes
    pub const fn arity(self) -> usize {
        match self {
            KernelOp::Scale => 1,
            KernelOp::Apxdbpy => 3,
            _ => 2,
        }
    }

    /// Kernel name as exposed by vendor bindings
    pub const fn name(self) -> &'static str {
        match self {
            KernelOp::Axpy => "axpy",
            KernelOp::Scale => "scal",
            KernelOp::AddInto => "add_into",
            KernelOp::SubInto => "sub_into",
            KernelOp::MulInto => "mul_into",
            KernelOp::DivInto => "div_into",
            KernelOp::Softplus => "softplus",
            KernelOp::Apxdbpy => "apxdbpy_3",
        }
    }
}

impl fmt::Display for KernelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One buffer argument of a kernel: handle plus leading dimension (stride in elements)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub handle: BufferHandle,
    pub ld: usize,
}

impl Operand {
    /// Contiguous operand (leading dimension 1)
    pub const fn contiguous(handle: BufferHandle) -> Self {
        Self { handle, ld: 1 }
    }
}

/// A single fused elementwise kernel launch
#[derive(Debug, Clone, PartialEq)]
pub struct KernelCall {
    pub op: KernelOp,
    pub dtype: DType,
    /// Number of elements processed
    pub n: usize,
    pub alpha: f64,
    pub beta: f64,
    pub operands: Vec<Operand>,
}

impl KernelCall {
    /// Create a launch with `alpha = 1`, `beta = 0` and no operands
    pub fn new(op: KernelOp, dtype: DType, n: usize) -> Self {
        Self {
            op,
            dtype,
            n,
            alpha: 1.0,
            beta: 0.0,
            operands: Vec::with_capacity(op.arity()),
        }
    }

    /// Set the alpha scaling factor
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the beta scaling factor
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Append a contiguous operand
    pub fn operand(mut self, handle: BufferHandle) -> Self {
        self.operands.push(Operand::contiguous(handle));
        self
    }

    /// Append an operand with an explicit leading dimension
    pub fn strided_operand(mut self, handle: BufferHandle, ld: usize) -> Self {
        self.operands.push(Operand { handle, ld });
        self
    }
}

impl fmt::Display for KernelCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>(n={}", self.op, self.dtype, self.n)?;
        for operand in &self.operands {
            write!(f, ", {}:{}", operand.handle, operand.ld)?;
        }
        f.write_str(")")
    }
}
