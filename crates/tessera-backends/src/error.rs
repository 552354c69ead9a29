//! Error types for backend operations

use crate::backend::{DType, KernelOp};
use std::fmt;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while managing device memory or launching kernels
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Device allocation failed
    #[error("device allocation of {requested} bytes failed")]
    AllocationFailed { requested: usize },

    /// No kernel exists for this operation/precision pair
    #[error("unsupported kernel: {op} for {dtype}")]
    UnsupportedKernel { op: KernelOp, dtype: DType },

    /// Kernel arguments do not match the kernel's arity or extents
    #[error("invalid kernel arguments: {0}")]
    InvalidKernelArguments(String),

    /// Execution error
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create an invalid kernel arguments error
    pub fn invalid_arguments(msg: impl fmt::Display) -> Self {
        Self::InvalidKernelArguments(msg.to_string())
    }

    /// Create an execution error
    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }
}
