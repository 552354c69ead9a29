//! Error types for tessera-core operations

use tessera_backends::{BackendError, DType};

/// Result type for tessera-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or evaluating tensor expressions
///
/// Shape errors are raised before any memory is touched. Resource and
/// device errors abort the statement; the destination is never left
/// half-evaluated by a shape error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dimension vectors that must agree do not
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// Shape that is malformed on its own (wrong arity, empty range, zero window)
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Element index outside the container
    #[error("index {index} out of bounds for {size} elements")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Scratch or device allocation failed
    #[error("out of memory: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    /// No kernel for this operation at this precision, and no host fallback requested
    #[error("unsupported operation: {op} for {dtype}")]
    Unsupported { op: &'static str, dtype: DType },

    /// Illegal coherency transition
    #[error("coherency violation: {0}")]
    Coherency(String),

    /// Requested backend is not available in this build or on this machine
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Operands of one device kernel live on different devices
    #[error("operands are bound to different devices")]
    DeviceMismatch,

    /// Device failure reported by the backend
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }
}

/// Map allocation failures from the backend onto the resource-exhaustion class
pub(crate) fn allocation_error(err: BackendError) -> Error {
    match err {
        BackendError::AllocationFailed { requested } => Error::OutOfMemory { requested },
        other => Error::Backend(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_names_both_shapes() {
        let err = Error::shape_mismatch(&[2, 3], &[3, 2]);
        assert_eq!(err.to_string(), "shape mismatch: expected [2, 3], got [3, 2]");
    }

    #[test]
    fn test_allocation_failure_is_out_of_memory() {
        let err = allocation_error(BackendError::AllocationFailed { requested: 64 });
        assert!(matches!(err, Error::OutOfMemory { requested: 64 }));

        let err = allocation_error(BackendError::InvalidBufferHandle(3));
        assert!(matches!(err, Error::Backend(BackendError::InvalidBufferHandle(3))));
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::Unsupported {
            op: "softplus",
            dtype: DType::I32,
        };
        assert_eq!(err.to_string(), "unsupported operation: softplus for i32");
    }
}
