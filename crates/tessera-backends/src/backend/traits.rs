//! Backend trait for device memory and kernel execution
//!
//! This trait defines the interface that all device backends must implement.
//! The core never touches device memory directly: every transfer, allocation
//! and kernel launch goes through these methods.

use super::types::{BufferHandle, DType, KernelCall, KernelOp};
use crate::error::Result;

/// Backend trait for device memory management and fused kernel execution
///
/// # Architecture
///
/// ```text
/// ┌─────────────────────────────────────────────────────────┐
/// │                     Backend Trait                        │
/// │  - Buffer management (allocate/free/copy)                │
/// │  - Fused elementwise kernels (launch)                    │
/// │  - Capability probing (supports)                         │
/// └─────────────────────┬───────────────────────────────────┘
///                       │
///               ┌───────┴───────┐
///               ▼               ▼
///         ┌─────────┐     ┌─────────┐
///         │   CPU   │     │   GPU   │
///         │ Backend │     │ Backend │
///         └─────────┘     └─────────┘
/// ```
///
/// # Memory Model
///
/// Device buffers are addressed only through [`BufferHandle`]s. Host code
/// moves data in and out with [`copy_to_buffer`](Backend::copy_to_buffer) and
/// [`copy_from_buffer`](Backend::copy_from_buffer); the device may run
/// launches asynchronously, and [`synchronize`](Backend::synchronize) blocks
/// until every prior launch has completed.
///
/// # Usage
///
/// ```rust
/// use tessera_backends::{Backend, CpuBackend, DType, KernelCall, KernelOp};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut backend = CpuBackend::new();
///
/// let x = backend.allocate_buffer(16)?;
/// let y = backend.allocate_buffer(16)?;
/// backend.copy_to_buffer(x, bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]))?;
/// backend.copy_to_buffer(y, bytemuck::cast_slice(&[1.0f32; 4]))?;
///
/// let call = KernelCall::new(KernelOp::Axpy, DType::F32, 4).alpha(2.0).operand(x).operand(y);
/// backend.launch(&call)?;
///
/// let mut out = [0.0f32; 4];
/// backend.copy_from_buffer(y, bytemuck::cast_slice_mut(&mut out))?;
/// assert_eq!(out, [3.0, 5.0, 7.0, 9.0]);
///
/// backend.free_buffer(x)?;
/// backend.free_buffer(y)?;
/// # Ok(())
/// # }
/// ```
pub trait Backend {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    // ============================================================================================
    // Buffer Management
    // ============================================================================================

    /// Allocate a buffer of the given size in bytes
    ///
    /// The contents of a fresh buffer are unspecified.
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    /// Free a previously allocated buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer handle is invalid.
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Copy data from host to buffer (H2D)
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is invalid or `data` is larger than the buffer.
    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Copy data from buffer to host (D2H)
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is invalid or `data` is larger than the buffer.
    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()>;

    /// Copy `size` bytes between two device buffers (D2D)
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: usize) -> Result<()>;

    /// Get buffer size in bytes
    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    // ============================================================================================
    // Kernels
    // ============================================================================================

    /// Whether this backend has a kernel for the operation at the given precision
    fn supports(&self, op: KernelOp, dtype: DType) -> bool;

    /// Launch one fused elementwise kernel
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnsupportedKernel`](crate::BackendError::UnsupportedKernel)
    /// when [`supports`](Backend::supports) is false for the pair, and
    /// [`BackendError::InvalidKernelArguments`](crate::BackendError::InvalidKernelArguments)
    /// when the operand list does not match the kernel.
    fn launch(&mut self, call: &KernelCall) -> Result<()>;

    /// Block until every launch issued so far has completed
    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }

    // ============================================================================================
    // Downcasting
    // ============================================================================================

    /// Get reference to self as Any for downcasting
    fn as_any(&self) -> &dyn std::any::Any;

    /// Get mutable reference to self as Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
