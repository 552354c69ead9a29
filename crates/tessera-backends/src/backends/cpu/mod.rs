//! CPU backend implementation
//!
//! Reference implementation of the Backend trait. Device memory is simulated
//! by a dedicated memory manager so that the host/device coherency protocol
//! is exercised exactly as it would be against a discrete accelerator.
//!
//! # Architecture
//!
//! ```text
//! CpuBackend
//! ├── MemoryManager  - Handle-addressed device buffers
//! └── kernels        - Fused elementwise kernels (f32/f64, partial i32/i64)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use tessera_backends::{Backend, CpuBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//!
//! let buffer = backend.allocate_buffer(1024)?;
//! assert_eq!(backend.buffer_size(buffer)?, 1024);
//!
//! backend.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

mod kernels;
pub(crate) mod memory;

use crate::backend::{Backend, BufferHandle, DType, KernelCall, KernelOp};
use crate::error::Result;
use memory::MemoryManager;
use parking_lot::RwLock;
use std::sync::Arc;

/// CPU backend with handle-addressed device memory
///
/// Cloning shares the same memory manager.
#[derive(Clone)]
pub struct CpuBackend {
    /// Memory manager (device buffers)
    memory: Arc<RwLock<MemoryManager>>,
}

impl CpuBackend {
    /// Create a new CPU backend
    ///
    /// # Example
    ///
    /// ```rust
    /// use tessera_backends::CpuBackend;
    ///
    /// let backend = CpuBackend::new();
    /// assert_eq!(backend.live_buffers(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            memory: Arc::new(RwLock::new(MemoryManager::new())),
        }
    }

    /// Number of device buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.memory.read().buffer_count()
    }

    /// Bytes currently allocated on the device
    pub fn allocated_bytes(&self) -> usize {
        self.memory.read().allocated_bytes()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.memory.write().allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.write().free_buffer(handle)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, data)
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: usize) -> Result<()> {
        self.memory.write().copy_buffer(src, dst, size)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.read().buffer_size(handle)
    }

    fn supports(&self, op: KernelOp, dtype: DType) -> bool {
        kernels::supports(op, dtype)
    }

    #[tracing::instrument(skip(self, call), fields(op = %call.op, dtype = %call.dtype, n = call.n))]
    fn launch(&mut self, call: &KernelCall) -> Result<()> {
        let start = std::time::Instant::now();

        kernels::launch(&mut self.memory.write(), call)?;

        tracing::debug!(
            duration_us = start.elapsed().as_micros() as u64,
            kernel = %call,
            "cpu_kernel_complete"
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
