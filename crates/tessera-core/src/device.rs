//! Device context: the backend that holds device copies of tensors
//!
//! A `Device` wraps a [`tessera_backends::Backend`] the way an executor
//! wraps its backend: shared, behind a lock, with the kernel capability
//! table probed once at construction and read-only afterwards.
//!
//! ```text
//! Tensor storage ──ensure_device_current──▶ Device::upload ──▶ Backend::copy_to_buffer
//!                ◀─ensure_host_current──── Device::download ◀─ Backend::copy_from_buffer
//! ```

use crate::error::{allocation_error, Error, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tessera_backends::{Backend, BufferHandle, CapabilityTable, CpuBackend, DType, KernelCall, KernelOp};
use tessera_tracing::performance::{record_allocation, record_kernel, record_transfer, TransferDirection};

/// Backend selection for a [`Device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Reference backend with simulated device memory (always available)
    Cpu,
    /// NVIDIA GPUs
    Cuda,
}

/// Counters for traffic between host and device
#[derive(Debug, Default)]
pub struct TransferStats {
    h2d_copies: AtomicU64,
    h2d_bytes: AtomicU64,
    d2h_copies: AtomicU64,
    d2h_bytes: AtomicU64,
    d2d_copies: AtomicU64,
    kernel_launches: AtomicU64,
    allocations: AtomicU64,
}

/// Point-in-time copy of [`TransferStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub h2d_copies: u64,
    pub h2d_bytes: u64,
    pub d2h_copies: u64,
    pub d2h_bytes: u64,
    pub d2d_copies: u64,
    pub kernel_launches: u64,
    pub allocations: u64,
}

impl TransferStats {
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            h2d_copies: self.h2d_copies.load(Ordering::Relaxed),
            h2d_bytes: self.h2d_bytes.load(Ordering::Relaxed),
            d2h_copies: self.d2h_copies.load(Ordering::Relaxed),
            d2h_bytes: self.d2h_bytes.load(Ordering::Relaxed),
            d2d_copies: self.d2d_copies.load(Ordering::Relaxed),
            kernel_launches: self.kernel_launches.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }
}

/// Shared handle to one device backend
#[derive(Clone)]
pub struct Device {
    backend: Arc<RwLock<Box<dyn Backend + Send + Sync>>>,
    backend_type: BackendType,
    capabilities: Arc<CapabilityTable>,
    stats: Arc<TransferStats>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("backend_type", &self.backend_type)
            .field("kernels", &self.capabilities.len())
            .finish()
    }
}

static GLOBAL_DEVICE: OnceLock<Device> = OnceLock::new();

impl Device {
    /// Create a device with the given backend
    ///
    /// # Errors
    ///
    /// [`Error::DeviceUnavailable`] when the backend is not built into this binary.
    #[tracing::instrument]
    pub fn new(backend_type: BackendType) -> Result<Self> {
        match backend_type {
            BackendType::Cpu => Ok(Self::cpu()),
            BackendType::Cuda => Err(Error::DeviceUnavailable(
                "CUDA backend is not built into this binary".to_string(),
            )),
        }
    }

    /// Pick the best available backend, falling back to the CPU
    #[tracing::instrument]
    pub fn new_auto() -> Result<Self> {
        if let Ok(device) = Self::new(BackendType::Cuda) {
            tracing::info!("Auto-selected CUDA backend");
            return Ok(device);
        }

        tracing::info!("Auto-selected CPU backend (fallback)");
        Self::new(BackendType::Cpu)
    }

    /// CPU reference device
    pub fn cpu() -> Self {
        Self::from_backend(Box::new(CpuBackend::new()), BackendType::Cpu)
    }

    /// Wrap an existing backend, probing its kernel capabilities
    pub fn from_backend(backend: Box<dyn Backend + Send + Sync>, backend_type: BackendType) -> Self {
        let (capabilities, duration_us) =
            tessera_tracing::timed_block!("capability_probe", { CapabilityTable::probe(backend.as_ref()) });

        tracing::debug!(
            duration_us,
            backend = backend.name(),
            kernels = capabilities.len(),
            "device_created"
        );

        Self {
            backend: Arc::new(RwLock::new(backend)),
            backend_type,
            capabilities: Arc::new(capabilities),
            stats: Arc::new(TransferStats::default()),
        }
    }

    /// Replace the capability table, e.g. to model a binding built without some kernels
    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = Arc::new(capabilities);
        self
    }

    /// Process-wide default device used by tensors not bound elsewhere
    pub fn global() -> &'static Device {
        GLOBAL_DEVICE.get_or_init(Device::cpu)
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    /// Shared reference to the backend
    pub fn backend(&self) -> Arc<RwLock<Box<dyn Backend + Send + Sync>>> {
        Arc::clone(&self.backend)
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn supports(&self, op: KernelOp, dtype: DType) -> bool {
        self.capabilities.supports(op, dtype)
    }

    pub fn stats(&self) -> TransferSnapshot {
        self.stats.snapshot()
    }

    /// Whether both handles refer to the same backend instance
    pub fn same_as(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }

    /// Allocate device memory, freed when the returned buffer drops
    #[tracing::instrument(skip(self), fields(backend = ?self.backend_type))]
    pub fn allocate(&self, bytes: usize) -> Result<DeviceBuffer> {
        let start = Instant::now();
        let handle = self.backend.write().allocate_buffer(bytes).map_err(allocation_error)?;

        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        record_allocation(bytes, self.backend.read().name(), start.elapsed().as_micros() as u64);

        Ok(DeviceBuffer {
            handle,
            bytes,
            device: self.clone(),
        })
    }

    /// Copy host bytes into a device buffer (H2D)
    #[tracing::instrument(skip(self, data), fields(handle = %handle, bytes = data.len()))]
    pub fn upload(&self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        self.backend.write().copy_to_buffer(handle, data)?;

        self.stats.h2d_copies.fetch_add(1, Ordering::Relaxed);
        self.stats.h2d_bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
        record_transfer(data.len(), TransferDirection::HostToDevice, start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Copy a device buffer into host bytes (D2H)
    ///
    /// Synchronizes first: every launch that may write the buffer completes
    /// before the copy starts.
    #[tracing::instrument(skip(self, out), fields(handle = %handle, bytes = out.len()))]
    pub fn download(&self, handle: BufferHandle, out: &mut [u8]) -> Result<()> {
        let start = Instant::now();
        let mut backend = self.backend.write();
        backend.synchronize()?;
        backend.copy_from_buffer(handle, out)?;
        drop(backend);

        self.stats.d2h_copies.fetch_add(1, Ordering::Relaxed);
        self.stats.d2h_bytes.fetch_add(out.len() as u64, Ordering::Relaxed);
        record_transfer(out.len(), TransferDirection::DeviceToHost, start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Copy between two buffers on this device (D2D)
    #[tracing::instrument(skip(self), fields(src = %src, dst = %dst))]
    pub fn copy(&self, src: BufferHandle, dst: BufferHandle, bytes: usize) -> Result<()> {
        let start = Instant::now();
        self.backend.write().copy_buffer(src, dst, bytes)?;

        self.stats.d2d_copies.fetch_add(1, Ordering::Relaxed);
        record_transfer(bytes, TransferDirection::DeviceToDevice, start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Launch one fused kernel after checking the capability table
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] when the table has no entry for the pair.
    pub fn launch(&self, call: &KernelCall) -> Result<()> {
        if !self.supports(call.op, call.dtype) {
            return Err(Error::Unsupported {
                op: call.op.name(),
                dtype: call.dtype,
            });
        }

        let start = Instant::now();
        self.backend.write().launch(call)?;

        self.stats.kernel_launches.fetch_add(1, Ordering::Relaxed);
        record_kernel(call.op.name(), call.n, start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Block until all launched work has completed
    pub fn synchronize(&self) -> Result<()> {
        self.backend.write().synchronize()?;
        Ok(())
    }
}

/// One device allocation, released on drop
pub struct DeviceBuffer {
    handle: BufferHandle,
    bytes: usize,
    device: Device,
}

impl DeviceBuffer {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn upload(&self, data: &[u8]) -> Result<()> {
        self.device.upload(self.handle, data)
    }

    pub fn download(&self, out: &mut [u8]) -> Result<()> {
        self.device.download(self.handle, out)
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("handle", &self.handle)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.device.backend.write().free_buffer(self.handle) {
            tracing::warn!(handle = %self.handle, error = %err, "device_buffer_free_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_buffers(device: &Device) -> usize {
        let backend = device.backend();
        let guard = backend.read();
        guard
            .as_any()
            .downcast_ref::<CpuBackend>()
            .map(CpuBackend::live_buffers)
            .unwrap_or_default()
    }

    #[test]
    fn test_cuda_unavailable() {
        assert!(matches!(Device::new(BackendType::Cuda), Err(Error::DeviceUnavailable(_))));
        assert_eq!(Device::new_auto().unwrap().backend_type(), BackendType::Cpu);
    }

    #[test]
    fn test_buffer_freed_on_drop() {
        let device = Device::cpu();
        let buffer = device.allocate(64).unwrap();
        assert_eq!(buffer.bytes(), 64);
        assert_eq!(live_buffers(&device), 1);

        drop(buffer);
        assert_eq!(live_buffers(&device), 0);
        assert_eq!(device.stats().allocations, 1);
    }

    #[test]
    fn test_upload_download_counted() {
        let device = Device::cpu();
        let buffer = device.allocate(8).unwrap();

        buffer.upload(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut out = [0u8; 8];
        buffer.download(&mut out).unwrap();

        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        let stats = device.stats();
        assert_eq!(stats.h2d_copies, 1);
        assert_eq!(stats.h2d_bytes, 8);
        assert_eq!(stats.d2h_copies, 1);
        assert_eq!(stats.d2h_bytes, 8);
    }

    #[test]
    fn test_launch_checks_capabilities() {
        let device = Device::cpu().with_capabilities(CapabilityTable::empty());
        let buffer = device.allocate(4).unwrap();

        let call = KernelCall::new(KernelOp::Scale, DType::F32, 1).operand(buffer.handle());
        assert!(matches!(
            device.launch(&call),
            Err(Error::Unsupported {
                op: "scal",
                dtype: DType::F32
            })
        ));
        assert_eq!(device.stats().kernel_launches, 0);
    }

    #[test]
    fn test_global_device_is_shared() {
        assert!(Device::global().same_as(Device::global()));
        assert!(!Device::cpu().same_as(Device::global()));
    }
}
