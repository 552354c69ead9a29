//! Memory manager for the CPU backend
//!
//! Device buffers live in their own handle-addressed heap allocations, never
//! shared with host containers. A host copy and a device copy of the same
//! tensor are therefore genuinely distinct, and every transfer between them
//! is an explicit copy.

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};
use std::collections::HashMap;

/// Memory manager for the CPU backend
///
/// HashMap-based storage keyed by buffer id. Ids start at 1 and are never
/// reused within one manager.
pub struct MemoryManager {
    /// Buffer storage
    buffers: HashMap<u64, Vec<u8>>,

    /// Next buffer handle ID
    next_buffer_id: u64,

    /// Total bytes currently allocated
    allocated_bytes: usize,
}

impl MemoryManager {
    /// Create an empty memory manager
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
            allocated_bytes: 0,
        }
    }

    /// Allocate a zero-filled buffer
    ///
    /// Uses fallible reservation so that exhaustion surfaces as
    /// [`BackendError::AllocationFailed`] instead of aborting.
    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|_| BackendError::AllocationFailed { requested: size })?;
        storage.resize(size, 0u8);

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;

        self.buffers.insert(id, storage);
        self.allocated_bytes += size;

        Ok(BufferHandle::new(id))
    }

    /// Free a buffer
    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        match self.buffers.remove(&handle.id()) {
            Some(storage) => {
                self.allocated_bytes -= storage.len();
                Ok(())
            }
            None => Err(BackendError::InvalidBufferHandle(handle.id())),
        }
    }

    /// Copy data to the start of a buffer
    pub fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;

        if data.len() > buffer.len() {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: buffer.len(),
            });
        }

        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy data from the start of a buffer
    pub fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(handle)?;

        if data.len() > buffer.len() {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size: data.len(),
                buffer_size: buffer.len(),
            });
        }

        data.copy_from_slice(&buffer[..data.len()]);
        Ok(())
    }

    /// Copy `size` bytes from one buffer to another
    pub fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, size: usize) -> Result<()> {
        if src == dst {
            return Ok(());
        }

        let source = self.buffer(src)?;
        if size > source.len() {
            return Err(BackendError::BufferOutOfBounds {
                offset: 0,
                size,
                buffer_size: source.len(),
            });
        }
        let bytes = source[..size].to_vec();

        self.copy_to_buffer(dst, &bytes)
    }

    /// Get buffer size
    pub fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.buffer(handle).map(|b| b.len())
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total bytes held by live buffers
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub(crate) fn buffer(&self, handle: BufferHandle) -> Result<&[u8]> {
        self.buffers
            .get(&handle.id())
            .map(|b| b.as_slice())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub(crate) fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut [u8]> {
        self.buffers
            .get_mut(&handle.id())
            .map(|b| b.as_mut_slice())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}
