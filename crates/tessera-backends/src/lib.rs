//! Device backends for tessera tensors
//!
//! This crate provides:
//! - **Backend Trait**: Pluggable device memory and kernel interface
//! - **CPU Backend**: Reference implementation with handle-addressed memory
//! - **Capability Table**: Which fused kernels a device can launch, per precision
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   tessera-core tensors                   │
//! │        (host storage + coherency + expressions)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ BufferHandle / KernelCall
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Backend Trait                        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!               ┌───────┴───────┐
//!               ▼               ▼
//!         ┌─────────┐     ┌─────────┐
//!         │   CPU   │     │ vendor  │
//!         │ Backend │     │ binding │
//!         └─────────┘     └─────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use tessera_backends::{Backend, CapabilityTable, CpuBackend, DType, KernelCall, KernelOp};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//! let caps = CapabilityTable::probe(&backend);
//! assert!(caps.supports(KernelOp::Scale, DType::F32));
//!
//! let buffer = backend.allocate_buffer(16)?;
//! backend.copy_to_buffer(buffer, bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]))?;
//! backend.launch(&KernelCall::new(KernelOp::Scale, DType::F32, 4).alpha(0.5).operand(buffer))?;
//!
//! let mut out = [0.0f32; 4];
//! backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut out))?;
//! assert_eq!(out, [0.5, 1.0, 1.5, 2.0]);
//!
//! backend.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod capability;
pub mod error;

// Re-export public API
pub use backend::{Backend, BufferHandle, DType, KernelCall, KernelOp, Operand};
pub use backends::CpuBackend;
pub use capability::CapabilityTable;
pub use error::{BackendError, Result};
