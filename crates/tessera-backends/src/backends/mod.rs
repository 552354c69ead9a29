//! Backend implementations for different execution targets
//!
//! This module contains:
//! - `cpu` - CPU backend (reference implementation with simulated device memory)

pub mod cpu;

pub use cpu::CpuBackend;
