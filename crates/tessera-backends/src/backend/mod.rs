//! Backend abstraction: trait plus handle and kernel types

pub mod traits;
pub mod types;

pub use traits::Backend;
pub use types::{BufferHandle, DType, KernelCall, KernelOp, Operand};
