//! # tessera-core - Lazy Tensor Expressions with Host/Device Coherency
//!
//! Arithmetic on tensors and views builds an expression graph without
//! touching data. Assignment evaluates the graph into a destination, keeping
//! each buffer's host and device copies coherent along the way.
//!
//! ## Architecture
//!
//! ```text
//! dest.assign(&(&a + &b * scalar(2.0)))
//!        │
//!        ├─ validate shapes (shape errors before any memory is touched)
//!        ├─ visitor passes: allocate temporaries → evaluate kernel nodes → re-link views
//!        ├─ materialize the source if it aliases the destination unsafely
//!        └─ chunked transfer (rayon above the parallel threshold)
//! ```
//!
//! Every buffer carries two validity flags, one per physical copy. Reads
//! ensure the host copy is current, writes invalidate the device copy, and
//! device kernels do the reverse. Synchronization is lazy: a stale copy is
//! refreshed only when something reads it.
//!
//! ## Example
//!
//! ```
//! use tessera_core::prelude::*;
//!
//! # fn main() -> tessera_core::Result<()> {
//! let a = DynTensor::from_vec(vec![2, 2], vec![1.0f64, 2.0, 3.0, 4.0])?;
//! let b = DynTensor::empty();
//!
//! b.assign(&(&a + &a))?;
//! a.set(0, 100.0)?;
//! assert_eq!(b.to_vec()?, vec![2.0, 4.0, 6.0, 8.0]);
//!
//! let row = a.sub(1)?;
//! row.add_assign_expr(&scalar(10.0))?;
//! assert_eq!(a.to_vec()?, vec![100.0, 2.0, 13.0, 14.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`tensor`] - value containers and their coherency state
//! - [`expr`] - the node protocol, computed nodes and operators
//! - [`view`] - reshape, sub, slice and transpose views
//! - [`visitor`] - the three per-statement passes
//! - [`evaluator`] - assignment statements
//! - [`kernels`] - pooling and device elementwise kernels
//! - [`generator`] - index-driven generators

pub mod coherency;
pub mod config;
pub mod device;
pub mod element;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod generator;
pub mod kernels;
pub mod shape;
pub mod tensor;
pub mod view;
pub mod visitor;

// Re-export primary types
pub use coherency::{CoherencyState, Coherent};
pub use config::EvalConfig;
pub use device::{BackendType, Device, DeviceBuffer, TransferSnapshot};
pub use element::Element;
pub use error::{Error, Result};
pub use evaluator::{assign, assign_with, AssignOp};
pub use expr::{Expr, ExprExt, WritableExpr};
pub use shape::{Order, Shape};
pub use tensor::{DynTensor, Matrix, StorageId, Tensor};
pub use view::ViewAssign;

/// Everything needed to build and assign expressions
pub mod prelude {
    pub use crate::coherency::Coherent;
    pub use crate::evaluator::AssignOp;
    pub use crate::expr::{abs, exp, log, max, min, relu, scalar, softplus, sqrt, Expr, ExprExt, WritableExpr};
    pub use crate::generator::{dropout_mask, dropout_mask_seeded, sequence};
    pub use crate::kernels::{max_pool_3d, max_pool_3d_with};
    pub use crate::shape::Order;
    pub use crate::tensor::{DynTensor, Matrix, Tensor};
    pub use crate::view::{reshape, slice, sub, transpose, ViewAssign};
    pub use crate::{Device, Error, Result};
}
