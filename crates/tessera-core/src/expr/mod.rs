//! Expression-graph node protocol
//!
//! Every node (tensor, view, computed node, kernel node, generator)
//! implements [`Expr`]. Applying an operator builds a node without touching
//! any data; assignment runs the visitor passes and then pulls values
//! through [`Expr::load`].
//!
//! Node categories differ only in which capabilities they report:
//!
//! | node        | direct | flat-aligned | owns storage | visitor work                 |
//! |-------------|--------|--------------|--------------|------------------------------|
//! | `Tensor`    | yes    | yes          | yes          | ensure host copy when needed |
//! | views       | maybe  | reshape only | no           | re-link cached storage       |
//! | `Binary` .. | no     | if children  | no           | forward to children          |
//! | kernels     | once evaluated | yes  | scratch      | allocate + compute           |
//! | generators  | no     | yes          | no           | none                         |

mod binary;
mod ops;
mod scalar;
mod unary;

pub use binary::{max, min, AddOp, Binary, BinaryOp, DivOp, MaxOp, MinOp, MulOp, RemOp, SubOp};
pub use scalar::{scalar, Scalar};
pub use unary::{abs, exp, log, relu, softplus, sqrt, AbsOp, ExpOp, LogOp, NegOp, ReluOp, SoftplusOp, SqrtOp, Unary, UnaryOp};

pub(crate) use ops::impl_expr_ops;

use crate::coherency::Coherent;
use crate::element::Element;
use crate::error::Result;
use crate::shape::{flat_index, size_of, Order};
use crate::tensor::{DynTensor, StorageId, StorageRef};
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};

/// A node of an expression graph
pub trait Expr: Send + Sync {
    type Elem: Element;

    fn dims(&self) -> Vec<usize>;

    fn size(&self) -> usize {
        size_of(&self.dims())
    }

    /// Number of dimensions
    fn dimensions(&self) -> usize {
        self.dims().len()
    }

    /// Extent of dimension `d`
    fn dim(&self, d: usize) -> usize {
        self.dims()[d]
    }

    fn order(&self) -> Order {
        Order::RowMajor
    }

    /// Element at flat position `i`
    ///
    /// `i` must be below [`Expr::size`]; out-of-range access is a caller
    /// error and may panic.
    ///
    /// Leaves whose host copy is stale read the device copy back first and
    /// panic if that fails. Outside a statement prefer the fallible
    /// [`Tensor::get`](crate::Tensor::get), [`Tensor::at`](crate::Tensor::at)
    /// or [`ExprExt::to_vec`].
    fn read_flat(&self, i: usize) -> Self::Elem;

    fn read_at(&self, idx: &[usize]) -> Self::Elem {
        self.read_flat(flat_index(&self.dims(), self.order(), idx))
    }

    /// Bulk load of `out.len()` elements starting at flat position `start`
    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = self.read_flat(start + k);
        }
        Ok(())
    }

    /// Backed by directly addressable memory
    fn is_direct(&self) -> bool {
        false
    }

    /// Bulk load/store beats element access
    fn is_vectorizable(&self) -> bool {
        true
    }

    /// Chunks may be read from several threads at once
    fn is_thread_safe(&self) -> bool {
        true
    }

    /// Element `i` depends only on element `i` of the storage leaves
    fn is_flat_aligned(&self) -> bool {
        true
    }

    /// Yields a value for any index; takes its size from the other operand
    fn is_broadcast(&self) -> bool {
        false
    }

    /// Storage holding this node's value, when it has one
    fn direct_storage(&self) -> Option<StorageRef<Self::Elem>> {
        None
    }

    /// Storage buffers this node reads
    fn collect_storage(&self, out: &mut Vec<StorageId>);

    /// Whether this node reads storage that `other` also reads or writes
    fn aliases<O: Expr>(&self, other: &O) -> bool {
        let mut mine = Vec::new();
        self.collect_storage(&mut mine);
        if mine.is_empty() {
            return false;
        }

        let mut theirs = Vec::new();
        other.collect_storage(&mut theirs);
        mine.iter().any(|id| theirs.contains(id))
    }

    /// Shape checks that need the whole subtree
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Temporary-allocation pass (post-order)
    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()>;

    /// Evaluator pass; `need_value` asks for the value realized in memory
    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()>;

    /// Back-propagation pass
    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor);

    /// Make the host copy of every storage leaf current
    fn prepare_host(&self) -> Result<()>;
}

/// A node that can be assigned to
pub trait WritableExpr: Expr + Coherent {
    fn write_flat(&self, i: usize, value: Self::Elem) -> Result<()>;

    /// Bulk write of `values` starting at flat position `start`
    fn store(&self, start: usize, values: &[Self::Elem]) -> Result<()> {
        for (k, &value) in values.iter().enumerate() {
            self.write_flat(start + k, value)?;
        }
        Ok(())
    }

    /// Whether assignment may reshape this node to `dims`
    fn can_resize_to(&self, dims: &[usize]) -> bool {
        dims == self.dims().as_slice()
    }

    fn resize_to(&self, dims: &[usize]) -> Result<()>;
}

impl<E: Expr> Expr for &E {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        (**self).dims()
    }
    fn size(&self) -> usize {
        (**self).size()
    }
    fn order(&self) -> Order {
        (**self).order()
    }
    fn read_flat(&self, i: usize) -> Self::Elem {
        (**self).read_flat(i)
    }
    fn read_at(&self, idx: &[usize]) -> Self::Elem {
        (**self).read_at(idx)
    }
    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        (**self).load(start, out)
    }
    fn is_direct(&self) -> bool {
        (**self).is_direct()
    }
    fn is_vectorizable(&self) -> bool {
        (**self).is_vectorizable()
    }
    fn is_thread_safe(&self) -> bool {
        (**self).is_thread_safe()
    }
    fn is_flat_aligned(&self) -> bool {
        (**self).is_flat_aligned()
    }
    fn is_broadcast(&self) -> bool {
        (**self).is_broadcast()
    }
    fn direct_storage(&self) -> Option<StorageRef<Self::Elem>> {
        (**self).direct_storage()
    }
    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        (**self).collect_storage(out)
    }
    fn validate(&self) -> Result<()> {
        (**self).validate()
    }
    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        (**self).visit_temporaries(alloc)
    }
    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        (**self).visit_evaluator(visitor, need_value)
    }
    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        (**self).visit_back_propagate(visitor)
    }
    fn prepare_host(&self) -> Result<()> {
        (**self).prepare_host()
    }
}

impl<W: WritableExpr> WritableExpr for &W {
    fn write_flat(&self, i: usize, value: Self::Elem) -> Result<()> {
        (**self).write_flat(i, value)
    }
    fn store(&self, start: usize, values: &[Self::Elem]) -> Result<()> {
        (**self).store(start, values)
    }
    fn can_resize_to(&self, dims: &[usize]) -> bool {
        (**self).can_resize_to(dims)
    }
    fn resize_to(&self, dims: &[usize]) -> Result<()> {
        (**self).resize_to(dims)
    }
}

/// Evaluation helpers for any expression
pub trait ExprExt: Expr + Sized {
    /// Evaluate into a fresh tensor
    fn evaluate(&self) -> Result<DynTensor<Self::Elem>> {
        let out = DynTensor::empty().with_order(self.order());
        crate::evaluator::assign(&out, crate::evaluator::AssignOp::Assign, self)?;
        Ok(out)
    }

    /// Evaluate and copy out the elements
    fn to_vec(&self) -> Result<Vec<Self::Elem>> {
        self.evaluate()?.to_vec()
    }

    /// Pin this node into scratch memory for the statement that reads it
    fn materialized(self) -> crate::kernels::Materialized<Self> {
        crate::kernels::Materialized::new(self)
    }
}

impl<E: Expr> ExprExt for E {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DynTensor;

    #[test]
    fn test_building_does_not_touch_data() {
        let a = DynTensor::from_vec(vec![3], vec![1.0f64, 2.0, 3.0]).unwrap();
        let b = DynTensor::from_vec(vec![3], vec![10.0f64, 20.0, 30.0]).unwrap();

        let expr = &a + &b;
        a.set(0, 5.0).unwrap();
        assert_eq!(expr.read_flat(0), 15.0);
    }

    #[test]
    fn test_aliases_is_structural() {
        let a = DynTensor::from_vec(vec![2], vec![1i32, 2]).unwrap();
        let b = DynTensor::from_vec(vec![2], vec![3i32, 4]).unwrap();

        assert!((&a + &b).aliases(&a));
        assert!(!(&b * scalar(2)).aliases(&a));
        assert!(a.share().aliases(&a));
        assert!(!scalar(1i32).aliases(&a));
    }

    #[test]
    fn test_broadcast_takes_other_shape() {
        let a = DynTensor::from_vec(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let expr = scalar(1.0f32) + &a;
        assert_eq!(expr.dims(), vec![2, 2]);
        assert_eq!(expr.dimensions(), 2);
        assert_eq!(expr.dim(1), 2);
        assert_eq!(expr.to_vec().unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_read_at_uses_dims() {
        let a = DynTensor::from_vec(vec![2, 3], (0..6).map(f64::from).collect()).unwrap();
        let expr = -&a;
        assert_eq!(expr.read_at(&[1, 2]), -5.0);
    }
}
