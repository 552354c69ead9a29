use super::{impl_expr_ops, Expr};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::shape::Order;
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};
use std::marker::PhantomData;

/// Elementwise binary operation
pub trait BinaryOp: Send + Sync + 'static {
    const NAME: &'static str;

    fn apply<T: Element>(lhs: T, rhs: T) -> T;
}

macro_rules! binary_op {
    ($name:ident, $label:literal, |$l:ident, $r:ident| $body:expr) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl BinaryOp for $name {
            const NAME: &'static str = $label;

            #[inline]
            fn apply<T: Element>($l: T, $r: T) -> T {
                $body
            }
        }
    };
}

binary_op!(AddOp, "add", |l, r| l.add_wrapping(r));
binary_op!(SubOp, "sub", |l, r| l.sub_wrapping(r));
binary_op!(MulOp, "mul", |l, r| l.mul_wrapping(r));
binary_op!(DivOp, "div", |l, r| l / r);
binary_op!(RemOp, "rem", |l, r| l % r);
binary_op!(MinOp, "min", |l, r| l.min_of(r));
binary_op!(MaxOp, "max", |l, r| l.max_of(r));

/// Lazy elementwise `lhs (op) rhs`
///
/// Operand sizes are checked by [`Expr::validate`] when the node is
/// assigned, not when it is built.
pub struct Binary<L, R, O> {
    lhs: L,
    rhs: R,
    _op: PhantomData<O>,
}

impl<L, R, O> Binary<L, R, O> {
    pub fn new(lhs: L, rhs: R) -> Self {
        Self {
            lhs,
            rhs,
            _op: PhantomData,
        }
    }

    pub fn lhs(&self) -> &L {
        &self.lhs
    }

    pub fn rhs(&self) -> &R {
        &self.rhs
    }
}

/// Elementwise minimum
pub fn min<L: Expr, R: Expr<Elem = L::Elem>>(lhs: L, rhs: R) -> Binary<L, R, MinOp> {
    Binary::new(lhs, rhs)
}

/// Elementwise maximum
pub fn max<L: Expr, R: Expr<Elem = L::Elem>>(lhs: L, rhs: R) -> Binary<L, R, MaxOp> {
    Binary::new(lhs, rhs)
}

impl<L, R, O> Expr for Binary<L, R, O>
where
    L: Expr,
    R: Expr<Elem = L::Elem>,
    O: BinaryOp,
{
    type Elem = L::Elem;

    fn dims(&self) -> Vec<usize> {
        if self.lhs.is_broadcast() {
            self.rhs.dims()
        } else {
            self.lhs.dims()
        }
    }

    fn order(&self) -> Order {
        if self.lhs.is_broadcast() {
            self.rhs.order()
        } else {
            self.lhs.order()
        }
    }

    #[inline]
    fn read_flat(&self, i: usize) -> Self::Elem {
        O::apply(self.lhs.read_flat(i), self.rhs.read_flat(i))
    }

    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        self.lhs.load(start, out)?;
        let mut rhs = vec![<Self::Elem as Element>::zero(); out.len()];
        self.rhs.load(start, &mut rhs)?;
        for (l, r) in out.iter_mut().zip(rhs) {
            *l = O::apply(*l, r);
        }
        Ok(())
    }

    fn is_vectorizable(&self) -> bool {
        self.lhs.is_vectorizable() && self.rhs.is_vectorizable()
    }

    fn is_thread_safe(&self) -> bool {
        self.lhs.is_thread_safe() && self.rhs.is_thread_safe()
    }

    fn is_flat_aligned(&self) -> bool {
        self.lhs.is_flat_aligned() && self.rhs.is_flat_aligned()
    }

    fn is_broadcast(&self) -> bool {
        self.lhs.is_broadcast() && self.rhs.is_broadcast()
    }

    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        self.lhs.collect_storage(out);
        self.rhs.collect_storage(out);
    }

    fn validate(&self) -> Result<()> {
        self.lhs.validate()?;
        self.rhs.validate()?;
        if self.lhs.is_broadcast() || self.rhs.is_broadcast() {
            return Ok(());
        }

        let (lhs, rhs) = (self.lhs.dims(), self.rhs.dims());
        if lhs.iter().product::<usize>() != rhs.iter().product::<usize>() {
            return Err(Error::shape_mismatch(&lhs, &rhs));
        }
        if self.lhs.order() != self.rhs.order() {
            return Err(Error::invalid_shape(format!(
                "operands of {} use different storage orders",
                O::NAME
            )));
        }
        Ok(())
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.lhs.visit_temporaries(alloc)?;
        self.rhs.visit_temporaries(alloc)
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        self.lhs.visit_evaluator(visitor, need_value)?;
        self.rhs.visit_evaluator(visitor, need_value)
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.lhs.visit_back_propagate(visitor);
        self.rhs.visit_back_propagate(visitor);
    }

    fn prepare_host(&self) -> Result<()> {
        self.lhs.prepare_host()?;
        self.rhs.prepare_host()
    }
}

impl_expr_ops!([L, R, O] Binary<L, R, O>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{scalar, ExprExt};
    use crate::tensor::DynTensor;

    #[test]
    fn test_chained_arithmetic() {
        let a = DynTensor::from_vec(vec![4], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
        let b = DynTensor::from_vec(vec![4], vec![4.0f64, 3.0, 2.0, 1.0]).unwrap();

        let expr = (&a + &b) * scalar(2.0) - &a;
        assert_eq!(expr.to_vec().unwrap(), vec![9.0, 8.0, 7.0, 6.0]);
    }

    #[test]
    fn test_min_max() {
        let a = DynTensor::from_vec(vec![3], vec![1i64, 5, 3]).unwrap();
        let b = DynTensor::from_vec(vec![3], vec![4i64, 2, 3]).unwrap();

        assert_eq!(min(&a, &b).to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(max(&a, &b).to_vec().unwrap(), vec![4, 5, 3]);
    }

    #[test]
    fn test_integer_remainder() {
        let a = DynTensor::from_vec(vec![3], vec![7i32, 8, 9]).unwrap();
        assert_eq!((&a % scalar(4)).to_vec().unwrap(), vec![3, 0, 1]);
    }

    #[test]
    fn test_size_mismatch_detected_on_validate() {
        let a = DynTensor::<f32>::new(vec![2, 3]).unwrap();
        let b = DynTensor::<f32>::new(vec![3, 3]).unwrap();

        let expr = &a + &b;
        match expr.validate() {
            Err(Error::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![2, 3]);
                assert_eq!(actual, vec![3, 3]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_same_size_different_dims_is_accepted() {
        let a = DynTensor::from_vec(vec![2, 2], vec![1i32, 2, 3, 4]).unwrap();
        let b = DynTensor::from_vec(vec![4], vec![1i32, 1, 1, 1]).unwrap();
        assert!((&a + &b).validate().is_ok());
        assert_eq!((&a + &b).dims(), vec![2, 2]);
    }
}
