use super::{impl_expr_ops, Expr};
use crate::element::Element;
use crate::error::Result;
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};

/// Constant broadcast to the shape of the other operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar<T> {
    value: T,
}

impl<T: Element> Scalar<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> T {
        self.value
    }
}

pub fn scalar<T: Element>(value: T) -> Scalar<T> {
    Scalar::new(value)
}

impl<T: Element> Expr for Scalar<T> {
    type Elem = T;

    fn dims(&self) -> Vec<usize> {
        Vec::new()
    }

    #[inline]
    fn read_flat(&self, _i: usize) -> T {
        self.value
    }

    fn load(&self, _start: usize, out: &mut [T]) -> Result<()> {
        out.fill(self.value);
        Ok(())
    }

    fn is_broadcast(&self) -> bool {
        true
    }

    fn collect_storage(&self, _out: &mut Vec<StorageId>) {}

    fn visit_temporaries(&self, _alloc: &mut TemporaryAllocator<T>) -> Result<()> {
        Ok(())
    }

    fn visit_evaluator(&self, _visitor: &mut EvaluatorVisitor<'_>, _need_value: bool) -> Result<()> {
        Ok(())
    }

    fn visit_back_propagate(&self, _visitor: &mut BackPropagateVisitor) {}

    fn prepare_host(&self) -> Result<()> {
        Ok(())
    }
}

impl_expr_ops!([T] Scalar<T>);
