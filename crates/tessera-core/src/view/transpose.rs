use crate::coherency::Coherent;
use crate::error::{Error, Result};
use crate::expr::{impl_expr_ops, Expr, WritableExpr};
use crate::shape::{flat_index, unravel, Order};
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};

/// 2-D transpose by index remapping
pub struct Transpose<E> {
    referent: E,
    referent_dims: [usize; 2],
    order: Order,
}

impl<E: Expr> Transpose<E> {
    pub fn new(referent: E) -> Result<Self> {
        let dims = referent.dims();
        let referent_dims: [usize; 2] = dims
            .as_slice()
            .try_into()
            .map_err(|_| Error::invalid_shape(format!("transpose needs 2 dimensions, got {}", dims.len())))?;
        let order = referent.order();
        Ok(Self {
            referent,
            referent_dims,
            order,
        })
    }

    pub fn referent(&self) -> &E {
        &self.referent
    }

    fn map(&self, i: usize) -> usize {
        let [rows, cols] = self.referent_dims;
        let idx = unravel(&[cols, rows], self.order, i);
        flat_index(&self.referent_dims, self.order, &[idx[1], idx[0]])
    }
}

impl<E: Expr> Expr for Transpose<E> {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        vec![self.referent_dims[1], self.referent_dims[0]]
    }

    fn order(&self) -> Order {
        self.order
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        self.referent.read_flat(self.map(i))
    }

    fn is_vectorizable(&self) -> bool {
        false
    }

    fn is_thread_safe(&self) -> bool {
        self.referent.is_thread_safe()
    }

    fn is_flat_aligned(&self) -> bool {
        false
    }

    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        self.referent.collect_storage(out);
    }

    fn validate(&self) -> Result<()> {
        self.referent.validate()
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.referent.visit_temporaries(alloc)
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        self.referent.visit_evaluator(visitor, need_value)
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.referent.visit_back_propagate(visitor);
    }

    fn prepare_host(&self) -> Result<()> {
        self.referent.prepare_host()
    }
}

impl<E: WritableExpr> Coherent for Transpose<E> {
    fn invalidate_host(&self) -> Result<()> {
        self.referent.invalidate_host()
    }
    fn invalidate_device(&self) {
        self.referent.invalidate_device()
    }
    fn validate_host(&self) {
        self.referent.validate_host()
    }
    fn validate_device(&self) {
        self.referent.validate_device()
    }
    fn is_host_current(&self) -> bool {
        self.referent.is_host_current()
    }
    fn is_device_current(&self) -> bool {
        self.referent.is_device_current()
    }
    fn ensure_host_current(&self) -> Result<()> {
        self.referent.ensure_host_current()
    }
    fn ensure_device_current(&self) -> Result<()> {
        self.referent.ensure_device_current()
    }
}

impl<E: WritableExpr> WritableExpr for Transpose<E> {
    fn write_flat(&self, i: usize, value: Self::Elem) -> Result<()> {
        self.referent.write_flat(self.map(i), value)
    }

    fn resize_to(&self, dims: &[usize]) -> Result<()> {
        Err(Error::shape_mismatch(&self.dims(), dims))
    }
}

impl_expr_ops!([E] Transpose<E>);
