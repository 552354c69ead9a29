use crate::coherency::Coherent;
use crate::error::{Error, Result};
use crate::expr::{impl_expr_ops, Expr, WritableExpr};
use crate::shape::{size_of, Order};
use crate::tensor::{StorageCell, StorageId, StorageRef};
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// The referent under a different dimension vector with the same element count
///
/// When the referent is backed by storage, the view keeps a weak link to it
/// and reads through that link. The link is refreshed by every pass, so a
/// referent re-materialized into new scratch is picked up before the
/// transfer starts; once the scratch is released the link dies and reads go
/// back through the referent.
pub struct Reshape<E: Expr> {
    referent: E,
    dims: Vec<usize>,
    cached: Mutex<Option<Weak<StorageCell<E::Elem>>>>,
}

impl<E: Expr> Reshape<E> {
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] when `dims` holds a different number of elements.
    pub fn new(referent: E, dims: Vec<usize>) -> Result<Self> {
        let referent_dims = referent.dims();
        if size_of(&dims) != size_of(&referent_dims) {
            return Err(Error::shape_mismatch(&referent_dims, &dims));
        }

        let cached = referent.direct_storage().map(|cell| Arc::downgrade(&cell));
        Ok(Self {
            referent,
            dims,
            cached: Mutex::new(cached),
        })
    }

    pub fn referent(&self) -> &E {
        &self.referent
    }

    fn cell(&self) -> Option<StorageRef<E::Elem>> {
        self.cached.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Point the cached link at the referent's current storage; true if it moved
    fn relink(&self) -> bool {
        let fresh = self.referent.direct_storage();
        let mut cached = self.cached.lock();
        let changed = match (cached.as_ref().and_then(Weak::upgrade), &fresh) {
            (Some(old), Some(new)) => !Arc::ptr_eq(&old, new),
            (None, None) => false,
            _ => true,
        };
        *cached = fresh.as_ref().map(Arc::downgrade);
        changed
    }
}

impl<E: Expr> Expr for Reshape<E> {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    fn order(&self) -> Order {
        self.referent.order()
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        match self.cell() {
            Some(cell) => cell.read_flat(i),
            None => self.referent.read_flat(i),
        }
    }

    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        match self.cell() {
            Some(cell) => cell.load(start, out),
            None => self.referent.load(start, out),
        }
    }

    fn is_direct(&self) -> bool {
        self.referent.is_direct()
    }

    fn is_vectorizable(&self) -> bool {
        self.referent.is_vectorizable()
    }

    fn is_thread_safe(&self) -> bool {
        self.referent.is_thread_safe()
    }

    fn is_flat_aligned(&self) -> bool {
        self.referent.is_flat_aligned()
    }

    fn direct_storage(&self) -> Option<StorageRef<Self::Elem>> {
        self.referent.direct_storage()
    }

    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        self.referent.collect_storage(out);
    }

    fn validate(&self) -> Result<()> {
        self.referent.validate()
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.referent.visit_temporaries(alloc)?;
        self.relink();
        Ok(())
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        self.referent.visit_evaluator(visitor, need_value)?;
        self.relink();
        Ok(())
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.referent.visit_back_propagate(visitor);
        if self.relink() {
            visitor.note_relinked();
        }
    }

    fn prepare_host(&self) -> Result<()> {
        match self.cell() {
            Some(cell) => cell.ensure_host_current(),
            None => self.referent.prepare_host(),
        }
    }
}

impl<E: WritableExpr> Coherent for Reshape<E> {
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

impl<E: WritableExpr> WritableExpr for Reshape<E> {
    fn write_flat(&self, i: usize, value: Self::Elem) -> Result<()> {
        self.referent.write_flat(i, value)
    }

    fn store(&self, start: usize, values: &[Self::Elem]) -> Result<()> {
        self.referent.store(start, values)
    }

    fn resize_to(&self, dims: &[usize]) -> Result<()> {
        Err(Error::shape_mismatch(&self.dims, dims))
    }
}

impl_expr_ops!([E: Expr] Reshape<E>);
