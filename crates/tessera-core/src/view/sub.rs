//! Sub-range views along the first dimension

use crate::coherency::Coherent;
use crate::error::{Error, Result};
use crate::expr::{impl_expr_ops, Expr, WritableExpr};
use crate::shape::{flat_index, size_of, unravel, Order};
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};

/// Where a range view's elements sit in its referent
#[derive(Debug, Clone)]
struct Window {
    referent_dims: Vec<usize>,
    dims: Vec<usize>,
    order: Order,
    first: usize,
    /// First index fixed (sub-view) rather than offset (slice)
    fixed: bool,
}

impl Window {
    fn offset(&self) -> usize {
        self.first * size_of(&self.referent_dims[1..])
    }

    fn map(&self, i: usize) -> usize {
        match self.order {
            Order::RowMajor => self.offset() + i,
            Order::ColumnMajor => {
                let idx = unravel(&self.dims, self.order, i);
                let mut outer = Vec::with_capacity(self.referent_dims.len());
                if self.fixed {
                    outer.push(self.first);
                    outer.extend_from_slice(&idx);
                } else {
                    outer.extend_from_slice(&idx);
                    outer[0] += self.first;
                }
                flat_index(&self.referent_dims, self.order, &outer)
            }
        }
    }

    fn contiguous(&self) -> bool {
        self.order == Order::RowMajor
    }
}

macro_rules! range_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<E> {
            referent: E,
            window: Window,
        }

        impl<E> $name<E> {
            pub fn referent(&self) -> &E {
                &self.referent
            }
        }

        impl<E: Expr> Expr for $name<E> {
            type Elem = E::Elem;

            fn dims(&self) -> Vec<usize> {
                self.window.dims.clone()
            }

            fn order(&self) -> Order {
                self.window.order
            }

            fn read_flat(&self, i: usize) -> Self::Elem {
                self.referent.read_flat(self.window.map(i))
            }

            fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
                if self.window.contiguous() {
                    return self.referent.load(self.window.offset() + start, out);
                }
                for (k, slot) in out.iter_mut().enumerate() {
                    *slot = self.referent.read_flat(self.window.map(start + k));
                }
                Ok(())
            }

            fn is_direct(&self) -> bool {
                self.referent.is_direct() && self.window.contiguous()
            }

            fn is_vectorizable(&self) -> bool {
                self.referent.is_vectorizable() && self.window.contiguous()
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

        impl<E: WritableExpr> Coherent for $name<E> {
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

        impl<E: WritableExpr> WritableExpr for $name<E> {
            fn write_flat(&self, i: usize, value: Self::Elem) -> Result<()> {
                self.referent.write_flat(self.window.map(i), value)
            }

            fn store(&self, start: usize, values: &[Self::Elem]) -> Result<()> {
                if self.window.contiguous() {
                    return self.referent.store(self.window.offset() + start, values);
                }
                for (k, &value) in values.iter().enumerate() {
                    self.referent.write_flat(self.window.map(start + k), value)?;
                }
                Ok(())
            }

            fn resize_to(&self, dims: &[usize]) -> Result<()> {
                Err(Error::shape_mismatch(&self.window.dims, dims))
            }
        }

        impl_expr_ops!([E] $name<E>);
    };
}

range_view!(
    /// The referent with its first index fixed (`sub(i)`), one dimension fewer
    SubView
);

range_view!(
    /// Rows `[first, last)` of the referent along its first dimension
    Slice
);

impl<E: Expr> SubView<E> {
    pub fn new(referent: E, index: usize) -> Result<Self> {
        let referent_dims = referent.dims();
        let Some(&outer) = referent_dims.first() else {
            return Err(Error::invalid_shape("cannot take a sub-view of a zero-dimensional expression"));
        };
        if index >= outer {
            return Err(Error::IndexOutOfBounds { index, size: outer });
        }

        let window = Window {
            dims: referent_dims[1..].to_vec(),
            order: referent.order(),
            first: index,
            fixed: true,
            referent_dims,
        };
        Ok(Self { referent, window })
    }
}

impl<E: Expr> Slice<E> {
    pub fn new(referent: E, first: usize, last: usize) -> Result<Self> {
        let referent_dims = referent.dims();
        let Some(&outer) = referent_dims.first() else {
            return Err(Error::invalid_shape("cannot slice a zero-dimensional expression"));
        };
        if first >= last || last > outer {
            return Err(Error::invalid_shape(format!(
                "slice [{first}, {last}) out of range for first dimension {outer}"
            )));
        }

        let mut dims = referent_dims.clone();
        dims[0] = last - first;
        let window = Window {
            dims,
            order: referent.order(),
            first,
            fixed: false,
            referent_dims,
        };
        Ok(Self { referent, window })
    }
}
