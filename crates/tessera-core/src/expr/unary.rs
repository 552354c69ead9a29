use super::{impl_expr_ops, Expr};
use crate::element::Element;
use crate::error::Result;
use crate::shape::Order;
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};
use std::marker::PhantomData;

/// Elementwise unary operation
pub trait UnaryOp: Send + Sync + 'static {
    const NAME: &'static str;

    fn apply<T: Element>(value: T) -> T;
}

macro_rules! unary_op {
    ($name:ident, $label:literal, |$v:ident| $body:expr) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl UnaryOp for $name {
            const NAME: &'static str = $label;

            #[inline]
            fn apply<T: Element>($v: T) -> T {
                $body
            }
        }
    };
}

unary_op!(NegOp, "neg", |v| -v);
unary_op!(AbsOp, "abs", |v| v.abs());
unary_op!(SqrtOp, "sqrt", |v| v.sqrt());
unary_op!(ExpOp, "exp", |v| v.exp());
unary_op!(LogOp, "log", |v| v.ln());
unary_op!(SoftplusOp, "softplus", |v| v.softplus());
unary_op!(ReluOp, "relu", |v| v.max_of(T::zero()));

/// Lazy elementwise `op(inner)`
pub struct Unary<E, F> {
    inner: E,
    _op: PhantomData<F>,
}

impl<E, F> Unary<E, F> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            _op: PhantomData,
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

pub fn abs<E: Expr>(e: E) -> Unary<E, AbsOp> {
    Unary::new(e)
}

pub fn sqrt<E: Expr>(e: E) -> Unary<E, SqrtOp> {
    Unary::new(e)
}

pub fn exp<E: Expr>(e: E) -> Unary<E, ExpOp> {
    Unary::new(e)
}

/// Natural logarithm
pub fn log<E: Expr>(e: E) -> Unary<E, LogOp> {
    Unary::new(e)
}

/// `ln(1 + exp(x))`
pub fn softplus<E: Expr>(e: E) -> Unary<E, SoftplusOp> {
    Unary::new(e)
}

pub fn relu<E: Expr>(e: E) -> Unary<E, ReluOp> {
    Unary::new(e)
}

impl<E: Expr, F: UnaryOp> Expr for Unary<E, F> {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        self.inner.dims()
    }

    fn order(&self) -> Order {
        self.inner.order()
    }

    #[inline]
    fn read_flat(&self, i: usize) -> Self::Elem {
        F::apply(self.inner.read_flat(i))
    }

    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        self.inner.load(start, out)?;
        for value in out.iter_mut() {
            *value = F::apply(*value);
        }
        Ok(())
    }

    fn is_vectorizable(&self) -> bool {
        self.inner.is_vectorizable()
    }

    fn is_thread_safe(&self) -> bool {
        self.inner.is_thread_safe()
    }

    fn is_flat_aligned(&self) -> bool {
        self.inner.is_flat_aligned()
    }

    fn is_broadcast(&self) -> bool {
        self.inner.is_broadcast()
    }

    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        self.inner.collect_storage(out);
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.inner.visit_temporaries(alloc)
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        self.inner.visit_evaluator(visitor, need_value)
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.inner.visit_back_propagate(visitor);
    }

    fn prepare_host(&self) -> Result<()> {
        self.inner.prepare_host()
    }
}

impl_expr_ops!([E, F] Unary<E, F>);
