use crate::error::{Error, Result};
use crate::evaluator::{transfer, AssignOp};
use crate::expr::{impl_expr_ops, Expr};
use crate::shape::{size_of, Order};
use crate::tensor::{StorageId, StorageRef};
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TempSlot, TemporaryAllocator};

/// Forces `input` into scratch memory before the statement reads it
///
/// Built by [`ExprExt::materialized`](crate::expr::ExprExt::materialized).
/// Once evaluated the node is direct, so views over it re-link to the
/// scratch buffer and the statement no longer aliases the input's storage.
pub struct Materialized<E: Expr> {
    input: E,
    dims: Vec<usize>,
    slot: TempSlot<E::Elem>,
}

impl<E: Expr> Materialized<E> {
    pub fn new(input: E) -> Self {
        let dims = input.dims();
        Self {
            input,
            dims,
            slot: TempSlot::new(),
        }
    }

    pub fn input(&self) -> &E {
        &self.input
    }
}

impl<E: Expr> Expr for Materialized<E> {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Scratch is a flat copy, so it keeps the input's layout
    fn order(&self) -> Order {
        self.input.order()
    }

    fn read_flat(&self, i: usize) -> Self::Elem {
        match self.slot.storage() {
            Some(cell) => cell.read_flat(i),
            None => self.input.read_flat(i),
        }
    }

    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        match self.slot.storage() {
            Some(cell) => cell.load(start, out),
            None => self.input.load(start, out),
        }
    }

    fn is_direct(&self) -> bool {
        self.slot.is_ready()
    }

    fn is_vectorizable(&self) -> bool {
        self.slot.is_ready() || self.input.is_vectorizable()
    }

    fn is_thread_safe(&self) -> bool {
        self.slot.is_ready() || self.input.is_thread_safe()
    }

    fn is_broadcast(&self) -> bool {
        self.input.is_broadcast()
    }

    fn direct_storage(&self) -> Option<StorageRef<Self::Elem>> {
        self.slot.storage()
    }

    /// Reads come from scratch, so the input's storage never aliases
    fn collect_storage(&self, _out: &mut Vec<StorageId>) {}

    fn validate(&self) -> Result<()> {
        self.input.validate()
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.input.visit_temporaries(alloc)?;
        alloc.allocate(&self.slot, &self.dims)
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, _need_value: bool) -> Result<()> {
        if self.slot.is_ready() {
            return Ok(());
        }

        self.input.visit_evaluator(visitor, true)?;
        self.input.prepare_host()?;

        let Some(scratch) = self.slot.tensor() else {
            return Err(Error::Coherency(
                "materialized node evaluated before its temporary was allocated".to_string(),
            ));
        };
        transfer(visitor.config(), &scratch, AssignOp::Assign, &self.input, size_of(&self.dims))?;

        self.slot.mark_ready();
        visitor.note_materialized();
        Ok(())
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.input.visit_back_propagate(visitor);
    }

    fn prepare_host(&self) -> Result<()> {
        match self.slot.storage() {
            Some(cell) => cell.ensure_host_current(),
            None => self.input.prepare_host(),
        }
    }
}

impl_expr_ops!([E: Expr] Materialized<E>);
