//! Visitor passes run once per assignment statement
//!
//! ```text
//! assign(dest, op, src)
//!   ├─ 1. src.visit_temporaries(&mut TemporaryAllocator)     post-order, allocates scratch
//!   ├─ 2. src.visit_evaluator(&mut EvaluatorVisitor, false)  computes kernel nodes
//!   ├─ 3. src.visit_back_propagate(&mut BackPropagateVisitor) re-links cached storage
//!   └─ 4. elementwise transfer
//! ```
//!
//! [`StatementPasses`] enforces the order and owns the scratch tensors until
//! the statement ends, including when a pass fails.

use crate::config::EvalConfig;
use crate::element::Element;
use crate::error::Result;
use crate::evaluator::{transfer, AssignOp};
use crate::expr::Expr;
use crate::shape::size_of;
use crate::tensor::{DynTensor, StorageRef};
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_tracing::perf_event;

struct SlotState<T: Element> {
    tensor: Option<DynTensor<T>>,
    ready: bool,
}

/// Scratch location a node materializes its value into
///
/// Cloning yields a second handle to the same slot.
pub struct TempSlot<T: Element>(Arc<Mutex<SlotState<T>>>);

impl<T: Element> TempSlot<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SlotState {
            tensor: None,
            ready: false,
        })))
    }

    pub fn is_allocated(&self) -> bool {
        self.0.lock().tensor.is_some()
    }

    /// Allocated and holding the node's value for the current statement
    pub fn is_ready(&self) -> bool {
        let state = self.0.lock();
        state.ready && state.tensor.is_some()
    }

    pub(crate) fn mark_ready(&self) {
        self.0.lock().ready = true;
    }

    /// Storage of the scratch tensor once it holds a value
    pub fn storage(&self) -> Option<StorageRef<T>> {
        let state = self.0.lock();
        match (&state.tensor, state.ready) {
            (Some(tensor), true) => tensor.direct_storage(),
            _ => None,
        }
    }

    /// Second handle to the scratch tensor, if allocated
    pub(crate) fn tensor(&self) -> Option<DynTensor<T>> {
        self.0.lock().tensor.as_ref().map(DynTensor::share)
    }

    fn install(&self, tensor: DynTensor<T>) {
        let mut state = self.0.lock();
        state.tensor = Some(tensor);
        state.ready = false;
    }

    fn release(&self) {
        let mut state = self.0.lock();
        state.tensor = None;
        state.ready = false;
    }
}

impl<T: Element> Clone for TempSlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Element> Default for TempSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporary-allocation pass state: owns every scratch tensor of the statement
pub struct TemporaryAllocator<T: Element> {
    slots: Vec<TempSlot<T>>,
    bytes: usize,
}

impl<T: Element> TemporaryAllocator<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            bytes: 0,
        }
    }

    /// Give `slot` a zeroed scratch tensor of shape `dims`
    ///
    /// A slot reached twice in one statement (a node referenced from two
    /// places) is allocated once.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory); the statement is aborted.
    pub fn allocate(&mut self, slot: &TempSlot<T>, dims: &[usize]) -> Result<()> {
        if slot.is_allocated() {
            return Ok(());
        }

        let tensor = DynTensor::try_zeroed(dims)?;
        let bytes = size_of(dims) * std::mem::size_of::<T>();
        self.bytes += bytes;
        perf_event!("temporary_allocated", elements = size_of(dims), bytes = bytes);

        slot.install(tensor);
        self.slots.push(slot.clone());
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl<T: Element> Default for TemporaryAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> Drop for TemporaryAllocator<T> {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.release();
        }
        if !self.slots.is_empty() {
            tracing::trace!(count = self.slots.len(), bytes = self.bytes, "temporaries_released");
        }
    }
}

/// Evaluator pass state
pub struct EvaluatorVisitor<'c> {
    config: &'c EvalConfig,
    materialized: usize,
    synced: usize,
}

impl<'c> EvaluatorVisitor<'c> {
    pub fn new(config: &'c EvalConfig) -> Self {
        Self {
            config,
            materialized: 0,
            synced: 0,
        }
    }

    pub fn config(&self) -> &'c EvalConfig {
        self.config
    }

    pub fn note_materialized(&mut self) {
        self.materialized += 1;
    }

    /// A storage leaf had its host copy refreshed
    pub fn note_synced(&mut self) {
        self.synced += 1;
    }

    pub fn materialized(&self) -> usize {
        self.materialized
    }

    pub fn synced(&self) -> usize {
        self.synced
    }
}

/// Back-propagation pass state
#[derive(Debug, Default)]
pub struct BackPropagateVisitor {
    relinked: usize,
}

impl BackPropagateVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_relinked(&mut self) {
        self.relinked += 1;
    }

    pub fn relinked(&self) -> usize {
        self.relinked
    }
}

/// The three passes of one statement, in order
pub struct StatementPasses<'c, T: Element> {
    config: &'c EvalConfig,
    allocator: TemporaryAllocator<T>,
    scratch: Vec<DynTensor<T>>,
}

impl<'c, T: Element> StatementPasses<'c, T> {
    pub fn new(config: &'c EvalConfig) -> Self {
        Self {
            config,
            allocator: TemporaryAllocator::new(),
            scratch: Vec::new(),
        }
    }

    /// Allocate, then evaluate, then back-propagate
    pub fn run<E: Expr<Elem = T>>(&mut self, src: &E) -> Result<()> {
        src.visit_temporaries(&mut self.allocator)?;

        let mut evaluator = EvaluatorVisitor::new(self.config);
        src.visit_evaluator(&mut evaluator, false)?;

        let mut back = BackPropagateVisitor::new();
        src.visit_back_propagate(&mut back);

        tracing::trace!(
            temporaries = self.allocator.count(),
            temporary_bytes = self.allocator.bytes(),
            materialized = evaluator.materialized(),
            synced = evaluator.synced(),
            relinked = back.relinked(),
            "statement_passes_complete"
        );
        Ok(())
    }

    /// Copy `src` into a fresh scratch tensor held until the statement ends
    pub fn materialize<E: Expr<Elem = T>>(&mut self, src: &E) -> Result<DynTensor<T>> {
        let dims = src.dims();
        let tmp = DynTensor::try_zeroed(&dims)?;
        src.prepare_host()?;
        transfer(self.config, &tmp, AssignOp::Assign, src, size_of(&dims))?;

        perf_event!("source_materialized", elements = size_of(&dims));
        self.scratch.push(tmp.share());
        Ok(tmp)
    }

    pub fn temporaries(&self) -> usize {
        self.allocator.count() + self.scratch.len()
    }
}

/// Zero-filled scratch vector for kernel inputs
pub(crate) fn scratch_vec<T: Element>(n: usize) -> Result<Vec<T>> {
    crate::tensor::zeroed_vec(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_released_with_allocator() {
        let slot = TempSlot::<f32>::new();
        {
            let mut alloc = TemporaryAllocator::new();
            alloc.allocate(&slot, &[2, 3]).unwrap();
            assert!(slot.is_allocated());
            assert!(!slot.is_ready());
            assert_eq!(alloc.bytes(), 24);

            slot.mark_ready();
            assert!(slot.storage().is_some());
        }
        assert!(!slot.is_allocated());
        assert!(slot.storage().is_none());
    }

    #[test]
    fn test_shared_slot_allocated_once() {
        let slot = TempSlot::<f64>::new();
        let alias = slot.clone();
        let mut alloc = TemporaryAllocator::new();

        alloc.allocate(&slot, &[4]).unwrap();
        alloc.allocate(&alias, &[4]).unwrap();
        assert_eq!(alloc.count(), 1);
    }

    #[test]
    fn test_materialize_copies_source() {
        let config = EvalConfig::new();
        let a = DynTensor::from_vec(vec![3], vec![1i32, 2, 3]).unwrap();

        let mut passes = StatementPasses::new(&config);
        passes.run(&a).unwrap();
        let copy = passes.materialize(&a).unwrap();
        assert_ne!(copy.storage_id(), a.storage_id());

        a.set(0, 10).unwrap();
        assert_eq!(copy.to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(passes.temporaries(), 1);
    }
}
