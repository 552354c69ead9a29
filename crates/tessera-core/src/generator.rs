//! Generator nodes: values computed from the flat index alone
//!
//! Generators own no storage and take their shape from the other operand,
//! like [`Scalar`](crate::expr::Scalar).

use crate::element::Element;
use crate::error::Result;
use crate::expr::{impl_expr_ops, Expr};
use crate::tensor::StorageId;
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `start, start + 1, start + 2, ...`
#[derive(Debug, Clone, Copy)]
pub struct Sequence<T> {
    start: T,
}

pub fn sequence<T: Element>(start: T) -> Sequence<T> {
    Sequence { start }
}

impl<T: Element> Expr for Sequence<T> {
    type Elem = T;

    fn dims(&self) -> Vec<usize> {
        Vec::new()
    }

    #[inline]
    fn read_flat(&self, i: usize) -> T {
        self.start + T::from_usize(i)
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

impl_expr_ops!([T] Sequence<T>);

/// Dropout mask: 0 with probability `p`, 1 otherwise
///
/// Every read draws a fresh value, so the transfer runs sequentially and
/// element by element.
pub struct DropoutMask<T> {
    p: f64,
    rng: Mutex<StdRng>,
    _elem: std::marker::PhantomData<T>,
}

/// Mask seeded from the operating system
pub fn dropout_mask<T: Element>(p: f64) -> DropoutMask<T> {
    DropoutMask::with_rng(p, StdRng::from_entropy())
}

/// Reproducible mask
pub fn dropout_mask_seeded<T: Element>(p: f64, seed: u64) -> DropoutMask<T> {
    DropoutMask::with_rng(p, StdRng::seed_from_u64(seed))
}

impl<T: Element> DropoutMask<T> {
    fn with_rng(p: f64, rng: StdRng) -> Self {
        Self {
            p: if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) },
            rng: Mutex::new(rng),
            _elem: std::marker::PhantomData,
        }
    }

    /// Drop probability, clamped to `[0, 1]`
    pub fn probability(&self) -> f64 {
        self.p
    }
}

impl<T: Element> Expr for DropoutMask<T> {
    type Elem = T;

    fn dims(&self) -> Vec<usize> {
        Vec::new()
    }

    fn read_flat(&self, _i: usize) -> T {
        if self.rng.lock().gen_bool(self.p) {
            T::zero()
        } else {
            T::one()
        }
    }

    fn is_vectorizable(&self) -> bool {
        false
    }

    fn is_thread_safe(&self) -> bool {
        false
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

impl_expr_ops!([T] DropoutMask<T>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{assign, AssignOp};
    use crate::tensor::DynTensor;

    #[test]
    fn test_sequence_fills_destination() {
        let t = DynTensor::<i64>::new(vec![2, 3]).unwrap();
        assign(&t, AssignOp::Assign, &sequence(10i64)).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_sequence_in_expression() {
        let t = DynTensor::from_vec(vec![3], vec![1.0f64, 1.0, 1.0]).unwrap();
        assign(&t, AssignOp::Add, &(sequence(0.0) * crate::expr::scalar(2.0))).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_dropout_mask_is_binary() {
        let t = DynTensor::<f32>::new(vec![1000]).unwrap();
        assign(&t, AssignOp::Assign, &dropout_mask_seeded(0.3, 7)).unwrap();

        let values = t.to_vec().unwrap();
        assert!(values.iter().all(|&v| v == 0.0 || v == 1.0));
        let dropped = values.iter().filter(|&&v| v == 0.0).count();
        assert!((200..400).contains(&dropped), "dropped {dropped} of 1000");
    }

    #[test]
    fn test_dropout_mask_extremes() {
        let t = DynTensor::<i32>::new(vec![16]).unwrap();
        assign(&t, AssignOp::Assign, &dropout_mask_seeded(0.0, 1)).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![1; 16]);

        assign(&t, AssignOp::Assign, &dropout_mask_seeded(2.0, 1)).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![0; 16]);
        assert_eq!(dropout_mask::<f64>(-1.0).probability(), 0.0);
    }

    #[test]
    fn test_seeded_masks_repeat() {
        let a = DynTensor::<f64>::new(vec![64]).unwrap();
        let b = DynTensor::<f64>::new(vec![64]).unwrap();
        assign(&a, AssignOp::Assign, &dropout_mask_seeded(0.5, 42)).unwrap();
        assign(&b, AssignOp::Assign, &dropout_mask_seeded(0.5, 42)).unwrap();
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }
}
