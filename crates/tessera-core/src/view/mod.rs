//! Views: non-owning reinterpretations of another expression
//!
//! A view never introduces storage. Alias analysis, coherency operations and
//! writes all pass through to the referent.

mod reshape;
mod sub;
mod transpose;

pub use reshape::Reshape;
pub use sub::{Slice, SubView};
pub use transpose::Transpose;

use crate::element::Element;
use crate::error::Result;
use crate::evaluator::{assign, AssignOp};
use crate::expr::{Expr, WritableExpr};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// `expr` under `dims`, same element count
///
/// Pass `&expr` to keep using the referent afterwards.
pub fn reshape<E: Expr>(expr: E, dims: Vec<usize>) -> Result<Reshape<E>> {
    Reshape::new(expr, dims)
}

/// `expr` with its first index fixed
pub fn sub<E: Expr>(expr: E, index: usize) -> Result<SubView<E>> {
    SubView::new(expr, index)
}

/// Rows `[first, last)` of `expr`
pub fn slice<E: Expr>(expr: E, first: usize, last: usize) -> Result<Slice<E>> {
    Slice::new(expr, first, last)
}

pub fn transpose<E: Expr>(expr: E) -> Result<Transpose<E>> {
    Transpose::new(expr)
}

/// Assignment through any writable expression
pub trait ViewAssign: WritableExpr + Sized {
    fn assign<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Assign, src)
    }

    fn add_assign_expr<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Add, src)
    }

    fn sub_assign_expr<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Sub, src)
    }

    fn mul_assign_expr<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Mul, src)
    }

    fn div_assign_expr<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Div, src)
    }

    fn rem_assign_expr<E: Expr<Elem = Self::Elem>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Rem, src)
    }

    /// Write one element through the full coherency discipline
    fn set_flat(&self, i: usize, value: Self::Elem) -> Result<()> {
        self.write_flat(i, value)
    }

    /// Write at a multi-index of this view's own dimensions
    fn set_at(&self, idx: &[usize], value: Self::Elem) -> Result<()> {
        let flat = crate::shape::flat_index(&self.dims(), self.order(), idx);
        self.write_flat(flat, value)
    }
}

impl<W: WritableExpr> ViewAssign for W {}

impl<T: Element, S: Shape> Tensor<T, S> {
    /// Same elements under `dims`
    pub fn reshape(&self, dims: Vec<usize>) -> Result<Reshape<&Self>> {
        Reshape::new(self, dims)
    }

    /// Element block at first index `index`
    pub fn sub(&self, index: usize) -> Result<SubView<&Self>> {
        SubView::new(self, index)
    }

    /// Rows `[first, last)`
    pub fn slice(&self, first: usize, last: usize) -> Result<Slice<&Self>> {
        Slice::new(self, first, last)
    }

    pub fn transpose(&self) -> Result<Transpose<&Self>> {
        Transpose::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherency::{CoherencyState, Coherent};
    use crate::device::Device;
    use crate::error::Error;
    use crate::expr::{scalar, ExprExt};
    use crate::shape::Order;
    use crate::tensor::DynTensor;

    fn iota(dims: Vec<usize>) -> DynTensor<f64> {
        let n = dims.iter().product();
        DynTensor::from_vec(dims, (1..=n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn test_reshape_requires_same_size() {
        let t = iota(vec![16]);
        assert!(t.reshape(vec![2, 2, 2, 2]).is_ok());
        assert!(matches!(t.reshape(vec![3, 5]), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_reshape_write_visible_in_referent() {
        let t = iota(vec![16]);
        let view = t.reshape(vec![2, 2, 2, 2]).unwrap();
        view.set_at(&[1, 1, 1, 1], -1.0).unwrap();
        assert_eq!(t.get(15).unwrap(), -1.0);
        assert_eq!(view.read_at(&[1, 1, 1, 1]), -1.0);
    }

    #[test]
    fn test_reshape_reads_device_written_data() {
        let device = Device::cpu();
        let t = iota(vec![4]).on_device(&device).unwrap();
        let view = t.reshape(vec![2, 2]).unwrap();

        let other = DynTensor::from_vec(vec![4], vec![9.0, 9.0, 9.0, 9.0])
            .unwrap()
            .on_device(&device)
            .unwrap();
        t.device_copy_from(&other).unwrap();
        assert_eq!(t.coherency_state(), CoherencyState::DeviceValid);

        assert_eq!(view.to_vec().unwrap(), vec![9.0; 4]);
    }

    #[test]
    fn test_sub_view() {
        let t = iota(vec![3, 2]);
        let row = t.sub(1).unwrap();
        assert_eq!(row.dims(), vec![2]);
        assert_eq!(row.to_vec().unwrap(), vec![3.0, 4.0]);

        row.assign(&scalar(0.0)).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0, 0.0, 0.0, 5.0, 6.0]);
        assert!(matches!(t.sub(3), Err(Error::IndexOutOfBounds { index: 3, size: 3 })));
    }

    #[test]
    fn test_sub_view_column_major() {
        let t = iota(vec![2, 3]).with_order(Order::ColumnMajor);
        let first = t.sub(0).unwrap();
        assert_eq!(first.to_vec().unwrap(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_slice() {
        let t = iota(vec![4, 2]);
        let middle = t.slice(1, 3).unwrap();
        assert_eq!(middle.dims(), vec![2, 2]);
        assert_eq!(middle.to_vec().unwrap(), vec![3.0, 4.0, 5.0, 6.0]);

        middle.add_assign_expr(&scalar(10.0)).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0, 13.0, 14.0, 15.0, 16.0, 7.0, 8.0]);
        assert!(matches!(t.slice(2, 2), Err(Error::InvalidShape(_))));
        assert!(matches!(t.slice(1, 5), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_transpose() {
        let t = iota(vec![2, 3]);
        let tt = t.transpose().unwrap();
        assert_eq!(tt.dims(), vec![3, 2]);
        assert_eq!(tt.to_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(matches!(iota(vec![8]).transpose(), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_views_alias_their_referent() {
        let t = iota(vec![4, 2]);
        let other = iota(vec![4, 2]);
        assert!(t.reshape(vec![8]).unwrap().aliases(&t));
        assert!(t.transpose().unwrap().aliases(&t));
        assert!(!t.slice(0, 2).unwrap().aliases(&other));
    }

    #[test]
    fn test_view_over_expression() {
        let a = iota(vec![4]);
        let b = iota(vec![4]);
        let view = reshape(&a + &b, vec![2, 2]).unwrap();
        assert_eq!(view.read_at(&[1, 0]), 6.0);
        assert_eq!(view.to_vec().unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
    }
}
