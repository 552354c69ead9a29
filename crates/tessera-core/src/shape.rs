//! Dimension vectors with static or runtime arity
//!
//! Every algorithm in the crate works on `&[usize]`; [`Shape`] only decides
//! whether a tensor's arity is fixed by its type (`[usize; N]`) or chosen at
//! runtime (`Vec<usize>`).

use crate::error::{Error, Result};
use std::fmt::Debug;

/// Dimension vector of a tensor
pub trait Shape: Clone + Debug + PartialEq + Send + Sync + 'static {
    fn as_slice(&self) -> &[usize];

    /// Build from a dimension slice, failing when the arity does not fit
    fn from_dims(dims: &[usize]) -> Result<Self>;

    /// Shape of an unallocated tensor (zero elements)
    fn empty() -> Self;

    /// Number of dimensions
    fn arity(&self) -> usize {
        self.as_slice().len()
    }

    /// Total number of elements
    fn size(&self) -> usize {
        size_of(self.as_slice())
    }
}

impl<const N: usize> Shape for [usize; N] {
    fn as_slice(&self) -> &[usize] {
        self
    }

    fn from_dims(dims: &[usize]) -> Result<Self> {
        <[usize; N]>::try_from(dims)
            .map_err(|_| Error::invalid_shape(format!("expected {N} dimensions, got {}", dims.len())))
    }

    fn empty() -> Self {
        [0; N]
    }
}

impl Shape for Vec<usize> {
    fn as_slice(&self) -> &[usize] {
        self
    }

    fn from_dims(dims: &[usize]) -> Result<Self> {
        Ok(dims.to_vec())
    }

    fn empty() -> Self {
        vec![0]
    }
}

/// Storage order of a tensor's elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Product of the dimensions; one for a zero-arity shape
pub fn size_of(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Flat position of a multi-index
///
/// Indices are not bounds-checked; an out-of-range index yields an
/// out-of-range flat position.
pub fn flat_index(dims: &[usize], order: Order, idx: &[usize]) -> usize {
    debug_assert_eq!(dims.len(), idx.len(), "index arity must match shape arity");
    match order {
        Order::RowMajor => dims.iter().zip(idx).fold(0, |acc, (&d, &i)| acc * d + i),
        Order::ColumnMajor => dims.iter().zip(idx).rev().fold(0, |acc, (&d, &i)| acc * d + i),
    }
}

/// Inverse of [`flat_index`]
pub fn unravel(dims: &[usize], order: Order, mut flat: usize) -> Vec<usize> {
    let mut idx = vec![0; dims.len()];
    match order {
        Order::RowMajor => {
            for (slot, &d) in idx.iter_mut().zip(dims).rev() {
                *slot = flat % d;
                flat /= d;
            }
        }
        Order::ColumnMajor => {
            for (slot, &d) in idx.iter_mut().zip(dims) {
                *slot = flat % d;
                flat /= d;
            }
        }
    }
    idx
}
