//! Kernel layer
//!
//! Kernel nodes read coherency-current host memory of their inputs and
//! compute into a temporary allocated by the statement's allocation pass.
//! [`device`] holds the fused elementwise kernels that run on a device
//! binding directly.

pub mod device;
mod materialize;
mod pool;

pub use materialize::Materialized;
pub use pool::{max_pool_3d, max_pool_3d_with, pool3d, pooled_dims, MaxPool3d};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, ExprExt};
    use crate::tensor::DynTensor;
    use crate::view::reshape;

    fn iota(dims: Vec<usize>) -> DynTensor<f64> {
        let n = dims.iter().product();
        DynTensor::from_vec(dims, (1..=n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn test_max_pool_node() {
        let input = iota(vec![2, 4, 4]);
        let pooled = max_pool_3d(&input, 2, 2, 2).unwrap();
        assert_eq!(pooled.dims(), vec![1, 2, 2]);
        assert_eq!(pooled.to_vec().unwrap(), vec![22.0, 24.0, 30.0, 32.0]);

        assert_eq!(max_pool_3d(&input, 2, 4, 2).unwrap().to_vec().unwrap(), vec![30.0, 32.0]);
        assert_eq!(max_pool_3d(&input, 1, 4, 4).unwrap().to_vec().unwrap(), vec![16.0, 32.0]);
    }

    #[test]
    fn test_max_pool_through_reshape() {
        let flat = iota(vec![16]);
        let view = reshape(&flat, vec![2, 2, 2, 2]).unwrap();

        let identity = max_pool_3d_with(&view, [2; 3], [2; 3], [1; 3]).unwrap();
        assert_eq!(identity.dims(), vec![2, 2, 2, 2]);
        assert_eq!(identity.to_vec().unwrap(), flat.to_vec().unwrap());

        let batched = max_pool_3d(&view, 1, 2, 2).unwrap();
        assert_eq!(batched.to_vec().unwrap(), vec![4.0, 8.0, 12.0, 16.0]);
    }

    #[test]
    fn test_pool_inside_expression() {
        let input = iota(vec![2, 4, 4]);
        let pooled = max_pool_3d(&input, 2, 2, 2).unwrap();
        let expr = pooled - crate::expr::scalar(2.0);
        assert_eq!(expr.to_vec().unwrap(), vec![20.0, 22.0, 28.0, 30.0]);
    }

    #[test]
    fn test_pool_reads_lazily_without_statement() {
        let input = iota(vec![2, 4, 4]);
        let pooled = max_pool_3d(&input, 2, 2, 2).unwrap();
        assert_eq!(pooled.read_flat(3), 32.0);
    }
}
