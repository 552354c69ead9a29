//! Property tests for the CPU backend's fused kernels
//!
//! Each kernel launch is checked against the same arithmetic performed on
//! host slices.

use proptest::prelude::*;
use tessera_backends::{Backend, BufferHandle, CpuBackend, DType, KernelCall, KernelOp};

fn upload(backend: &mut CpuBackend, data: &[f64]) -> BufferHandle {
    let handle = backend.allocate_buffer(std::mem::size_of_val(data)).unwrap();
    backend.copy_to_buffer(handle, bytemuck::cast_slice(data)).unwrap();
    handle
}

fn download(backend: &mut CpuBackend, handle: BufferHandle, n: usize) -> Vec<f64> {
    let mut out = vec![0.0f64; n];
    backend
        .copy_from_buffer(handle, bytemuck::cast_slice_mut(&mut out))
        .unwrap();
    out
}

fn pair() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (1usize..64).prop_flat_map(|n| {
        (
            prop::collection::vec(-1.0e3f64..1.0e3, n),
            prop::collection::vec(-1.0e3f64..1.0e3, n),
        )
    })
}

proptest! {
    #[test]
    fn prop_axpy_matches_host((x, y) in pair(), alpha in -10.0f64..10.0) {
        let mut backend = CpuBackend::new();
        let n = x.len();
        let hx = upload(&mut backend, &x);
        let hy = upload(&mut backend, &y);

        let call = KernelCall::new(KernelOp::Axpy, DType::F64, n).alpha(alpha).operand(hx).operand(hy);
        backend.launch(&call).unwrap();

        let out = download(&mut backend, hy, n);
        for i in 0..n {
            prop_assert_eq!(out[i], alpha * x[i] + y[i]);
        }
        prop_assert_eq!(download(&mut backend, hx, n), x);
    }

    #[test]
    fn prop_sub_into_matches_host((x, y) in pair()) {
        let mut backend = CpuBackend::new();
        let n = x.len();
        let hx = upload(&mut backend, &x);
        let hy = upload(&mut backend, &y);

        backend.launch(&KernelCall::new(KernelOp::SubInto, DType::F64, n).operand(hx).operand(hy)).unwrap();

        let out = download(&mut backend, hy, n);
        for i in 0..n {
            prop_assert_eq!(out[i], y[i] - x[i]);
        }
    }

    #[test]
    fn prop_softplus_is_positive((x, _y) in pair()) {
        let mut backend = CpuBackend::new();
        let n = x.len();
        let hx = upload(&mut backend, &x);
        let hy = upload(&mut backend, &vec![0.0; n]);

        backend.launch(&KernelCall::new(KernelOp::Softplus, DType::F64, n).operand(hx).operand(hy)).unwrap();

        let out = download(&mut backend, hy, n);
        for i in 0..n {
            prop_assert!(out[i] >= 0.0);
            prop_assert!(out[i] >= x[i] - 1e-9);
        }
    }

    #[test]
    fn prop_free_releases_all_bytes(sizes in prop::collection::vec(1usize..4096, 1..16)) {
        let mut backend = CpuBackend::new();
        let handles: Vec<_> = sizes.iter().map(|&s| backend.allocate_buffer(s).unwrap()).collect();
        prop_assert_eq!(backend.allocated_bytes(), sizes.iter().sum::<usize>());

        for handle in handles {
            backend.free_buffer(handle).unwrap();
        }
        prop_assert_eq!(backend.allocated_bytes(), 0);
        prop_assert_eq!(backend.live_buffers(), 0);
    }
}

#[test]
fn test_out_of_bounds_launch_is_rejected() {
    let mut backend = CpuBackend::new();
    let x = upload(&mut backend, &[1.0, 2.0]);
    let y = upload(&mut backend, &[1.0, 2.0]);

    let call = KernelCall::new(KernelOp::AddInto, DType::F64, 3).operand(x).operand(y);
    assert!(backend.launch(&call).is_err());
}
