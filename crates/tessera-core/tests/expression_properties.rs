//! Property tests for views, coherency and assignment
//!
//! Integer elements keep every comparison exact.

use proptest::prelude::*;
use tessera_core::kernels::device::{scale, Fallback};
use tessera_core::prelude::*;
use tessera_core::EvalConfig;

fn dims_and_data() -> impl Strategy<Value = (Vec<usize>, Vec<i64>)> {
    prop::collection::vec(1usize..5, 1..4).prop_flat_map(|dims| {
        let n: usize = dims.iter().product();
        (Just(dims), prop::collection::vec(-1_000i64..1_000, n))
    })
}

fn unravel(dims: &[usize], mut flat: usize) -> Vec<usize> {
    let mut idx = vec![0; dims.len()];
    for (slot, &d) in idx.iter_mut().zip(dims).rev() {
        *slot = flat % d;
        flat /= d;
    }
    idx
}

proptest! {
    #[test]
    fn prop_reshape_matches_flat_access((dims, data) in dims_and_data()) {
        let flat = DynTensor::from_vec(vec![data.len()], data.clone()).unwrap();
        let view = flat.reshape(dims.clone()).unwrap();

        for (i, &value) in data.iter().enumerate() {
            prop_assert_eq!(view.read_flat(i), value);
            prop_assert_eq!(view.read_at(&unravel(&dims, i)), value);
        }
    }

    #[test]
    fn prop_sub_rows_cover_tensor((dims, data) in dims_and_data()) {
        let t = DynTensor::from_vec(dims.clone(), data.clone()).unwrap();
        let row_len = data.len() / dims[0];

        let mut rows = Vec::new();
        for r in 0..dims[0] {
            rows.extend(t.sub(r).unwrap().to_vec().unwrap());
        }
        prop_assert_eq!(rows, data);
        prop_assert_eq!(t.sub(0).unwrap().size(), row_len);
    }

    #[test]
    fn prop_coherency_round_trip(data in prop::collection::vec(-1_000i64..1_000, 1..64), alpha in -5i64..5) {
        let device = Device::cpu();
        let t = DynTensor::from_vec(vec![data.len()], data.clone()).unwrap().on_device(&device).unwrap();

        // Host write, then a device read-modify-write, then a host read
        t.set(0, 7).unwrap();
        scale(alpha, &t, Fallback::None).unwrap();
        let mut want = data.clone();
        want[0] = 7;
        for v in &mut want {
            *v *= alpha;
        }
        prop_assert_eq!(t.to_vec().unwrap(), want);
    }

    #[test]
    fn prop_assign_matches_functional_evaluation(
        (dims, a) in dims_and_data(),
        seed in any::<i64>(),
        chunk in 1usize..9,
    ) {
        let b: Vec<i64> = a.iter().map(|x| x.wrapping_mul(seed % 7) + 3).collect();
        let ta = DynTensor::from_vec(dims.clone(), a.clone()).unwrap();
        let tb = DynTensor::from_vec(dims.clone(), b.clone()).unwrap();

        let config = EvalConfig::new().with_chunk_size(chunk).with_parallel_threshold(8);
        let out = DynTensor::empty();
        tessera_core::assign_with(&config, &out, AssignOp::Assign, &(&ta * &tb - &ta)).unwrap();

        let want: Vec<i64> = a.iter().zip(&b).map(|(x, y)| x * y - x).collect();
        prop_assert_eq!(out.dims(), dims);
        prop_assert_eq!(out.to_vec().unwrap(), want);
    }

    #[test]
    fn prop_compound_assign_matches_host((dims, a) in dims_and_data(), k in 1i64..50) {
        let t = DynTensor::from_vec(dims, a.clone()).unwrap();
        t.add_assign_expr(&scalar(k)).unwrap();
        t.rem_assign_expr(&scalar(k)).unwrap();

        let want: Vec<i64> = a.iter().map(|x| (x + k) % k).collect();
        prop_assert_eq!(t.to_vec().unwrap(), want);
    }
}
