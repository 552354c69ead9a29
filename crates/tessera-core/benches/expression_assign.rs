//! Benchmarks for assignment statements
//!
//! Measures the chunked transfer (sequential vs rayon), the alias-driven
//! materialization path, pooling kernel nodes, and device offload of
//! compound assignments.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_core::kernels::max_pool_3d;
use tessera_core::prelude::*;
use tessera_core::{assign_with, EvalConfig};

fn ramp(n: usize) -> DynTensor<f32> {
    DynTensor::from_vec(vec![n], (0..n).map(|i| i as f32).collect()).unwrap()
}

fn benchmark_elementwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_elementwise");

    for size in [1_024usize, 16_384, 262_144].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("sequential", size), size, |bencher, &size| {
            let config = EvalConfig::new().with_parallel_threshold(usize::MAX);
            let a = ramp(size);
            let b = ramp(size);
            let out = DynTensor::<f32>::new(vec![size]).unwrap();

            bencher.iter(|| {
                assign_with(&config, &out, AssignOp::Assign, black_box(&(&a * &b + scalar(1.0f32)))).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("parallel", size), size, |bencher, &size| {
            let config = EvalConfig::new().with_parallel_threshold(0);
            let a = ramp(size);
            let b = ramp(size);
            let out = DynTensor::<f32>::new(vec![size]).unwrap();

            bencher.iter(|| {
                assign_with(&config, &out, AssignOp::Assign, black_box(&(&a * &b + scalar(1.0f32)))).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_aliasing(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_aliasing");

    for side in [64usize, 256].iter() {
        let elements = side * side;
        group.throughput(Throughput::Elements(elements as u64));

        // Flat-aligned self update: no temporary
        group.bench_with_input(BenchmarkId::new("in_place", side), side, |bencher, &side| {
            let a = DynTensor::from_vec(vec![side, side], vec![1.0f32; side * side]).unwrap();
            bencher.iter(|| {
                a.assign(black_box(&(&a * scalar(1.0f32)))).unwrap();
            });
        });

        // Transpose into itself: materialized first
        group.bench_with_input(BenchmarkId::new("transpose_self", side), side, |bencher, &side| {
            let a = DynTensor::from_vec(vec![side, side], vec![1.0f32; side * side]).unwrap();
            bencher.iter(|| {
                a.assign(black_box(&a.transpose().unwrap())).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_pooling(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_pool_3d");

    for side in [8usize, 16, 32].iter() {
        let elements = 4 * side * side * side;
        group.throughput(Throughput::Elements(elements as u64));

        group.bench_with_input(BenchmarkId::new("window_2", side), side, |bencher, &side| {
            let input = DynTensor::from_vec(
                vec![4, side, side, side],
                (0..elements).map(|i| (i % 97) as f32).collect(),
            )
            .unwrap();
            let out = DynTensor::empty();

            bencher.iter(|| {
                out.assign(black_box(&max_pool_3d(&input, 2, 2, 2).unwrap())).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_device_offload(c: &mut Criterion) {
    let mut group = c.benchmark_group("compound_assign_device");

    for size in [4_096usize, 65_536].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        for (label, offload) in [("offload", true), ("host", false)] {
            group.bench_with_input(BenchmarkId::new(label, size), size, |bencher, &size| {
                let device = Device::cpu();
                let config = EvalConfig::new().with_device_offload(offload);
                let x = ramp(size).on_device(&device).unwrap();
                let y = ramp(size).on_device(&device).unwrap();
                y.invalidate_host().unwrap();

                bencher.iter(|| {
                    assign_with(&config, &y, AssignOp::Add, black_box(&x)).unwrap();
                });
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_elementwise,
    benchmark_aliasing,
    benchmark_pooling,
    benchmark_device_offload
);
criterion_main!(benches);
