//! Host/device coherency across the public tensor API
//!
//! Every test binds its tensors to a private CPU device so transfer counters
//! are not shared with other tests.

use tessera_core::kernels::device::{axpy, scale, Fallback};
use tessera_core::prelude::*;
use tessera_core::{assign_with, BackendType, CoherencyState, EvalConfig};

#[test]
fn test_host_write_then_device_read() -> tessera_core::Result<()> {
    tessera_tracing::init_test_tracing();
    let device = Device::cpu();
    let t = DynTensor::from_vec(vec![4], vec![1.0f32, 2.0, 3.0, 4.0])?.on_device(&device)?;
    assert_eq!(t.coherency_state(), CoherencyState::BothValid);

    t.set(2, 30.0)?;
    assert_eq!(t.coherency_state(), CoherencyState::HostValid);

    // Device kernel must see the host write
    scale(2.0, &t, Fallback::None)?;
    assert_eq!(t.coherency_state(), CoherencyState::DeviceValid);
    assert_eq!(t.to_vec()?, vec![2.0, 4.0, 60.0, 8.0]);
    assert_eq!(t.coherency_state(), CoherencyState::BothValid);

    let stats = device.stats();
    assert_eq!(stats.h2d_copies, 2);
    assert_eq!(stats.d2h_copies, 1);
    assert_eq!(stats.kernel_launches, 1);
    Ok(())
}

#[test]
fn test_redundant_ensures_are_free() -> tessera_core::Result<()> {
    let device = Device::cpu();
    let t = DynTensor::from_vec(vec![3], vec![1i64, 2, 3])?.on_device(&device)?;

    t.ensure_device_current()?;
    t.ensure_host_current()?;
    t.ensure_device_current()?;
    assert_eq!(device.stats().h2d_copies, 1);
    assert_eq!(device.stats().d2h_copies, 0);
    Ok(())
}

#[test]
fn test_ensure_host_current_copies_once() -> tessera_core::Result<()> {
    let device = Device::cpu();
    let t = DynTensor::from_vec(vec![3], vec![1i64, 2, 3])?.on_device(&device)?;
    scale(3, &t, Fallback::None)?;
    assert_eq!(t.coherency_state(), CoherencyState::DeviceValid);

    t.ensure_host_current()?;
    let first = t.to_vec()?;
    t.ensure_host_current()?;

    assert_eq!(t.coherency_state(), CoherencyState::BothValid);
    assert_eq!(device.stats().d2h_copies, 1);
    assert_eq!(first, vec![3, 6, 9]);
    assert_eq!(t.to_vec()?, first);
    Ok(())
}

#[test]
fn test_ensure_device_current_copies_once() -> tessera_core::Result<()> {
    let device = Device::cpu();
    let t = DynTensor::from_vec(vec![3], vec![1.0f64, 2.0, 3.0])?.on_device(&device)?;
    assert_eq!(device.stats().h2d_copies, 1);

    t.set(1, 20.0)?;
    assert_eq!(t.coherency_state(), CoherencyState::HostValid);

    t.ensure_device_current()?;
    t.ensure_device_current()?;
    assert_eq!(t.coherency_state(), CoherencyState::BothValid);
    assert_eq!(device.stats().h2d_copies, 2);

    // The device copy carries the host write
    t.invalidate_host()?;
    assert_eq!(t.to_vec()?, vec![1.0, 20.0, 3.0]);
    Ok(())
}

#[test]
fn test_integer_compound_assign_agrees_on_host_and_device() -> tessera_core::Result<()> {
    let config = EvalConfig::new().with_device_offload(true);
    let ones = DynTensor::from_vec(vec![2], vec![1i32, 1])?;

    let device = Device::cpu();
    let on_device = DynTensor::from_vec(vec![2], vec![i32::MAX, 5])?.on_device(&device)?;
    on_device.invalidate_host()?;
    assign_with(&config, &on_device, AssignOp::Add, &ones)?;
    assert_eq!(device.stats().kernel_launches, 1);

    let on_host = DynTensor::from_vec(vec![2], vec![i32::MAX, 5])?;
    assign_with(&config, &on_host, AssignOp::Add, &ones)?;

    assert_eq!(on_device.to_vec()?, vec![i32::MIN, 6]);
    assert_eq!(on_host.to_vec()?, on_device.to_vec()?);

    let on_host = DynTensor::from_vec(vec![1], vec![i32::MIN])?;
    on_host.sub_assign_expr(&scalar(1))?;
    on_host.mul_assign_expr(&scalar(2))?;
    assert_eq!(on_host.to_vec()?, vec![i32::MAX.wrapping_mul(2)]);
    Ok(())
}

#[test]
fn test_invalidate_host_without_device_storage_is_an_error() -> tessera_core::Result<()> {
    let t = DynTensor::from_vec(vec![2], vec![1.0f64, 2.0])?;
    assert!(matches!(t.invalidate_host(), Err(Error::Coherency(_))));
    assert_eq!(t.coherency_state(), CoherencyState::HostValid);
    Ok(())
}

#[test]
fn test_expression_reads_device_result() -> tessera_core::Result<()> {
    let device = Device::cpu();
    let x = DynTensor::from_vec(vec![3], vec![1.0f64, 2.0, 3.0])?.on_device(&device)?;
    let y = DynTensor::from_vec(vec![3], vec![0.0f64; 3])?.on_device(&device)?;
    axpy(1.0, &x, &y, Fallback::None)?;

    let out = DynTensor::empty();
    out.assign(&(&y * scalar(2.0)))?;
    assert_eq!(out.to_vec()?, vec![2.0, 4.0, 6.0]);
    assert_eq!(y.coherency_state(), CoherencyState::BothValid);
    Ok(())
}

#[test]
fn test_device_copy_then_evict() -> tessera_core::Result<()> {
    let device = Device::cpu();
    let src = DynTensor::from_vec(vec![2, 2], vec![5i32, 6, 7, 8])?.on_device(&device)?;
    let dst = DynTensor::from_vec(vec![2, 2], vec![0i32; 4])?.on_device(&device)?;

    dst.device_copy_from(&src)?;
    assert_eq!(dst.coherency_state(), CoherencyState::DeviceValid);
    assert_eq!(device.stats().d2d_copies, 1);

    dst.gpu_evict()?;
    assert_eq!(dst.coherency_state(), CoherencyState::HostValid);
    assert!(dst.device_handle().is_none());
    assert_eq!(dst.to_vec()?, vec![5, 6, 7, 8]);
    Ok(())
}

#[test]
fn test_cuda_backend_unavailable() {
    assert!(matches!(Device::new(BackendType::Cuda), Err(Error::DeviceUnavailable(_))));
    let device = Device::new_auto().expect("auto selection falls back to the CPU");
    assert_eq!(device.backend_type(), BackendType::Cpu);
}
