//! Reference implementations of the fused elementwise kernels
//!
//! Operands are read out of device memory element by element with
//! `bytemuck::pod_read_unaligned`, since byte buffers carry no alignment
//! guarantee. The output operand is written back in one copy.

use super::memory::MemoryManager;
use crate::backend::{DType, KernelCall, KernelOp, Operand};
use crate::error::{BackendError, Result};

/// Whether the CPU backend has a kernel for the pair
pub(crate) fn supports(op: KernelOp, dtype: DType) -> bool {
    if dtype.is_float() {
        return true;
    }
    matches!(
        op,
        KernelOp::AddInto | KernelOp::SubInto | KernelOp::MulInto | KernelOp::Scale
    )
}

/// Scalar arithmetic the kernels need from each precision
trait DeviceScalar: bytemuck::Pod {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
}

macro_rules! float_scalar {
    ($($t:ty),*) => {$(
        impl DeviceScalar for $t {
            fn from_f64(value: f64) -> Self { value as $t }
            fn to_f64(self) -> f64 { self as f64 }
            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> Self { self / rhs }
        }
    )*};
}

macro_rules! int_scalar {
    ($($t:ty),*) => {$(
        impl DeviceScalar for $t {
            fn from_f64(value: f64) -> Self { value as $t }
            fn to_f64(self) -> f64 { self as f64 }
            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> Self { self / rhs }
        }
    )*};
}

float_scalar!(f32, f64);
int_scalar!(i32, i64);

/// Execute one kernel call against the memory manager
pub(crate) fn launch(memory: &mut MemoryManager, call: &KernelCall) -> Result<()> {
    if !supports(call.op, call.dtype) {
        return Err(BackendError::UnsupportedKernel {
            op: call.op,
            dtype: call.dtype,
        });
    }

    if call.operands.len() != call.op.arity() {
        return Err(BackendError::invalid_arguments(format!(
            "{} expects {} operands, got {}",
            call.op,
            call.op.arity(),
            call.operands.len()
        )));
    }

    match call.dtype {
        DType::F32 => run::<f32>(memory, call),
        DType::F64 => run::<f64>(memory, call),
        DType::I32 => run::<i32>(memory, call),
        DType::I64 => run::<i64>(memory, call),
    }
}

fn run<T: DeviceScalar>(memory: &mut MemoryManager, call: &KernelCall) -> Result<()> {
    let n = call.n;
    if n == 0 {
        return Ok(());
    }

    let alpha = T::from_f64(call.alpha);
    let beta = T::from_f64(call.beta);

    // Output is always the last operand
    let (inputs, output) = call.operands.split_at(call.operands.len() - 1);
    let output = output[0];

    let inputs = inputs
        .iter()
        .map(|operand| gather::<T>(memory, *operand, n))
        .collect::<Result<Vec<_>>>()?;
    let mut out = gather::<T>(memory, output, n)?;

    match call.op {
        KernelOp::Axpy => {
            for (y, &x) in out.iter_mut().zip(&inputs[0]) {
                *y = alpha.mul(x).add(*y);
            }
        }
        KernelOp::Scale => {
            for y in out.iter_mut() {
                *y = alpha.mul(*y);
            }
        }
        KernelOp::AddInto => zip_apply(&mut out, &inputs[0], T::add),
        KernelOp::SubInto => zip_apply(&mut out, &inputs[0], T::sub),
        KernelOp::MulInto => zip_apply(&mut out, &inputs[0], T::mul),
        KernelOp::DivInto => zip_apply(&mut out, &inputs[0], T::div),
        KernelOp::Softplus => {
            for (y, &x) in out.iter_mut().zip(&inputs[0]) {
                *y = T::from_f64(call.alpha * x.to_f64().exp().ln_1p());
            }
        }
        KernelOp::Apxdbpy => {
            for ((z, &x), &y) in out.iter_mut().zip(&inputs[0]).zip(&inputs[1]) {
                *z = alpha.add(x).div(beta.add(y));
            }
        }
    }

    scatter(memory, output, &out)
}

fn zip_apply<T: DeviceScalar>(out: &mut [T], input: &[T], f: fn(T, T) -> T) {
    for (y, &x) in out.iter_mut().zip(input) {
        *y = f(*y, x);
    }
}

fn required_bytes<T>(operand: Operand, n: usize) -> usize {
    ((n - 1) * operand.ld + 1) * std::mem::size_of::<T>()
}

fn gather<T: DeviceScalar>(memory: &MemoryManager, operand: Operand, n: usize) -> Result<Vec<T>> {
    if operand.ld == 0 {
        return Err(BackendError::invalid_arguments("leading dimension must be non-zero"));
    }

    let bytes = memory.buffer(operand.handle)?;
    let needed = required_bytes::<T>(operand, n);
    if needed > bytes.len() {
        return Err(BackendError::BufferOutOfBounds {
            offset: 0,
            size: needed,
            buffer_size: bytes.len(),
        });
    }

    let width = std::mem::size_of::<T>();
    Ok((0..n)
        .map(|i| {
            let start = i * operand.ld * width;
            bytemuck::pod_read_unaligned(&bytes[start..start + width])
        })
        .collect())
}

fn scatter<T: DeviceScalar>(memory: &mut MemoryManager, operand: Operand, values: &[T]) -> Result<()> {
    let bytes = memory.buffer_mut(operand.handle)?;
    let width = std::mem::size_of::<T>();

    if operand.ld == 1 {
        let src: &[u8] = bytemuck::cast_slice(values);
        bytes[..src.len()].copy_from_slice(src);
        return Ok(());
    }

    for (i, value) in values.iter().enumerate() {
        let start = i * operand.ld * width;
        bytes[start..start + width].copy_from_slice(bytemuck::bytes_of(value));
    }
    Ok(())
}
