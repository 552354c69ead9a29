//! Fused elementwise kernels on tensors
//!
//! Each function checks the device's capability table first. A supported
//! `(op, dtype)` pair runs as one backend launch over device-current
//! operands and leaves the output valid on the device only. An unsupported
//! pair runs on the host when [`Fallback::Host`] is passed and is an
//! [`Error::Unsupported`] otherwise.
//!
//! ```no_run
//! use tessera_core::kernels::device::{axpy, Fallback};
//! use tessera_core::DynTensor;
//!
//! # fn main() -> tessera_core::Result<()> {
//! let x = DynTensor::from_vec(vec![3], vec![1.0f32, 2.0, 3.0])?;
//! let y = DynTensor::from_vec(vec![3], vec![1.0f32, 1.0, 1.0])?;
//! axpy(2.0, &x, &y, Fallback::None)?;
//! assert_eq!(y.to_vec()?, vec![3.0, 5.0, 7.0]);
//! # Ok(())
//! # }
//! ```

use crate::coherency::Coherent;
use crate::device::Device;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensor::Tensor;
use tessera_backends::{KernelCall, KernelOp};

/// What to do when the device has no kernel for the element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Report [`Error::Unsupported`]
    #[default]
    None,
    /// Compute on the host copy instead
    Host,
}

/// `y = alpha * x + y`
#[tracing::instrument(skip_all, fields(n = y.size()))]
pub fn axpy<T: Element, S: Shape>(alpha: T, x: &Tensor<T, S>, y: &Tensor<T, S>, fallback: Fallback) -> Result<()> {
    let call = Launch::new(KernelOp::Axpy, alpha.to_f64(), 0.0);
    call.run(&[x], y, fallback, || {
        let xs = x.to_vec()?;
        y.with_host_slice_mut(|ys| {
            for (y, &x) in ys.iter_mut().zip(&xs) {
                *y = alpha.mul_wrapping(x).add_wrapping(*y);
            }
        })
    })
}

/// `y = alpha * y`
#[tracing::instrument(skip_all, fields(n = y.size()))]
pub fn scale<T: Element, S: Shape>(alpha: T, y: &Tensor<T, S>, fallback: Fallback) -> Result<()> {
    let call = Launch::new(KernelOp::Scale, alpha.to_f64(), 0.0);
    call.run(&[], y, fallback, || {
        y.with_host_slice_mut(|ys| {
            for y in ys.iter_mut() {
                *y = alpha.mul_wrapping(*y);
            }
        })
    })
}

/// `y = ln(1 + exp(x))`
#[tracing::instrument(skip_all, fields(n = y.size()))]
pub fn softplus<T: Element, S: Shape>(x: &Tensor<T, S>, y: &Tensor<T, S>, fallback: Fallback) -> Result<()> {
    let call = Launch::new(KernelOp::Softplus, 1.0, 0.0);
    call.run(&[x], y, fallback, || {
        let xs = x.to_vec()?;
        y.with_host_slice_mut(|ys| {
            for (y, &x) in ys.iter_mut().zip(&xs) {
                *y = x.softplus();
            }
        })
    })
}

/// `z = (alpha + x) / (beta + y)`
///
/// Integer division by zero on the host path panics like the primitive
/// operator does.
#[tracing::instrument(skip_all, fields(n = z.size()))]
pub fn apxdbpy<T: Element, S: Shape>(
    alpha: T,
    x: &Tensor<T, S>,
    beta: T,
    y: &Tensor<T, S>,
    z: &Tensor<T, S>,
    fallback: Fallback,
) -> Result<()> {
    let call = Launch::new(KernelOp::Apxdbpy, alpha.to_f64(), beta.to_f64());
    call.run(&[x, y], z, fallback, || {
        let xs = x.to_vec()?;
        let ys = y.to_vec()?;
        z.with_host_slice_mut(|zs| {
            for ((z, &x), &y) in zs.iter_mut().zip(&xs).zip(&ys) {
                *z = alpha.add_wrapping(x) / beta.add_wrapping(y);
            }
        })
    })
}

struct Launch {
    op: KernelOp,
    alpha: f64,
    beta: f64,
}

impl Launch {
    fn new(op: KernelOp, alpha: f64, beta: f64) -> Self {
        Self { op, alpha, beta }
    }

    fn run<T, S, F>(&self, inputs: &[&Tensor<T, S>], output: &Tensor<T, S>, fallback: Fallback, host: F) -> Result<()>
    where
        T: Element,
        S: Shape,
        F: FnOnce() -> Result<()>,
    {
        let n = output.size();
        for input in inputs {
            if input.size() != n {
                return Err(Error::shape_mismatch(&output.dims(), &input.dims()));
            }
        }

        match (shared_device(inputs, output), fallback) {
            (Ok(device), _) if device.supports(self.op, T::DTYPE) => self.launch(&device, inputs, output, n),
            (Ok(_) | Err(Error::DeviceMismatch), Fallback::Host) => {
                let dtype = T::DTYPE;
                tracing::debug!(op = %self.op, dtype = %dtype, elements = n, "kernel_host_fallback");
                host()
            }
            (Ok(_), Fallback::None) => Err(Error::Unsupported {
                op: self.op.name(),
                dtype: T::DTYPE,
            }),
            (Err(err), _) => Err(err),
        }
    }

    fn launch<T: Element, S: Shape>(
        &self,
        device: &Device,
        inputs: &[&Tensor<T, S>],
        output: &Tensor<T, S>,
        n: usize,
    ) -> Result<()> {
        let mut call = KernelCall::new(self.op, T::DTYPE, n).alpha(self.alpha).beta(self.beta);
        for input in inputs {
            input.bind_device(device)?;
            call = call.operand(input.device_buffer()?);
        }
        output.bind_device(device)?;
        call = call.operand(output.device_buffer()?);

        device.launch(&call)?;
        output.validate_device();
        output.invalidate_host()
    }
}

/// Device every bound operand agrees on, or the process default when none is bound
fn shared_device<T: Element, S: Shape>(inputs: &[&Tensor<T, S>], output: &Tensor<T, S>) -> Result<Device> {
    let mut chosen: Option<Device> = None;
    for bound in inputs.iter().chain(std::iter::once(&output)).filter_map(|t| t.device()) {
        match &chosen {
            Some(device) if !device.same_as(&bound) => return Err(Error::DeviceMismatch),
            Some(_) => {}
            None => chosen = Some(bound),
        }
    }
    Ok(chosen.unwrap_or_else(|| Device::global().clone()))
}
