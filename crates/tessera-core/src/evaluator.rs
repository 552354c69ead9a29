//! Assignment evaluator
//!
//! `dest (op)= src` for the six assignment operations. One statement:
//!
//! 1. shape checks (nothing touched yet)
//! 2. device offload, when both sides already live on the device
//! 3. visitor passes (allocate, evaluate, back-propagate)
//! 4. materialize `src` if it aliases `dest` unsafely
//! 5. resize `dest` if allowed and needed
//! 6. one coherency transition on `dest`, then the chunked transfer

use crate::config::EvalConfig;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::expr::{Expr, WritableExpr};
use crate::shape::{size_of, Shape};
use crate::tensor::Tensor;
use crate::visitor::StatementPasses;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;
use tessera_backends::KernelOp;
use tessera_tracing::perf_span;
use tessera_tracing::performance::record_evaluation;

/// Assignment operation of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AssignOp {
    pub const fn name(self) -> &'static str {
        match self {
            AssignOp::Assign => "assign",
            AssignOp::Add => "add_assign",
            AssignOp::Sub => "sub_assign",
            AssignOp::Mul => "mul_assign",
            AssignOp::Div => "div_assign",
            AssignOp::Rem => "rem_assign",
        }
    }

    /// Device kernel computing `y = y (op) x`, if there is one
    pub const fn kernel_op(self) -> Option<KernelOp> {
        match self {
            AssignOp::Add => Some(KernelOp::AddInto),
            AssignOp::Sub => Some(KernelOp::SubInto),
            AssignOp::Mul => Some(KernelOp::MulInto),
            AssignOp::Div => Some(KernelOp::DivInto),
            AssignOp::Assign | AssignOp::Rem => None,
        }
    }

    /// Integer `+ - *` wrap, matching the device kernels
    #[inline]
    pub fn apply<T: Element>(self, current: T, value: T) -> T {
        match self {
            AssignOp::Assign => value,
            AssignOp::Add => current.add_wrapping(value),
            AssignOp::Sub => current.sub_wrapping(value),
            AssignOp::Mul => current.mul_wrapping(value),
            AssignOp::Div => current / value,
            AssignOp::Rem => current % value,
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Evaluate `dest (op)= src` with the process-wide configuration
pub fn assign<D, E>(dest: &D, op: AssignOp, src: &E) -> Result<()>
where
    D: WritableExpr,
    E: Expr<Elem = D::Elem>,
{
    assign_with(EvalConfig::global(), dest, op, src)
}

/// Evaluate `dest (op)= src`
///
/// # Errors
///
/// - [`Error::ShapeMismatch`] when sizes differ and `dest` cannot be resized;
///   raised before any memory is touched
/// - [`Error::OutOfMemory`] when a temporary cannot be allocated
/// - [`Error::Backend`] on device failures
#[tracing::instrument(skip(config, dest, src), fields(dest_dims = ?dest.dims()))]
pub fn assign_with<D, E>(config: &EvalConfig, dest: &D, op: AssignOp, src: &E) -> Result<()>
where
    D: WritableExpr,
    E: Expr<Elem = D::Elem>,
{
    let _span = perf_span!("assign", op = op.name());
    let start = Instant::now();

    src.validate()?;
    let dest_dims = dest.dims();
    let src_dims = src.dims();

    if !src.is_broadcast() && src_dims.len() > 1 && src.order() != dest.order() {
        return Err(Error::invalid_shape(
            "source and destination use different storage orders",
        ));
    }

    let mut need_resize = false;
    let n = if src.is_broadcast() {
        if dest.size() != size_of(&dest_dims) {
            return Err(Error::invalid_shape("a broadcast source cannot size an unallocated destination"));
        }
        size_of(&dest_dims)
    } else {
        // An unallocated tensor holds no elements under zero-arity dims
        let unallocated = dest.size() != size_of(&dest_dims);
        if (unallocated || src_dims != dest_dims) && op == AssignOp::Assign && dest.can_resize_to(&src_dims) {
            need_resize = true;
        } else if size_of(&src_dims) != size_of(&dest_dims) {
            return Err(Error::shape_mismatch(&dest_dims, &src_dims));
        }
        size_of(&src_dims)
    };

    if config.device_offload && !need_resize && try_device_offload(dest, op, src, n)? {
        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(op = %op, elements = n, duration_us, "assign_offloaded");
        return Ok(());
    }

    let mut passes = StatementPasses::new(config);
    passes.run(src)?;

    let unsafe_alias = src.aliases(dest) && (need_resize || !(src.is_flat_aligned() && dest.is_flat_aligned()));
    let materialized = if unsafe_alias {
        Some(passes.materialize(src)?)
    } else {
        None
    };

    if need_resize {
        dest.resize_to(&src_dims)?;
    }

    dest.ensure_host_current()?;
    dest.invalidate_device();

    let parallel = match &materialized {
        Some(tmp) => transfer(config, dest, op, tmp, n)?,
        None => {
            src.prepare_host()?;
            transfer(config, dest, op, src, n)?
        }
    };

    let duration_us = start.elapsed().as_micros() as u64;
    tracing::debug!(
        op = %op,
        elements = n,
        parallel,
        materialized = materialized.is_some(),
        temporaries = passes.temporaries(),
        duration_us,
        "assign_complete"
    );
    record_evaluation(op.name(), n, parallel, duration_us);
    Ok(())
}

impl<T: Element, S: Shape> Tensor<T, S> {
    /// `self = src`; a resizable tensor takes the source's dimensions
    pub fn assign<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Assign, src)
    }

    /// `self += src`
    pub fn add_assign_expr<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Add, src)
    }

    /// `self -= src`
    pub fn sub_assign_expr<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Sub, src)
    }

    /// `self *= src`
    pub fn mul_assign_expr<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Mul, src)
    }

    /// `self /= src`
    pub fn div_assign_expr<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Div, src)
    }

    /// `self %= src`
    pub fn rem_assign_expr<E: Expr<Elem = T>>(&self, src: &E) -> Result<()> {
        assign(self, AssignOp::Rem, src)
    }
}

fn try_device_offload<D, E>(dest: &D, op: AssignOp, src: &E, n: usize) -> Result<bool>
where
    D: WritableExpr,
    E: Expr<Elem = D::Elem>,
{
    let Some(kernel) = op.kernel_op() else {
        return Ok(false);
    };
    if src.is_broadcast() {
        return Ok(false);
    }

    match (dest.direct_storage(), src.direct_storage()) {
        (Some(dst), Some(x)) => dst.launch_compound(&x, kernel, n),
        _ => Ok(false),
    }
}

/// Chunked elementwise transfer; returns whether it ran in parallel
///
/// The caller has already made `dest` host-current and invalidated its
/// device copy, and `src` host-current.
pub(crate) fn transfer<D, E>(config: &EvalConfig, dest: &D, op: AssignOp, src: &E, n: usize) -> Result<bool>
where
    D: WritableExpr,
    E: Expr<Elem = D::Elem>,
{
    if n == 0 {
        return Ok(false);
    }

    let chunk = if src.is_vectorizable() {
        config.chunk_size.max(1)
    } else {
        1
    };
    let chunks = n.div_ceil(chunk);
    let parallel = chunks > 1 && n >= config.parallel_threshold && src.is_thread_safe();

    let run_chunk = |c: usize| -> Result<()> {
        let start = c * chunk;
        let len = chunk.min(n - start);

        let mut values = vec![<D::Elem as Element>::zero(); len];
        src.load(start, &mut values)?;
        if op != AssignOp::Assign {
            let mut current = vec![<D::Elem as Element>::zero(); len];
            dest.load(start, &mut current)?;
            for (value, current) in values.iter_mut().zip(current) {
                *value = op.apply(current, *value);
            }
        }
        dest.store(start, &values)
    };

    if parallel {
        (0..chunks).into_par_iter().try_for_each(&run_chunk)?;
    } else {
        (0..chunks).try_for_each(&run_chunk)?;
    }
    Ok(parallel)
}
