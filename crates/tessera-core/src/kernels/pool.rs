//! 3-D max pooling over the last three dimensions
//!
//! Leading dimensions are batch dimensions. For each pooled axis:
//! `out = (in + 2 * padding - window) / stride + 1`; padded positions never
//! win the maximum.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::expr::{impl_expr_ops, Expr};
use crate::shape::{flat_index, size_of, Order};
use crate::tensor::{StorageId, StorageRef};
use crate::visitor::{scratch_vec, BackPropagateVisitor, EvaluatorVisitor, TempSlot, TemporaryAllocator};
use tessera_tracing::perf_span;

/// Kernel node: max pooling of `input`, computed into scratch once per statement
///
/// Outside a statement every `read_flat` pools the whole input again, so
/// reading element by element is quadratic. Call `to_vec` or assign the node
/// into a tensor instead.
pub struct MaxPool3d<E: Expr> {
    input: E,
    window: [usize; 3],
    stride: [usize; 3],
    padding: [usize; 3],
    dims: Vec<usize>,
    slot: TempSlot<E::Elem>,
}

/// Pool with a `c1 x c2 x c3` window and equal stride, no padding
pub fn max_pool_3d<E: Expr>(input: E, c1: usize, c2: usize, c3: usize) -> Result<MaxPool3d<E>> {
    let window = [c1, c2, c3];
    MaxPool3d::new(input, window, window, [0; 3])
}

pub fn max_pool_3d_with<E: Expr>(
    input: E,
    window: [usize; 3],
    stride: [usize; 3],
    padding: [usize; 3],
) -> Result<MaxPool3d<E>> {
    MaxPool3d::new(input, window, stride, padding)
}

/// Output dimensions, or a shape error naming the offending axis
pub fn pooled_dims(input: &[usize], window: [usize; 3], stride: [usize; 3], padding: [usize; 3]) -> Result<Vec<usize>> {
    if input.len() < 3 {
        return Err(Error::invalid_shape(format!(
            "3-D pooling needs at least 3 dimensions, got {}",
            input.len()
        )));
    }

    let batch = input.len() - 3;
    let mut dims = input[..batch].to_vec();
    for axis in 0..3 {
        let extent = input[batch + axis] + 2 * padding[axis];
        if window[axis] == 0 || stride[axis] == 0 {
            return Err(Error::invalid_shape(format!("zero window or stride on pooled axis {axis}")));
        }
        if window[axis] > extent {
            return Err(Error::invalid_shape(format!(
                "window {} larger than padded extent {extent} on pooled axis {axis}",
                window[axis]
            )));
        }
        dims.push((extent - window[axis]) / stride[axis] + 1);
    }
    Ok(dims)
}

/// Pool `input` (laid out in `order` under `in_dims`) into row-major `out`
pub fn pool3d<T: Element>(
    input: &[T],
    in_dims: &[usize],
    order: Order,
    window: [usize; 3],
    stride: [usize; 3],
    padding: [usize; 3],
    out: &mut [T],
) {
    let batch = in_dims.len() - 3;
    let out_dims: Vec<usize> = in_dims[..batch]
        .iter()
        .copied()
        .chain((0..3).map(|a| (in_dims[batch + a] + 2 * padding[a] - window[a]) / stride[a] + 1))
        .collect();
    let out_inner = size_of(&out_dims[batch..]);

    let mut idx = vec![0; in_dims.len()];
    for (o, slot) in out.iter_mut().enumerate() {
        let lead = o / out_inner;
        let rest = o % out_inner;
        let pos = [
            rest / (out_dims[batch + 1] * out_dims[batch + 2]),
            rest / out_dims[batch + 2] % out_dims[batch + 1],
            rest % out_dims[batch + 2],
        ];

        let mut l = lead;
        for d in (0..batch).rev() {
            idx[d] = l % in_dims[d];
            l /= in_dims[d];
        }

        let mut best = T::lowest();
        for i in 0..window[0] {
            let Some(x) = (pos[0] * stride[0] + i).checked_sub(padding[0]) else { continue };
            if x >= in_dims[batch] {
                continue;
            }
            for j in 0..window[1] {
                let Some(y) = (pos[1] * stride[1] + j).checked_sub(padding[1]) else { continue };
                if y >= in_dims[batch + 1] {
                    continue;
                }
                for k in 0..window[2] {
                    let Some(z) = (pos[2] * stride[2] + k).checked_sub(padding[2]) else { continue };
                    if z >= in_dims[batch + 2] {
                        continue;
                    }
                    idx[batch] = x;
                    idx[batch + 1] = y;
                    idx[batch + 2] = z;
                    best = best.max_of(input[flat_index(in_dims, order, &idx)]);
                }
            }
        }
        *slot = best;
    }
}

impl<E: Expr> MaxPool3d<E> {
    pub fn new(input: E, window: [usize; 3], stride: [usize; 3], padding: [usize; 3]) -> Result<Self> {
        let dims = pooled_dims(&input.dims(), window, stride, padding)?;
        Ok(Self {
            input,
            window,
            stride,
            padding,
            dims,
            slot: TempSlot::new(),
        })
    }

    pub fn input(&self) -> &E {
        &self.input
    }

    fn compute(&self, out: &mut [E::Elem]) -> Result<()> {
        let in_dims = self.input.dims();
        let mut data = scratch_vec(size_of(&in_dims))?;
        self.input.load(0, &mut data)?;
        pool3d(&data, &in_dims, self.input.order(), self.window, self.stride, self.padding, out);
        Ok(())
    }
}

impl<E: Expr> Expr for MaxPool3d<E> {
    type Elem = E::Elem;

    fn dims(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Reads scratch once evaluated; otherwise pools the whole input for
    /// this one element
    ///
    /// # Panics
    ///
    /// When the input cannot be loaded or scratch cannot be allocated.
    fn read_flat(&self, i: usize) -> Self::Elem {
        if let Some(cell) = self.slot.storage() {
            return cell.read_flat(i);
        }

        let mut out = vec![<Self::Elem as Element>::lowest(); size_of(&self.dims)];
        match self.compute(&mut out) {
            Ok(()) => out[i],
            Err(err) => panic!("max_pool_3d evaluation failed: {err}"),
        }
    }

    fn load(&self, start: usize, out: &mut [Self::Elem]) -> Result<()> {
        if let Some(cell) = self.slot.storage() {
            return cell.load(start, out);
        }

        let mut all = scratch_vec(size_of(&self.dims))?;
        self.compute(&mut all)?;
        out.copy_from_slice(&all[start..start + out.len()]);
        Ok(())
    }

    fn is_direct(&self) -> bool {
        self.slot.is_ready()
    }

    fn is_thread_safe(&self) -> bool {
        self.input.is_thread_safe()
    }

    fn direct_storage(&self) -> Option<StorageRef<Self::Elem>> {
        self.slot.storage()
    }

    /// The transfer reads scratch, never the input, so the input's storage
    /// is not reported
    fn collect_storage(&self, _out: &mut Vec<StorageId>) {}

    fn validate(&self) -> Result<()> {
        self.input.validate()
    }

    fn visit_temporaries(&self, alloc: &mut TemporaryAllocator<Self::Elem>) -> Result<()> {
        self.input.visit_temporaries(alloc)?;
        alloc.allocate(&self.slot, &self.dims)
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, _need_value: bool) -> Result<()> {
        if self.slot.is_ready() {
            return Ok(());
        }

        self.input.visit_evaluator(visitor, true)?;
        self.input.prepare_host()?;

        let Some(scratch) = self.slot.tensor() else {
            return Err(Error::Coherency(
                "max_pool_3d evaluated before its temporary was allocated".to_string(),
            ));
        };

        let _span = perf_span!("max_pool_3d", elements = size_of(&self.dims));
        let in_dims = self.input.dims();
        let mut data = scratch_vec(size_of(&in_dims))?;
        self.input.load(0, &mut data)?;
        scratch.with_host_slice_mut(|out| {
            pool3d(&data, &in_dims, self.input.order(), self.window, self.stride, self.padding, out)
        })?;

        self.slot.mark_ready();
        visitor.note_materialized();
        Ok(())
    }

    fn visit_back_propagate(&self, visitor: &mut BackPropagateVisitor) {
        self.input.visit_back_propagate(visitor);
    }

    fn prepare_host(&self) -> Result<()> {
        match self.slot.storage() {
            Some(cell) => cell.ensure_host_current(),
            None => self.input.prepare_host(),
        }
    }
}

impl_expr_ops!([E: Expr] MaxPool3d<E>);
