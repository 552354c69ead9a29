//! Value containers
//!
//! A [`Tensor`] owns one contiguous host buffer plus, once it has been used
//! on a device, one device buffer. The coherency flags decide which of the
//! two holds the latest value; every access path below goes through them.
//!
//! # Memory Layout
//!
//! ```text
//! Tensor ──Arc──▶ StorageCell { id, RwLock<Storage> }
//!                                  ├─ data: Vec<T>            (host copy)
//!                                  ├─ device_buffer: Option<DeviceBuffer>
//!                                  └─ coherency: { host_valid, device_valid }
//! ```
//!
//! `Clone` is a deep copy. [`Tensor::share`] hands out a second handle to the
//! same storage, which is how views and aliasing tests see one buffer
//! through two names.

use crate::coherency::{Coherency, CoherencyState, Coherent};
use crate::device::{Device, DeviceBuffer};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::expr::{Expr, WritableExpr};
use crate::shape::{flat_index, size_of, Order, Shape};
use crate::visitor::{BackPropagateVisitor, EvaluatorVisitor, TemporaryAllocator};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_backends::{BufferHandle, KernelCall, KernelOp};

/// Identity of one storage buffer, used for alias analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u64);

impl StorageId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        StorageId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage{}", self.0)
    }
}

/// Zero-filled host buffer, reporting allocation failure instead of aborting
pub(crate) fn zeroed_vec<T: Element>(n: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(n).map_err(|_| Error::OutOfMemory {
        requested: n.saturating_mul(std::mem::size_of::<T>()),
    })?;
    data.resize(n, T::zero());
    Ok(data)
}

struct Storage<T: Element> {
    data: Vec<T>,
    dims: Vec<usize>,
    order: Order,
    coherency: Coherency,
    device_buffer: Option<DeviceBuffer>,
    device: Option<Device>,
    resizable: bool,
}

impl<T: Element> Storage<T> {
    fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }

    fn device(&mut self) -> Device {
        self.device.get_or_insert_with(|| Device::global().clone()).clone()
    }

    fn ensure_host_current(&mut self) -> Result<()> {
        if !self.coherency.needs_host_copy() {
            return Ok(());
        }

        let buffer = self.device_buffer.as_ref().ok_or_else(|| {
            Error::Coherency("device copy is marked valid but no device storage exists".to_string())
        })?;
        buffer.download(bytemuck::cast_slice_mut(&mut self.data))?;
        self.coherency.validate_host();
        Ok(())
    }

    /// Device buffer of the right size, allocated on first use
    fn device_allocation(&mut self) -> Result<BufferHandle> {
        let bytes = self.byte_len();
        if let Some(buffer) = &self.device_buffer {
            if buffer.bytes() == bytes {
                return Ok(buffer.handle());
            }
        }

        self.device_buffer = None;
        self.coherency.forget_device();
        let buffer = self.device().allocate(bytes)?;
        let handle = buffer.handle();
        self.device_buffer = Some(buffer);
        Ok(handle)
    }

    fn ensure_device_current(&mut self) -> Result<()> {
        if self.coherency.needs_device_copy() {
            self.upload()?;
        }
        Ok(())
    }

    /// Handle of a device copy that is at least as new as the host copy
    fn device_storage(&mut self) -> Result<BufferHandle> {
        let handle = self.device_allocation()?;
        if self.coherency.needs_device_copy() {
            self.upload()?;
        }
        Ok(handle)
    }

    fn upload(&mut self) -> Result<()> {
        self.device_allocation()?;
        if let Some(buffer) = &self.device_buffer {
            buffer.upload(bytemuck::cast_slice(&self.data))?;
        }
        self.coherency.validate_device();
        Ok(())
    }

    fn prepare_write(&mut self) -> Result<()> {
        self.ensure_host_current()?;
        self.coherency.invalidate_device();
        Ok(())
    }
}

/// One storage buffer shared by a tensor and the views over it
///
/// The fields are private to the crate: expressions reach storage only
/// through the coherency-checked methods here.
pub struct StorageCell<T: Element> {
    id: StorageId,
    state: RwLock<Storage<T>>,
}

/// Shared reference to a [`StorageCell`]
pub type StorageRef<T> = Arc<StorageCell<T>>;

impl<T: Element> StorageCell<T> {
    fn new(storage: Storage<T>) -> StorageRef<T> {
        Arc::new(Self {
            id: StorageId::next(),
            state: RwLock::new(storage),
        })
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub(crate) fn dims(&self) -> Vec<usize> {
        self.state.read().dims.clone()
    }

    pub(crate) fn order(&self) -> Order {
        self.state.read().order
    }

    pub(crate) fn state(&self) -> CoherencyState {
        self.state.read().coherency.state()
    }

    /// Read guard over a host copy that is current
    fn read_current(&self) -> Result<RwLockReadGuard<'_, Storage<T>>> {
        let guard = self.state.read();
        if !guard.coherency.needs_host_copy() {
            return Ok(guard);
        }
        drop(guard);

        let mut guard = self.state.write();
        guard.ensure_host_current()?;
        Ok(RwLockWriteGuard::downgrade(guard))
    }

    /// # Panics
    ///
    /// When the host copy is stale and the device copy cannot be read back.
    /// Statements never hit this: they make every leaf host-current first.
    pub(crate) fn read_flat(&self, i: usize) -> T {
        match self.read_current() {
            Ok(storage) => storage.data[i],
            Err(err) => panic!("failed to synchronize host copy of {}: {err}", self.id),
        }
    }

    pub(crate) fn load(&self, start: usize, out: &mut [T]) -> Result<()> {
        let storage = self.read_current()?;
        out.copy_from_slice(&storage.data[start..start + out.len()]);
        Ok(())
    }

    /// Bulk host write; the coherency transition is a no-op once the
    /// statement has performed it
    pub(crate) fn store(&self, start: usize, values: &[T]) -> Result<()> {
        let mut storage = self.state.write();
        if !storage.coherency.is_host_valid() || storage.coherency.is_device_valid() {
            storage.prepare_write()?;
        }
        storage.data[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    pub(crate) fn write_flat(&self, i: usize, value: T) -> Result<()> {
        let mut storage = self.state.write();
        storage.prepare_write()?;
        storage.data[i] = value;
        Ok(())
    }

    pub(crate) fn invalidate_host(&self) -> Result<()> {
        let mut storage = self.state.write();
        let has_device_storage = storage.device_buffer.is_some();
        storage.coherency.invalidate_host(has_device_storage)
    }

    pub(crate) fn invalidate_device(&self) {
        self.state.write().coherency.invalidate_device();
    }

    pub(crate) fn validate_host(&self) {
        self.state.write().coherency.validate_host();
    }

    pub(crate) fn validate_device(&self) {
        let mut storage = self.state.write();
        if storage.device_buffer.is_some() {
            storage.coherency.validate_device();
        }
    }

    pub(crate) fn is_host_current(&self) -> bool {
        self.state.read().coherency.is_host_valid()
    }

    pub(crate) fn is_device_current(&self) -> bool {
        self.state.read().coherency.is_device_valid()
    }

    pub(crate) fn ensure_host_current(&self) -> Result<()> {
        if !self.state.read().coherency.needs_host_copy() {
            return Ok(());
        }
        self.state.write().ensure_host_current()
    }

    pub(crate) fn ensure_device_current(&self) -> Result<()> {
        self.state.write().ensure_device_current()
    }

    fn resize(&self, dims: &[usize]) -> Result<()> {
        let data = zeroed_vec(size_of(dims))?;
        let mut storage = self.state.write();
        storage.data = data;
        storage.dims = dims.to_vec();
        storage.device_buffer = None;
        storage.coherency = Coherency::host_only();
        Ok(())
    }

    /// Run `dest (op)= src` as one device kernel when both copies already
    /// live on the same device
    ///
    /// Returns `false` without touching either buffer when the statement
    /// has to run on the host instead.
    pub(crate) fn launch_compound(&self, src: &StorageCell<T>, kernel: KernelOp, n: usize) -> Result<bool> {
        if self.id == src.id {
            return Ok(false);
        }

        let mut dst = self.state.write();
        if dst.coherency.state() != CoherencyState::DeviceValid || dst.data.len() != n {
            return Ok(false);
        }
        let (device, y) = match (&dst.device, &dst.device_buffer) {
            (Some(device), Some(buffer)) => (device.clone(), buffer.handle()),
            _ => return Ok(false),
        };
        if !device.supports(kernel, T::DTYPE) {
            return Ok(false);
        }

        let mut source = src.state.write();
        match source.device.clone() {
            Some(bound) if !bound.same_as(&device) => return Ok(false),
            Some(_) => {}
            None => source.device = Some(device.clone()),
        }
        let x = source.device_storage()?;
        drop(source);

        device.launch(&KernelCall::new(kernel, T::DTYPE, n).operand(x).operand(y))?;
        dst.coherency.validate_device();
        dst.coherency.invalidate_host(true)?;
        Ok(true)
    }

    fn copy_device_from(&self, src: &StorageCell<T>) -> Result<()> {
        if self.id == src.id {
            return Ok(());
        }

        let mut source = src.state.write();
        let x = source.device_storage()?;
        let device = source.device();
        let source = RwLockWriteGuard::downgrade(source);

        let mut dst = self.state.write();
        if dst.data.len() != source.data.len() {
            return Err(Error::shape_mismatch(&dst.dims, &source.dims));
        }
        match dst.device.clone() {
            Some(bound) if !bound.same_as(&device) => return Err(Error::DeviceMismatch),
            Some(_) => {}
            None => dst.device = Some(device.clone()),
        }

        let y = dst.device_allocation()?;
        device.copy(x, y, source.byte_len())?;
        dst.coherency.validate_device();
        dst.coherency.invalidate_host(true)
    }
}

/// Dense tensor with shape type `S`
///
/// `S = [usize; N]` fixes the arity in the type; the default `Vec<usize>`
/// chooses it at runtime. Both run through the same code.
pub struct Tensor<T: Element, S: Shape = Vec<usize>> {
    cell: StorageRef<T>,
    _shape: PhantomData<S>,
}

/// Tensor with runtime arity
pub type DynTensor<T> = Tensor<T, Vec<usize>>;

/// Tensor with arity `D` fixed in the type
pub type Matrix<T, const D: usize> = Tensor<T, [usize; D]>;

impl<T: Element, S: Shape> Tensor<T, S> {
    fn from_storage(storage: Storage<T>) -> Self {
        Self {
            cell: StorageCell::new(storage),
            _shape: PhantomData,
        }
    }

    fn build(dims: S, data: Vec<T>, resizable: bool) -> Result<Self> {
        let expected = dims.size();
        if data.len() != expected {
            return Err(Error::ShapeMismatch {
                expected: dims.as_slice().to_vec(),
                actual: vec![data.len()],
            });
        }

        Ok(Self::from_storage(Storage {
            data,
            dims: dims.as_slice().to_vec(),
            order: Order::RowMajor,
            coherency: Coherency::host_only(),
            device_buffer: None,
            device: None,
            resizable,
        }))
    }

    /// Zero-filled tensor that assignment may resize
    pub fn new(dims: S) -> Result<Self> {
        let data = zeroed_vec(dims.size())?;
        Self::build(dims, data, true)
    }

    /// Tensor over existing data, row-major
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] when `data.len()` is not the product of `dims`.
    pub fn from_vec(dims: S, data: Vec<T>) -> Result<Self> {
        Self::build(dims, data, true)
    }

    /// Zero-filled tensor whose shape never changes
    pub fn fixed(dims: S) -> Result<Self> {
        let data = zeroed_vec(dims.size())?;
        Self::build(dims, data, false)
    }

    pub fn fixed_from_vec(dims: S, data: Vec<T>) -> Result<Self> {
        Self::build(dims, data, false)
    }

    pub fn filled(dims: S, value: T) -> Result<Self> {
        let tensor = Self::new(dims)?;
        tensor.fill(value)?;
        Ok(tensor)
    }

    /// Unallocated tensor; the first assignment sizes it
    pub fn empty() -> Self {
        Self::from_storage(Storage {
            data: Vec::new(),
            dims: S::empty().as_slice().to_vec(),
            order: Order::RowMajor,
            coherency: Coherency::uninitialized(),
            device_buffer: None,
            device: None,
            resizable: true,
        })
    }

    /// Reinterpret the buffer in the given storage order
    pub fn with_order(self, order: Order) -> Self {
        self.cell.state.write().order = order;
        self
    }

    /// Bind to `device` and make the device copy current
    pub fn on_device(self, device: &Device) -> Result<Self> {
        self.bind_device(device)?;
        self.cell.state.write().device_storage()?;
        Ok(self)
    }

    /// Bind to `device`, dropping device storage held on another device
    pub fn bind_device(&self, device: &Device) -> Result<()> {
        let mut storage = self.cell.state.write();
        if let Some(bound) = &storage.device {
            if bound.same_as(device) {
                return Ok(());
            }
        }

        storage.ensure_host_current()?;
        storage.device_buffer = None;
        storage.coherency.forget_device();
        storage.device = Some(device.clone());
        Ok(())
    }

    pub fn device(&self) -> Option<Device> {
        self.cell.state.read().device.clone()
    }

    pub fn shape(&self) -> S {
        let dims = self.cell.dims();
        match S::from_dims(&dims) {
            Ok(shape) => shape,
            Err(_) => unreachable!("arity of a tensor is fixed by its shape type"),
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.cell.dims()
    }

    pub fn size(&self) -> usize {
        self.cell.state.read().data.len()
    }

    pub fn is_resizable(&self) -> bool {
        self.cell.state.read().resizable
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let size = self.size();
        if index >= size {
            return Err(Error::IndexOutOfBounds { index, size });
        }
        Ok(())
    }

    fn flat_of(&self, idx: &[usize]) -> Result<usize> {
        let storage = self.cell.state.read();
        if idx.len() != storage.dims.len() {
            return Err(Error::invalid_shape(format!(
                "index of arity {} for a tensor of arity {}",
                idx.len(),
                storage.dims.len()
            )));
        }
        if let Some((&i, &d)) = idx.iter().zip(&storage.dims).find(|&(&i, &d)| i >= d) {
            return Err(Error::IndexOutOfBounds { index: i, size: d });
        }
        Ok(flat_index(&storage.dims, storage.order, idx))
    }

    pub fn get(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        Ok(self.cell.read_current()?.data[index])
    }

    pub fn set(&self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        self.cell.write_flat(index, value)
    }

    pub fn at(&self, idx: &[usize]) -> Result<T> {
        let flat = self.flat_of(idx)?;
        Ok(self.cell.read_current()?.data[flat])
    }

    pub fn set_at(&self, idx: &[usize], value: T) -> Result<()> {
        let flat = self.flat_of(idx)?;
        self.cell.write_flat(flat, value)
    }

    /// Host copy of the elements in storage order
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.cell.read_current()?.data.clone())
    }

    /// Overwrite every element; the stale side is never copied
    pub fn fill(&self, value: T) -> Result<()> {
        let mut storage = self.cell.state.write();
        storage.data.fill(value);
        storage.coherency.invalidate_device();
        Ok(())
    }

    pub fn copy_from_slice(&self, values: &[T]) -> Result<()> {
        let mut storage = self.cell.state.write();
        if values.len() != storage.data.len() {
            return Err(Error::ShapeMismatch {
                expected: storage.dims.clone(),
                actual: vec![values.len()],
            });
        }
        storage.data.copy_from_slice(values);
        storage.coherency.invalidate_device();
        Ok(())
    }

    /// Run `f` over the contiguous, coherency-current host buffer
    pub fn with_host_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let storage = self.cell.read_current()?;
        Ok(f(&storage.data))
    }

    /// Run `f` over the host buffer for writing; the device copy is
    /// invalidated before `f` runs
    pub fn with_host_slice_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let mut storage = self.cell.state.write();
        storage.prepare_write()?;
        Ok(f(&mut storage.data))
    }

    /// Handle of a coherency-current device copy, allocating it on first use
    pub fn device_buffer(&self) -> Result<BufferHandle> {
        self.cell.state.write().device_storage()
    }

    /// Handle of the device copy, if one has been allocated
    pub fn device_handle(&self) -> Option<BufferHandle> {
        self.cell.state.read().device_buffer.as_ref().map(DeviceBuffer::handle)
    }

    /// Release device storage after making the host copy current
    pub fn gpu_evict(&self) -> Result<()> {
        let mut storage = self.cell.state.write();
        storage.ensure_host_current()?;
        storage.device_buffer = None;
        storage.coherency.forget_device();
        Ok(())
    }

    /// Device-to-device copy of `other` into this tensor
    ///
    /// Afterwards only the device copy of `self` is valid.
    pub fn device_copy_from<S2: Shape>(&self, other: &Tensor<T, S2>) -> Result<()> {
        self.cell.copy_device_from(&other.cell)
    }

    pub fn coherency_state(&self) -> CoherencyState {
        self.cell.state()
    }

    pub fn storage_id(&self) -> StorageId {
        self.cell.id
    }

    /// Second handle to the same storage
    pub fn share(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            _shape: PhantomData,
        }
    }

    /// Deep copy, reporting a failed device read-back
    pub fn try_clone(&self) -> Result<Self> {
        let storage = self.cell.read_current()?;
        let mut data = zeroed_vec(storage.data.len())?;
        data.copy_from_slice(&storage.data);

        let coherency = if storage.coherency.state() == CoherencyState::Uninitialized {
            Coherency::uninitialized()
        } else {
            Coherency::host_only()
        };

        Ok(Self::from_storage(Storage {
            data,
            dims: storage.dims.clone(),
            order: storage.order,
            coherency,
            device_buffer: None,
            device: storage.device.clone(),
            resizable: storage.resizable,
        }))
    }
}

impl<T: Element> DynTensor<T> {
    /// Scratch tensor for temporaries
    pub(crate) fn try_zeroed(dims: &[usize]) -> Result<Self> {
        Self::new(dims.to_vec())
    }
}

impl<T: Element, S: Shape> Clone for Tensor<T, S> {
    /// # Panics
    ///
    /// When the device copy is authoritative and cannot be read back; use
    /// [`Tensor::try_clone`] to handle that case.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(tensor) => tensor,
            Err(err) => panic!("failed to clone {}: {err}", self.cell.id),
        }
    }
}

impl<T: Element, S: Shape> fmt::Debug for Tensor<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.cell.state.read();
        f.debug_struct("Tensor")
            .field("id", &self.cell.id)
            .field("dims", &storage.dims)
            .field("order", &storage.order)
            .field("state", &storage.coherency.state())
            .field("device_buffer", &storage.device_buffer.as_ref().map(DeviceBuffer::handle))
            .finish()
    }
}

impl<T: Element, S: Shape> Coherent for Tensor<T, S> {
    fn invalidate_host(&self) -> Result<()> {
        self.cell.invalidate_host()
    }

    fn invalidate_device(&self) {
        self.cell.invalidate_device()
    }

    fn validate_host(&self) {
        self.cell.validate_host()
    }

    fn validate_device(&self) {
        self.cell.validate_device()
    }

    fn is_host_current(&self) -> bool {
        self.cell.is_host_current()
    }

    fn is_device_current(&self) -> bool {
        self.cell.is_device_current()
    }

    fn ensure_host_current(&self) -> Result<()> {
        self.cell.ensure_host_current()
    }

    fn ensure_device_current(&self) -> Result<()> {
        self.cell.ensure_device_current()
    }
}

impl<T: Element, S: Shape> Expr for Tensor<T, S> {
    type Elem = T;

    fn dims(&self) -> Vec<usize> {
        self.cell.dims()
    }

    fn size(&self) -> usize {
        Tensor::size(self)
    }

    fn order(&self) -> Order {
        self.cell.order()
    }

    fn read_flat(&self, i: usize) -> T {
        self.cell.read_flat(i)
    }

    fn load(&self, start: usize, out: &mut [T]) -> Result<()> {
        self.cell.load(start, out)
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn direct_storage(&self) -> Option<StorageRef<T>> {
        Some(Arc::clone(&self.cell))
    }

    fn collect_storage(&self, out: &mut Vec<StorageId>) {
        out.push(self.cell.id);
    }

    fn visit_temporaries(&self, _alloc: &mut TemporaryAllocator<T>) -> Result<()> {
        Ok(())
    }

    fn visit_evaluator(&self, visitor: &mut EvaluatorVisitor<'_>, need_value: bool) -> Result<()> {
        if need_value && !self.cell.is_host_current() {
            self.cell.ensure_host_current()?;
            visitor.note_synced();
        }
        Ok(())
    }

    fn visit_back_propagate(&self, _visitor: &mut BackPropagateVisitor) {}

    fn prepare_host(&self) -> Result<()> {
        self.cell.ensure_host_current()
    }
}

impl<T: Element, S: Shape> WritableExpr for Tensor<T, S> {
    fn write_flat(&self, i: usize, value: T) -> Result<()> {
        self.cell.write_flat(i, value)
    }

    fn store(&self, start: usize, values: &[T]) -> Result<()> {
        self.cell.store(start, values)
    }

    fn can_resize_to(&self, dims: &[usize]) -> bool {
        self.is_resizable() && S::from_dims(dims).is_ok()
    }

    fn resize_to(&self, dims: &[usize]) -> Result<()> {
        if !self.can_resize_to(dims) {
            return Err(Error::shape_mismatch(&self.dims(), dims));
        }
        self.cell.resize(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Order;

    #[test]
    fn test_from_vec_validates_length() {
        let err = DynTensor::from_vec(vec![2, 3], vec![1.0f64; 5]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let t = Matrix::<f64, 2>::from_vec([2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(t.shape(), [2, 3]);
        assert_eq!(t.size(), 6);
    }

    #[test]
    fn test_empty_is_uninitialized() {
        let t = DynTensor::<f32>::empty();
        assert_eq!(t.size(), 0);
        assert_eq!(t.coherency_state(), CoherencyState::Uninitialized);
        assert!(t.is_resizable());
    }

    #[test]
    fn test_element_access() {
        let t = DynTensor::from_vec(vec![2, 3], (1..=6).map(f64::from).collect()).unwrap();
        assert_eq!(t.get(4).unwrap(), 5.0);
        assert_eq!(t.at(&[1, 0]).unwrap(), 4.0);

        t.set_at(&[0, 2], 30.0).unwrap();
        assert_eq!(t.get(2).unwrap(), 30.0);

        assert!(matches!(t.get(6), Err(Error::IndexOutOfBounds { index: 6, size: 6 })));
        assert!(matches!(t.at(&[2, 0]), Err(Error::IndexOutOfBounds { index: 2, size: 2 })));
        assert!(matches!(t.at(&[0]), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_column_major_multi_index() {
        let t = DynTensor::from_vec(vec![2, 3], vec![1i32, 2, 3, 4, 5, 6])
            .unwrap()
            .with_order(Order::ColumnMajor);
        assert_eq!(t.at(&[1, 0]).unwrap(), 2);
        assert_eq!(t.at(&[0, 1]).unwrap(), 3);
    }

    #[test]
    fn test_clone_is_deep_and_share_is_shallow() {
        let a = DynTensor::from_vec(vec![3], vec![1.0f32, 2.0, 3.0]).unwrap();
        let deep = a.clone();
        let shallow = a.share();

        a.set(0, 10.0).unwrap();
        assert_eq!(deep.get(0).unwrap(), 1.0);
        assert_eq!(shallow.get(0).unwrap(), 10.0);
        assert_ne!(deep.storage_id(), a.storage_id());
        assert_eq!(shallow.storage_id(), a.storage_id());
    }

    #[test]
    fn test_device_round_trip() {
        let device = Device::cpu();
        let t = DynTensor::from_vec(vec![4], vec![1.0f64, 2.0, 3.0, 4.0])
            .unwrap()
            .on_device(&device)
            .unwrap();
        assert_eq!(t.coherency_state(), CoherencyState::BothValid);

        t.set(1, 20.0).unwrap();
        assert_eq!(t.coherency_state(), CoherencyState::HostValid);

        t.ensure_device_current().unwrap();
        t.invalidate_host().unwrap();
        assert_eq!(t.coherency_state(), CoherencyState::DeviceValid);

        assert_eq!(t.to_vec().unwrap(), vec![1.0, 20.0, 3.0, 4.0]);
        assert_eq!(t.coherency_state(), CoherencyState::BothValid);
    }

    #[test]
    fn test_invalidate_host_without_device_storage() {
        let t = DynTensor::from_vec(vec![2], vec![1i64, 2]).unwrap();
        assert!(matches!(t.invalidate_host(), Err(Error::Coherency(_))));
        assert_eq!(t.coherency_state(), CoherencyState::HostValid);

        t.validate_device();
        assert_eq!(t.coherency_state(), CoherencyState::HostValid);
    }

    #[test]
    fn test_fill_skips_download() {
        let device = Device::cpu();
        let t = DynTensor::from_vec(vec![2], vec![1.0f32, 2.0])
            .unwrap()
            .on_device(&device)
            .unwrap();
        t.invalidate_host().unwrap();

        let before = device.stats().d2h_copies;
        t.fill(7.0).unwrap();
        assert_eq!(device.stats().d2h_copies, before);
        assert_eq!(t.to_vec().unwrap(), vec![7.0, 7.0]);
    }

    #[test]
    fn test_gpu_evict_keeps_latest_values() {
        let device = Device::cpu();
        let a = DynTensor::from_vec(vec![3], vec![1.0f64, 2.0, 3.0])
            .unwrap()
            .on_device(&device)
            .unwrap();
        let b = DynTensor::<f64>::new(vec![3]).unwrap();
        b.device_copy_from(&a).unwrap();
        assert_eq!(b.coherency_state(), CoherencyState::DeviceValid);

        b.gpu_evict().unwrap();
        assert_eq!(b.coherency_state(), CoherencyState::HostValid);
        assert!(b.device_handle().is_none());
        assert_eq!(b.to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_device_copy_size_mismatch() {
        let a = DynTensor::<f32>::new(vec![3]).unwrap();
        let b = DynTensor::<f32>::new(vec![4]).unwrap();
        assert!(matches!(b.device_copy_from(&a), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_fixed_tensor_does_not_resize() {
        let fixed = Matrix::<f64, 2>::fixed([2, 2]).unwrap();
        assert!(!fixed.can_resize_to(&[4, 1]));

        let dynamic = Matrix::<f64, 2>::new([2, 2]).unwrap();
        assert!(dynamic.can_resize_to(&[4, 1]));
        assert!(!dynamic.can_resize_to(&[4]));

        dynamic.resize_to(&[3, 1]).unwrap();
        assert_eq!(dynamic.shape(), [3, 1]);
        assert_eq!(dynamic.to_vec().unwrap(), vec![0.0; 3]);
    }
}
