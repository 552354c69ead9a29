//! Two-flag coherency state for a buffer with a host copy and a device copy
//!
//! Pure state: no copies happen here. Storage decides when a copy is needed
//! by asking [`Coherency::needs_host_copy`] / [`Coherency::needs_device_copy`],
//! performs it, then records the result with `validate_*`.

use crate::error::{Error, Result};
use std::fmt;

/// Which physical copies hold the latest value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoherencyState {
    /// Freshly allocated, no copy written yet
    Uninitialized,
    HostValid,
    DeviceValid,
    BothValid,
}

impl fmt::Display for CoherencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoherencyState::Uninitialized => "uninitialized",
            CoherencyState::HostValid => "host",
            CoherencyState::DeviceValid => "device",
            CoherencyState::BothValid => "both",
        };
        f.write_str(name)
    }
}

/// Host/device validity flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coherency {
    host_valid: bool,
    device_valid: bool,
}

impl Coherency {
    pub const fn uninitialized() -> Self {
        Self {
            host_valid: false,
            device_valid: false,
        }
    }

    /// State of a container whose host buffer was just written
    pub const fn host_only() -> Self {
        Self {
            host_valid: true,
            device_valid: false,
        }
    }

    pub fn state(&self) -> CoherencyState {
        match (self.host_valid, self.device_valid) {
            (false, false) => CoherencyState::Uninitialized,
            (true, false) => CoherencyState::HostValid,
            (false, true) => CoherencyState::DeviceValid,
            (true, true) => CoherencyState::BothValid,
        }
    }

    pub fn is_host_valid(&self) -> bool {
        self.host_valid
    }

    pub fn is_device_valid(&self) -> bool {
        self.device_valid
    }

    /// Host read must first copy from the device
    pub fn needs_host_copy(&self) -> bool {
        !self.host_valid && self.device_valid
    }

    /// Device read must first copy from the host
    pub fn needs_device_copy(&self) -> bool {
        self.host_valid && !self.device_valid
    }

    /// Mark the host copy valid without copying
    pub fn validate_host(&mut self) {
        self.host_valid = true;
    }

    /// Mark the device copy valid without copying
    pub fn validate_device(&mut self) {
        self.device_valid = true;
    }

    /// Any state becomes `HostValid`
    pub fn invalidate_device(&mut self) {
        self.host_valid = true;
        self.device_valid = false;
    }

    /// Any state becomes `DeviceValid`
    ///
    /// # Errors
    ///
    /// [`Error::Coherency`] when the buffer has no device storage: the
    /// latest value would exist nowhere.
    pub fn invalidate_host(&mut self, has_device_storage: bool) -> Result<()> {
        if !has_device_storage {
            return Err(Error::Coherency(
                "cannot invalidate the host copy of a buffer without device storage".to_string(),
            ));
        }
        self.host_valid = false;
        self.device_valid = true;
        Ok(())
    }

    /// Device storage was dropped; whatever it held is gone
    pub fn forget_device(&mut self) {
        self.device_valid = false;
    }
}

/// Coherency operations exposed by every storage-backed expression
///
/// Views forward these to their referent. Kernels that write one side call
/// the matching `validate_*` and the opposite `invalidate_*` before handing
/// control back.
pub trait Coherent {
    /// Clear the host flag; the device copy becomes authoritative
    fn invalidate_host(&self) -> Result<()>;

    /// Clear the device flag; the host copy becomes authoritative
    fn invalidate_device(&self);

    fn validate_host(&self);

    /// Force-set the device flag. No-op while no device storage exists.
    fn validate_device(&self);

    fn is_host_current(&self) -> bool;
    fn is_device_current(&self) -> bool;

    /// Copy device to host if the host copy is stale, blocking until prior
    /// device work on the buffer has completed
    fn ensure_host_current(&self) -> Result<()>;

    /// Copy host to device if the device copy is stale, allocating device
    /// storage on first use
    fn ensure_device_current(&self) -> Result<()>;
}

impl<C: Coherent + ?Sized> Coherent for &C {
    fn invalidate_host(&self) -> Result<()> {
        (**self).invalidate_host()
    }
    fn invalidate_device(&self) {
        (**self).invalidate_device()
    }
    fn validate_host(&self) {
        (**self).validate_host()
    }
    fn validate_device(&self) {
        (**self).validate_device()
    }
    fn is_host_current(&self) -> bool {
        (**self).is_host_current()
    }
    fn is_device_current(&self) -> bool {
        (**self).is_device_current()
    }
    fn ensure_host_current(&self) -> Result<()> {
        (**self).ensure_host_current()
    }
    fn ensure_device_current(&self) -> Result<()> {
        (**self).ensure_device_current()
    }
}
