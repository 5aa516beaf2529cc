//! In-process session host.
//!
//! [`UioRegistry`] plays the part of the device-exposure framework: it hands
//! out minor numbers on registration and dispatches consumer opens and
//! closes to the registered device. It is an explicit object, created by the
//! caller and passed to each [`DeviceLifecycle`]; there is no global device
//! table.
//!
//! [`DeviceLifecycle`]: crate::DeviceLifecycle

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::time::Duration;

use axerrno::{ax_err, AxResult};
use spin::RwLock;

use crate::device::UioDevice;
use crate::error::{UioError, UioResult};
use crate::host::SessionHost;

/// Number of minor numbers available to a registry.
pub const MAX_MINORS: u32 = 1 << 20;

/// Device table keyed by minor number.
///
/// # Concurrency
///
/// Lookups take a read lock only long enough to clone the device `Arc`;
/// session work happens on the device itself, outside the table lock.
pub struct UioRegistry {
    devices: RwLock<BTreeMap<u32, Arc<UioDevice>>>,
    max_minors: u32,
}

impl UioRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::with_capacity(MAX_MINORS)
    }

    /// Creates a registry that hands out at most `max_minors` minor numbers.
    pub fn with_capacity(max_minors: u32) -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            max_minors,
        }
    }

    /// Lowest minor number not in use.
    fn free_minor(devices: &BTreeMap<u32, Arc<UioDevice>>) -> u32 {
        let mut candidate = 0;
        for &minor in devices.keys() {
            if minor != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Gets a device by its minor number.
    pub fn get_device(&self, minor: u32) -> Option<Arc<UioDevice>> {
        self.devices.read().get(&minor).cloned()
    }

    /// Opens the device registered under `minor` on behalf of a consumer.
    ///
    /// # Errors
    ///
    /// - [`UioError::NotRegistered`] if no device uses this minor.
    /// - Any error of [`UioDevice::open`].
    pub fn open(&self, minor: u32) -> UioResult<UioHandle> {
        let device = self.get_device(minor).ok_or(UioError::NotRegistered)?;
        device.open()?;
        Ok(UioHandle {
            device,
            open: true,
        })
    }

    /// Lists all registered minor numbers.
    pub fn list_devices(&self) -> Vec<u32> {
        self.devices.read().keys().copied().collect()
    }

    /// Gets the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

impl SessionHost for UioRegistry {
    fn register(&self, device: Arc<UioDevice>) -> AxResult<u32> {
        let mut devices = self.devices.write();
        let minor = Self::free_minor(&devices);
        if minor >= self.max_minors {
            return ax_err!(NoMemory, "no free minor number");
        }
        devices.insert(minor, device);
        Ok(minor)
    }

    fn unregister(&self, minor: u32) {
        if self.devices.write().remove(&minor).is_none() {
            warn!("unregister of unknown minor {}", minor);
        }
    }
}

impl Default for UioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An open consumer session on a registered device.
///
/// Dropping the handle closes the session.
pub struct UioHandle {
    device: Arc<UioDevice>,
    open: bool,
}

impl UioHandle {
    pub fn device(&self) -> &Arc<UioDevice> {
        &self.device
    }

    /// Waits for a readiness event newer than `seen`; see
    /// [`EventCounter::wait_event`](crate::EventCounter::wait_event).
    pub fn wait_event(&self, seen: u32, timeout: Duration) -> Option<u32> {
        self.device.events().wait_event(seen, timeout)
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::NotOpen`] if the device was removed while the
    /// session was open.
    pub fn close(mut self) -> UioResult {
        self.open = false;
        self.device.release()
    }
}

impl Drop for UioHandle {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.device.release() {
                debug!("{}: release on drop: {}", self.device.name(), err);
            }
        }
    }
}
