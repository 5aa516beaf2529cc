//! Device arrival and removal.
//!
//! [`DeviceLifecycle`] owns at most one device and moves it between two
//! states:
//!
//! ```text
//! ┌──────────────┐        probe()         ┌────────────┐
//! │ Unregistered │ ─────────────────────> │ Registered │
//! │              │ <───────────────────── │            │
//! └──────────────┘        remove()        └────────────┘
//! ```
//!
//! A failing probe never leaves `Unregistered`: every resource acquired
//! before the failing step is released before the error is returned.
//!
//! `probe` and `remove` hold the device slot for their whole run, including
//! the mapper, host and hook calls and the worker join, so a second arrival
//! or removal cannot interleave with them. [`state`](DeviceLifecycle::state)
//! and [`device`](DeviceLifecycle::device) wait for that run to finish; the
//! slot is a `std::sync::Mutex` so those callers sleep rather than spin.

use alloc::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::UioConfig;
use crate::device::UioDevice;
use crate::error::{UioError, UioResult};
use crate::host::{DeviceHooks, NoHooks, SessionHost};
use crate::mapper::IoMapper;
use crate::resource::PlatformDevice;

/// Device lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No device is registered.
    Unregistered,
    /// A device is registered and accepts consumer opens.
    Registered,
}

/// Orchestrates setup and teardown of one UIO device.
pub struct DeviceLifecycle {
    config: UioConfig,
    mapper: Arc<dyn IoMapper>,
    host: Arc<dyn SessionHost>,
    hooks: Arc<dyn DeviceHooks>,
    device: Mutex<Option<Arc<UioDevice>>>,
}

impl DeviceLifecycle {
    /// Creates an unregistered lifecycle.
    pub fn new(config: UioConfig, mapper: Arc<dyn IoMapper>, host: Arc<dyn SessionHost>) -> Self {
        Self {
            config,
            mapper,
            host,
            hooks: Arc::new(NoHooks),
            device: Mutex::new(None),
        }
    }

    /// Sets the collaborator that publishes attributes and runs the
    /// post-registration self-test.
    pub fn with_hooks(mut self, hooks: Arc<dyn DeviceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &UioConfig {
        &self.config
    }

    /// Gets the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        if self.slot().is_some() {
            LifecycleState::Registered
        } else {
            LifecycleState::Unregistered
        }
    }

    /// The registered device, if any.
    pub fn device(&self) -> Option<Arc<UioDevice>> {
        self.slot().clone()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<UioDevice>>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles the arrival of `pdev`: maps its regions and registers it with
    /// the session host.
    ///
    /// Returns the minor number assigned by the host.
    ///
    /// # Errors
    ///
    /// - [`UioError::AlreadyRegistered`] if a device is already registered.
    /// - [`UioError::AllocationFailure`] if the device record cannot be
    ///   allocated; nothing has been mapped.
    /// - [`UioError::NoResource`] if no region could be mapped.
    /// - [`UioError::AttributeFailure`] if attribute export fails; regions
    ///   are unmapped.
    /// - [`UioError::RegistrationFailure`] if the host rejects the device;
    ///   attributes are retracted and regions unmapped.
    pub fn probe(&self, pdev: &dyn PlatformDevice) -> UioResult<u32> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(UioError::AlreadyRegistered);
        }

        let device = Arc::new(UioDevice::try_new(&self.config, Arc::clone(&self.mapper))?);

        if let Err(err) = device.map_regions(pdev, self.config.region_name) {
            error!("{}: there is no resource for register uio device", pdev.name());
            return Err(err);
        }

        if let Err(err) = self.hooks.publish(&device) {
            error!("{}: failed to publish attributes: {:?}", pdev.name(), err);
            device.unmap_regions();
            return Err(UioError::AttributeFailure(err));
        }

        let minor = match self.host.register(Arc::clone(&device)) {
            Ok(minor) => minor,
            Err(err) => {
                error!("{}: failed to register uio device: {:?}", pdev.name(), err);
                self.hooks.retract(&device);
                device.unmap_regions();
                return Err(UioError::RegistrationFailure(err));
            }
        };
        device.set_minor(minor);

        if let Err(err) = self.hooks.self_test(&device) {
            warn!("{}: self-test failed: {:?}", pdev.name(), err);
        }

        info!(
            "{}: registered {} v{} as uio{} with {} region(s)",
            pdev.name(),
            device.name(),
            device.version(),
            minor,
            device.region_count()
        );
        *slot = Some(device);
        Ok(minor)
    }

    /// Handles removal of the registered device.
    ///
    /// Outstanding opens are dropped and the poll worker is stopped before
    /// the device is unregistered and its regions unmapped.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::NotRegistered`] if no device is registered.
    pub fn remove(&self) -> UioResult {
        let mut slot = self.slot();
        let device = slot.take().ok_or(UioError::NotRegistered)?;

        let dropped = device.session().shutdown();
        if dropped > 0 {
            warn!("{}: removed while open by {} consumer(s)", device.name(), dropped);
        }

        self.hooks.retract(&device);
        if let Some(minor) = device.minor() {
            self.host.unregister(minor);
        }
        device.unmap_regions();

        info!("{}: removed", device.name());
        Ok(())
    }
}

impl Drop for DeviceLifecycle {
    fn drop(&mut self) {
        let registered = self
            .device
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if registered {
            let _ = self.remove();
        }
    }
}

impl core::fmt::Debug for DeviceLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceLifecycle")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}
