//! Collaborators the lifecycle talks to while bringing a device up and down.

use alloc::sync::Arc;

use axerrno::AxResult;

use crate::device::UioDevice;

/// The framework that exposes devices to user-space consumers.
///
/// Once registered, the host invokes [`UioDevice::open`] and
/// [`UioDevice::release`] whenever a consumer opens or closes the device.
pub trait SessionHost: Send + Sync {
    /// Makes `device` visible to consumers. Returns the minor number assigned
    /// to it.
    fn register(&self, device: Arc<UioDevice>) -> AxResult<u32>;

    /// Withdraws the device registered under `minor`.
    fn unregister(&self, minor: u32);
}

/// Side work performed around registration.
///
/// `publish`/`retract` export and remove the descriptive attributes of the
/// device; `self_test` runs a one-time diagnostic once the device is live.
/// All methods default to no-ops.
pub trait DeviceHooks: Send + Sync {
    /// Called after the regions are mapped, before registration. A failure
    /// aborts the probe.
    fn publish(&self, _device: &UioDevice) -> AxResult {
        Ok(())
    }

    /// Undoes [`publish`](Self::publish).
    fn retract(&self, _device: &UioDevice) {}

    /// Called once the device is registered. Failures are logged only.
    fn self_test(&self, _device: &UioDevice) -> AxResult {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl DeviceHooks for NoHooks {}
