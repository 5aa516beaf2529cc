use core::time::Duration;

/// Default poll interval standing in for the device interrupt.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration applied to every device brought up by a [`DeviceLifecycle`].
///
/// [`DeviceLifecycle`]: crate::DeviceLifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UioConfig {
    /// Name reported by the device record.
    pub name: &'static str,
    /// Version string reported by the device record.
    pub version: &'static str,
    /// Name attached to every mapped region.
    pub region_name: &'static str,
    /// Interval between two readiness events while the device is open.
    pub poll_interval: Duration,
    /// Prefix of the poll worker thread name; the minor number is appended.
    pub worker_prefix: &'static str,
}

/// The implemention for UioConfig
impl UioConfig {
    /// Creates a configuration for a device called `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Sets the version string reported for the device.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Sets the name given to every mapped region.
    pub fn with_region_name(mut self, region_name: &'static str) -> Self {
        self.region_name = region_name;
        self
    }

    /// Sets how often the poll worker signals an event while the device is open.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the poll worker thread name prefix; the minor number is appended.
    pub fn with_worker_prefix(mut self, worker_prefix: &'static str) -> Self {
        self.worker_prefix = worker_prefix;
        self
    }
}

impl Default for UioConfig {
    fn default() -> Self {
        Self {
            name: "macb_uio",
            version: "5.0",
            region_name: "macb_regs",
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_prefix: "poll_macb_uio",
        }
    }
}
