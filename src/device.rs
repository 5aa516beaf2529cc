use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use memory_addr::PhysAddr;
use spin::RwLock;

use crate::config::UioConfig;
use crate::error::UioResult;
use crate::mapper::IoMapper;
use crate::notify::EventCounter;
use crate::region::{MappedRegions, Region};
use crate::resource::PlatformDevice;
use crate::session::DeviceSession;

/// Minor number of a device that has not been registered yet.
pub const MINOR_UNASSIGNED: u32 = u32::MAX;

/// represent a platform device exposed to user space
pub struct UioDevice {
    name: String,
    version: String,
    minor: AtomicU32,
    regions: RwLock<MappedRegions>,
    events: Arc<EventCounter>,
    session: DeviceSession,
}

/// The implemention for UioDevice
impl UioDevice {
    /// Allocates a device record with no mapped region and an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::AllocationFailure`] if the record cannot be
    /// allocated.
    ///
    /// [`UioError::AllocationFailure`]: crate::UioError::AllocationFailure
    pub fn try_new(config: &UioConfig, mapper: Arc<dyn IoMapper>) -> UioResult<Self> {
        let mut name = String::new();
        name.try_reserve_exact(config.name.len())?;
        name.push_str(config.name);

        let mut version = String::new();
        version.try_reserve_exact(config.version.len())?;
        version.push_str(config.version);

        let events = Arc::new(EventCounter::new());
        let session = DeviceSession::new(
            events.clone(),
            config.poll_interval,
            config.worker_prefix,
        );

        Ok(Self {
            name,
            version,
            minor: AtomicU32::new(MINOR_UNASSIGNED),
            regions: RwLock::new(MappedRegions::new(mapper)),
            events,
            session,
        })
    }

    /// Maps the memory resources of `pdev` into this device.
    pub(crate) fn map_regions(&self, pdev: &dyn PlatformDevice, region_name: &'static str) -> UioResult<usize> {
        self.regions.write().setup(pdev, region_name)
    }

    /// Unmaps every region of this device.
    pub(crate) fn unmap_regions(&self) {
        self.regions.write().teardown();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Minor number assigned by the session host, if registered.
    pub fn minor(&self) -> Option<u32> {
        match self.minor.load(Ordering::Acquire) {
            MINOR_UNASSIGNED => None,
            minor => Some(minor),
        }
    }

    pub(crate) fn set_minor(&self, minor: u32) {
        self.minor.store(minor, Ordering::Release);
        self.session.set_minor(minor);
    }

    /// Snapshot of the mapped regions, in descriptor order.
    pub fn regions(&self) -> Vec<Region> {
        self.regions.read().regions().to_vec()
    }

    /// Number of mapped regions.
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Physical base of the primary register block.
    pub fn physical_addr(&self) -> Option<PhysAddr> {
        self.regions.read().primary().map(|r| r.phys_addr)
    }

    /// Finds the region containing `paddr` and the offset inside it.
    pub fn lookup(&self, paddr: PhysAddr) -> Option<(Region, usize)> {
        self.regions
            .read()
            .lookup(paddr)
            .map(|(region, offset)| (*region, offset))
    }

    /// Readiness events signalled by the poll worker.
    pub fn events(&self) -> &Arc<EventCounter> {
        &self.events
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Consumer open callback.
    pub fn open(&self) -> UioResult {
        self.session.open()
    }

    /// Consumer release callback.
    pub fn release(&self) -> UioResult {
        self.session.close()
    }
}

impl core::fmt::Debug for UioDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UioDevice")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("minor", &self.minor())
            .field("regions", &self.region_count())
            .field("session", &self.session)
            .finish()
    }
}
