//! Platform device resource enumeration.
//!
//! A platform device describes its register windows as a small, indexed table
//! of memory resources. Slots may be empty; the region mapper skips them.

use alloc::string::String;
use alloc::vec::Vec;

use memory_addr::PhysAddr;

/// Maximum number of memory resources mapped per device.
pub const MAX_UIO_MAPS: usize = 5;

/// One memory resource entry of a platform device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemResource {
    /// First physical address of the resource.
    pub start: PhysAddr,
    /// Size of the resource in bytes.
    pub size: usize,
}

impl MemResource {
    pub const fn new(start: PhysAddr, size: usize) -> Self {
        Self { start, size }
    }

    /// Builds a resource from an inclusive `[start, end]` range, the way
    /// firmware tables describe them.
    ///
    /// Returns `None` if `end < start` or the range spans the whole address
    /// space.
    pub fn from_inclusive(start: usize, end: usize) -> Option<Self> {
        let size = end.checked_sub(start)?.checked_add(1)?;
        Some(Self {
            start: PhysAddr::from(start),
            size,
        })
    }
}

/// A device described by the platform (device tree, ACPI, board table).
pub trait PlatformDevice: Send + Sync {
    /// Name of the platform device, used in log messages.
    fn name(&self) -> &str;

    /// Returns the memory resource at `index`, or `None` if the slot is empty.
    fn mem_resource(&self, index: usize) -> Option<MemResource>;
}

/// A platform device backed by an explicit resource table.
#[derive(Debug, Clone, Default)]
pub struct StaticPlatformDevice {
    name: String,
    resources: Vec<Option<MemResource>>,
}

impl StaticPlatformDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            resources: Vec::new(),
        }
    }

    /// Appends a present resource slot.
    pub fn with_resource(mut self, resource: MemResource) -> Self {
        self.resources.push(Some(resource));
        self
    }

    /// Appends an empty resource slot.
    pub fn with_hole(mut self) -> Self {
        self.resources.push(None);
        self
    }
}

impl PlatformDevice for StaticPlatformDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mem_resource(&self, index: usize) -> Option<MemResource> {
        self.resources.get(index).copied().flatten()
    }
}
