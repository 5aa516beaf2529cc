//! Register region mapping for a platform device.
//!
//! [`MappedRegions`] walks the memory resources of a [`PlatformDevice`], maps
//! each present slot through an [`IoMapper`] and keeps the resulting windows
//! in a fixed-capacity table. The table is written only during setup and
//! teardown; afterwards it is read-only, so lookups need no locking beyond
//! the owner's.
//!
//! Every entry in the table is fully valid: physical base, size and a live
//! mapping. Slots that are absent or fail to map never enter the table.

use alloc::sync::Arc;

use arrayvec::ArrayVec;
use memory_addr::{align_down_4k, PhysAddr, PAGE_SIZE_4K};

use crate::error::{UioError, UioResult};
use crate::mapper::{IoMapper, MappedPtr};
use crate::resource::{MemResource, PlatformDevice, MAX_UIO_MAPS};

/// Kind of memory behind a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Physical device memory, mapped by physical address.
    Phys,
}

/// One mapped register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Resource slot of the platform device this region was built from.
    pub slot: usize,
    /// Name reported for the region.
    pub name: &'static str,
    /// Page-aligned physical base.
    pub phys_addr: PhysAddr,
    /// Size in bytes, a multiple of the page size.
    pub size: usize,
    /// Kind of memory.
    pub kind: RegionKind,
    mapped: MappedPtr,
}

impl Region {
    /// Pointer to the start of the mapping.
    #[inline]
    pub fn mapped(&self) -> MappedPtr {
        self.mapped
    }

    /// Returns the offset of `paddr` inside this region, if it falls in it.
    #[inline]
    pub fn offset_of(&self, paddr: PhysAddr) -> Option<usize> {
        let offset = paddr.as_usize().checked_sub(self.phys_addr.as_usize())?;
        (offset < self.size).then_some(offset)
    }
}

/// The mapped regions of one device.
///
/// Dropping the table unmaps whatever is still mapped.
pub struct MappedRegions {
    regions: ArrayVec<Region, MAX_UIO_MAPS>,
    mapper: Arc<dyn IoMapper>,
}

impl MappedRegions {
    /// Creates an empty table that will map through `mapper`.
    pub fn new(mapper: Arc<dyn IoMapper>) -> Self {
        Self {
            regions: ArrayVec::new(),
            mapper,
        }
    }

    /// Maps every present memory resource of `pdev`.
    ///
    /// Absent slots are skipped silently; slots whose mapping fails are
    /// skipped with a warning. Returns the number of regions mapped.
    ///
    /// # Errors
    ///
    /// Returns [`UioError::NoResource`] if no region could be mapped.
    pub fn setup(&mut self, pdev: &dyn PlatformDevice, region_name: &'static str) -> UioResult<usize> {
        for slot in 0..MAX_UIO_MAPS {
            if self.regions.is_full() {
                break;
            }
            let Some(res) = pdev.mem_resource(slot) else {
                continue;
            };
            if res.size == 0 {
                warn!("{}: resource {} is empty, skipped", pdev.name(), slot);
                continue;
            }

            let Some((phys_addr, size)) = page_window(&res) else {
                warn!(
                    "{}: resource {} [{:#x}, +{:#x}) overflows the address space, skipped",
                    pdev.name(),
                    slot,
                    res.start.as_usize(),
                    res.size
                );
                continue;
            };

            match self.mapper.map(phys_addr, size) {
                Ok(mapped) => {
                    debug!(
                        "{}: mapped resource {} [{:#x}, {:#x}) at {:#x}",
                        pdev.name(),
                        slot,
                        phys_addr.as_usize(),
                        phys_addr.as_usize() + size,
                        mapped.addr()
                    );
                    self.regions.push(Region {
                        slot,
                        name: region_name,
                        phys_addr,
                        size,
                        kind: RegionKind::Phys,
                        mapped,
                    });
                }
                Err(err) => {
                    warn!(
                        "{}: failed to map resource {} at {:#x}: {:?}",
                        pdev.name(),
                        slot,
                        phys_addr.as_usize(),
                        err
                    );
                }
            }
        }

        if self.regions.is_empty() {
            return Err(UioError::NoResource);
        }
        Ok(self.regions.len())
    }

    /// Unmaps every region and empties the table.
    ///
    /// Released regions leave the table, so calling this again is a no-op.
    pub fn teardown(&mut self) {
        for region in self.regions.drain(..) {
            trace!(
                "unmapping region {} at {:#x} ({:#x} bytes)",
                region.slot,
                region.phys_addr.as_usize(),
                region.size
            );
            self.mapper.unmap(region.mapped, region.size);
        }
    }

    /// Finds the region containing `paddr` and the offset inside it.
    #[inline]
    pub fn lookup(&self, paddr: PhysAddr) -> Option<(&Region, usize)> {
        self.regions
            .iter()
            .find_map(|r| r.offset_of(paddr).map(|offset| (r, offset)))
    }

    /// The primary register block, if any region is mapped.
    #[inline]
    pub fn primary(&self) -> Option<&Region> {
        self.regions.first()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Gets the mapped regions slice.
    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

/// Page-aligned base and page-rounded size of `res`, or `None` if either
/// the resource or its rounded window runs past the end of the address space.
fn page_window(res: &MemResource) -> Option<(PhysAddr, usize)> {
    let start = res.start.as_usize();
    start.checked_add(res.size)?;
    let size = res.size.checked_add(PAGE_SIZE_4K - 1)? & !(PAGE_SIZE_4K - 1);
    let base = align_down_4k(start);
    base.checked_add(size)?;
    Some((PhysAddr::from(base), size))
}

impl Drop for MappedRegions {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl core::fmt::Debug for MappedRegions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedRegions")
            .field("regions", &self.regions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemResource, StaticPlatformDevice};
    use alloc::collections::BTreeMap;
    use axerrno::{AxError, AxResult};
    use core::ptr::NonNull;
    use spin::Mutex;

    /// Hands out fake addresses and remembers what is still mapped.
    #[derive(Default)]
    struct FakeMapper {
        live: Mutex<BTreeMap<usize, usize>>,
        next: Mutex<usize>,
        reject: Option<usize>,
        unmaps: Mutex<usize>,
    }

    impl FakeMapper {
        fn rejecting(paddr: usize) -> Self {
            Self {
                reject: Some(paddr),
                ..Self::default()
            }
        }

        fn live(&self) -> usize {
            self.live.lock().len()
        }
    }

    impl IoMapper for FakeMapper {
        fn map(&self, paddr: PhysAddr, size: usize) -> AxResult<MappedPtr> {
            if self.reject == Some(paddr.as_usize()) {
                return Err(AxError::BadAddress);
            }
            let mut next = self.next.lock();
            *next += 0x10_0000;
            let addr = 0x7f00_0000_0000 + *next;
            self.live.lock().insert(addr, size);
            Ok(MappedPtr::new(NonNull::new(addr as *mut u8).unwrap()))
        }

        fn unmap(&self, ptr: MappedPtr, size: usize) {
            let removed = self.live.lock().remove(&ptr.addr());
            assert_eq!(removed, Some(size), "unmap of unknown mapping");
            *self.unmaps.lock() += 1;
        }
    }

    #[test]
    fn test_setup_aligns_and_skips_holes() {
        let mapper = Arc::new(FakeMapper::default());
        let pdev = StaticPlatformDevice::new("macb0")
            .with_resource(MemResource::new(PhysAddr::from(0x3200_c010), 0x1800))
            .with_hole()
            .with_resource(MemResource::new(PhysAddr::from(0x3201_0000), 0x10));

        let mut regions = MappedRegions::new(mapper.clone());
        assert_eq!(regions.setup(&pdev, "macb_regs").unwrap(), 2);

        let r0 = regions.regions()[0];
        assert_eq!(r0.slot, 0);
        assert_eq!(r0.phys_addr, PhysAddr::from(0x3200_c000));
        assert_eq!(r0.size, 0x2000);
        assert_eq!(r0.kind, RegionKind::Phys);
        assert_eq!(r0.name, "macb_regs");

        let r1 = regions.regions()[1];
        assert_eq!(r1.slot, 2);
        assert_eq!(r1.size, 0x1000);
        assert_eq!(mapper.live(), 2);

        let (hit, offset) = regions.lookup(PhysAddr::from(0x3200_d004)).unwrap();
        assert_eq!(hit.slot, 0);
        assert_eq!(offset, 0x1004);
        assert!(regions.lookup(PhysAddr::from(0x3300_0000)).is_none());
    }

    #[test]
    fn test_setup_no_resource() {
        let mapper = Arc::new(FakeMapper::default());
        let pdev = StaticPlatformDevice::new("empty").with_hole().with_hole();

        let mut regions = MappedRegions::new(mapper.clone());
        assert_eq!(regions.setup(&pdev, "regs"), Err(UioError::NoResource));
        assert!(regions.is_empty());
        assert_eq!(mapper.live(), 0);
    }

    #[test]
    fn test_setup_tolerates_single_map_failure() {
        let mapper = Arc::new(FakeMapper::rejecting(0x1000_0000));
        let pdev = StaticPlatformDevice::new("dev")
            .with_resource(MemResource::new(PhysAddr::from(0x1000_0000), 0x1000))
            .with_resource(MemResource::new(PhysAddr::from(0x2000_0000), 0x1000));

        let mut regions = MappedRegions::new(mapper.clone());
        assert_eq!(regions.setup(&pdev, "regs").unwrap(), 1);
        assert_eq!(regions.primary().unwrap().slot, 1);
    }

    #[test]
    fn test_setup_skips_overflowing_resource() {
        let mapper = Arc::new(FakeMapper::default());
        let pdev = StaticPlatformDevice::new("dev")
            .with_resource(MemResource::new(PhysAddr::from(0x1000), usize::MAX - 10))
            .with_resource(MemResource::new(PhysAddr::from(0x2000), 0x1000))
            .with_resource(MemResource::new(PhysAddr::from(0x3800), usize::MAX - 0x3800));

        let mut regions = MappedRegions::new(mapper.clone());
        assert_eq!(regions.setup(&pdev, "regs").unwrap(), 1);
        assert_eq!(regions.primary().unwrap().slot, 1);
        assert_eq!(regions.primary().unwrap().size, 0x1000);
        assert_eq!(mapper.live(), 1);
    }

    #[test]
    fn test_setup_all_maps_fail() {
        let mapper = Arc::new(FakeMapper::rejecting(0x1000_0000));
        let pdev = StaticPlatformDevice::new("dev")
            .with_resource(MemResource::new(PhysAddr::from(0x1000_0000), 0x1000));

        let mut regions = MappedRegions::new(mapper);
        assert_eq!(regions.setup(&pdev, "regs"), Err(UioError::NoResource));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mapper = Arc::new(FakeMapper::default());
        let pdev = StaticPlatformDevice::new("dev")
            .with_resource(MemResource::new(PhysAddr::from(0x1000_0000), 0x1000))
            .with_resource(MemResource::new(PhysAddr::from(0x2000_0000), 0x1000));

        let mut regions = MappedRegions::new(mapper.clone());
        regions.setup(&pdev, "regs").unwrap();

        regions.teardown();
        regions.teardown();
        assert!(regions.is_empty());
        assert_eq!(mapper.live(), 0);
        assert_eq!(*mapper.unmaps.lock(), 2);

        drop(regions);
        assert_eq!(*mapper.unmaps.lock(), 2);
    }

    #[test]
    fn test_drop_unmaps() {
        let mapper = Arc::new(FakeMapper::default());
        let pdev = StaticPlatformDevice::new("dev")
            .with_resource(MemResource::new(PhysAddr::from(0x1000_0000), 0x1000));

        let mut regions = MappedRegions::new(mapper.clone());
        regions.setup(&pdev, "regs").unwrap();
        assert_eq!(mapper.live(), 1);

        drop(regions);
        assert_eq!(mapper.live(), 0);
    }
}
