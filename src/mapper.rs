//! The physical-to-virtual mapping primitive consumed by the region mapper.

use core::ptr::NonNull;

use axerrno::AxResult;
use memory_addr::PhysAddr;

/// A live mapping of a physical window.
///
/// The pointer is only meaningful between a successful [`IoMapper::map`] and
/// the matching [`IoMapper::unmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPtr(NonNull<u8>);

// Safety: the pointer refers to device memory accessed with volatile
// operations by whoever owns the mapping; the handle itself carries no state.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

impl MappedPtr {
    pub const fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Wraps a raw pointer, returning `None` if it is null.
    pub fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    #[inline]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Maps physical register windows into the caller's address space.
pub trait IoMapper: Send + Sync {
    /// Maps `size` bytes starting at `paddr`. Both are page aligned.
    fn map(&self, paddr: PhysAddr, size: usize) -> AxResult<MappedPtr>;

    /// Releases a mapping previously returned by [`IoMapper::map`].
    fn unmap(&self, ptr: MappedPtr, size: usize);
}
