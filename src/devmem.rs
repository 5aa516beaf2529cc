//! [`IoMapper`] backed by `/dev/mem`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

use axerrno::{AxError, AxResult};
use memory_addr::PhysAddr;

use crate::mapper::{IoMapper, MappedPtr};

/// Maps physical windows with `mmap(2)` on `/dev/mem`.
///
/// Mappings are shared and uncached by the kernel for device ranges; the
/// caller must only map ranges that belong to the device.
pub struct DevMemMapper {
    file: File,
}

impl DevMemMapper {
    /// Opens `/dev/mem` for read/write with `O_SYNC`.
    pub fn open() -> io::Result<Self> {
        Self::open_path("/dev/mem")
    }

    /// Opens a `/dev/mem`-like character device at `path`.
    pub fn open_path(path: &str) -> io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;
        Ok(Self { file })
    }
}

impl IoMapper for DevMemMapper {
    fn map(&self, paddr: PhysAddr, size: usize) -> AxResult<MappedPtr> {
        let offset = libc::off_t::try_from(paddr.as_usize()).map_err(|_| AxError::InvalidInput)?;

        // Safety: a fresh shared mapping of the device file; no existing
        // memory is aliased.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            warn!("mmap of {:#x} ({:#x} bytes) failed: {}", paddr.as_usize(), size, err);
            return Err(match err.raw_os_error() {
                Some(libc::EACCES) | Some(libc::EPERM) => AxError::PermissionDenied,
                Some(libc::ENOMEM) => AxError::NoMemory,
                _ => AxError::BadAddress,
            });
        }

        MappedPtr::from_raw(ptr.cast()).ok_or(AxError::BadAddress)
    }

    fn unmap(&self, ptr: MappedPtr, size: usize) {
        // Safety: `ptr` and `size` come from a successful `map` above and the
        // region table releases each mapping once.
        let ret = unsafe { libc::munmap(ptr.as_ptr().cast(), size) };
        if ret != 0 {
            error!(
                "munmap of {:#x} ({:#x} bytes) failed: {}",
                ptr.addr(),
                size,
                io::Error::last_os_error()
            );
        }
    }
}
