use std::ptr::NonNull;

/// The one way the Region Provider can fail: the OS refused the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MapError {
    OutOfMemory,
}

/// Virtual memory page size of the computer. This is usually 4096.
/// This value should be a constant, but we can't do that since we
/// don't know the value at compile time.
static mut PAGE_SIZE: usize = 0;

#[inline]
pub(crate) fn page_size() -> usize {
    unsafe {
        if PAGE_SIZE == 0 {
            PAGE_SIZE = Kernel::page_size();
        }

        PAGE_SIZE
    }
}

trait PlatformMemory {
    unsafe fn request_memory(len: usize) -> Result<NonNull<u8>, MapError>;

    unsafe fn return_memory(addr: *mut u8, len: usize);

    unsafe fn page_size() -> usize;
}

/// Region Provider: the only part of the allocator that talks to the
/// operating system. Everything above this module treats the address ranges
/// it returns as opaque, zeroed, page-aligned memory.
pub(crate) struct Kernel;

impl Kernel {
    /// Requests a region of at least `len` bytes from the OS. The returned
    /// region is page-aligned, zero-initialized, and readable/writable.
    #[inline]
    pub(crate) unsafe fn request_memory(len: usize) -> Result<NonNull<u8>, MapError> {
        unsafe { <Kernel as PlatformMemory>::request_memory(len) }
    }

    /// Releases a region previously obtained from [`Kernel::request_memory`].
    /// Not called by the allocator today — regions are retained until
    /// process exit — but kept so the provider's contract is independently
    /// testable and so a future return-to-OS policy has something to call.
    #[inline]
    #[allow(dead_code)]
    pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) {
        unsafe {
            <Kernel as PlatformMemory>::return_memory(addr, len);
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, MapError, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Result<NonNull<u8>, MapError> {
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => Err(MapError::OutOfMemory),
                    addr => Ok(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use crate::kernel::{Kernel, MapError, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Result<NonNull<u8>, MapError> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast()).ok_or(MapError::OutOfMemory)
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let size = page_size();
        assert!(size > 0);
        assert_eq!(size & (size - 1), 0);
    }

    #[test]
    fn request_and_return_memory_round_trip() {
        unsafe {
            let size = page_size();
            let region = Kernel::request_memory(size).expect("mmap/VirtualAlloc failed");

            // Freshly mapped memory must be zeroed and writable.
            let slice = std::slice::from_raw_parts_mut(region.as_ptr(), size);
            assert!(slice.iter().all(|&b| b == 0));
            slice[0] = 0xFF;
            assert_eq!(slice[0], 0xFF);

            Kernel::return_memory(region.as_ptr(), size);
        }
    }
}
