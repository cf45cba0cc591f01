use lazy_static::lazy_static;

use crate::heap::Address;
use crate::mem;

lazy_static! {
    static ref OS_PAGE_SIZE: usize = determine_page_size();
}

pub fn page_size() -> usize {
    *OS_PAGE_SIZE
}

#[cfg(target_family = "unix")]
fn determine_page_size() -> usize {
    let val = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if val <= 0 {
        panic!("could not determine page size.");
    }

    val as usize
}

#[cfg(target_family = "windows")]
fn determine_page_size() -> usize {
    use std::mem::MaybeUninit;
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    unsafe {
        let mut system_info: MaybeUninit<SYSTEM_INFO> = MaybeUninit::uninit();
        GetSystemInfo(system_info.as_mut_ptr());

        system_info.assume_init().dwPageSize as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum MemoryPermission {
    None,
    Read,
    ReadWrite,
}

/// A reserved but initially inaccessible range of address space. The
/// range is released when the reservation is dropped.
pub struct Reservation {
    start: Address,

    unaligned_start: Address,
    unaligned_size: usize,
}

impl Reservation {
    pub fn start(&self) -> Address {
        self.start
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        free(self.unaligned_start, self.unaligned_size);
    }
}

pub fn reserve_align(size: usize, align: usize) -> Reservation {
    debug_assert!(mem::is_os_page_aligned(size));
    debug_assert!(mem::is_os_page_aligned(align));
    debug_assert!(align == 0 || mem::is_power_of_2(align));

    let align = if align == 0 { page_size() } else { align };
    let unaligned_size = size + align - page_size();

    let unaligned_start = reserve(unaligned_size);
    let aligned_start: Address = mem::align_usize_up(unaligned_start.to_usize(), align).into();

    let gap_start = aligned_start.offset_from(unaligned_start);
    let gap_end = unaligned_size - size - gap_start;

    if cfg!(target_family = "unix") {
        // Trim the alignment gaps so only the aligned range stays mapped.
        if gap_start > 0 {
            free(unaligned_start, gap_start);
        }

        if gap_end > 0 {
            free(aligned_start.offset(size), gap_end);
        }

        Reservation {
            start: aligned_start,
            unaligned_start: aligned_start,
            unaligned_size: size,
        }
    } else {
        // Windows cannot partially release a reservation.
        Reservation {
            start: aligned_start,
            unaligned_start,
            unaligned_size,
        }
    }
}

#[cfg(target_family = "unix")]
fn reserve(size: usize) -> Address {
    debug_assert!(mem::is_os_page_aligned(size));

    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        panic!("reserving memory with mmap() failed");
    }

    Address::from_ptr(ptr)
}

#[cfg(target_family = "windows")]
fn reserve(size: usize) -> Address {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_RESERVE, PAGE_NOACCESS};

    debug_assert!(mem::is_os_page_aligned(size));

    let ptr = unsafe { VirtualAlloc(std::ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };

    if ptr.is_null() {
        panic!("VirtualAlloc failed");
    }

    Address::from_ptr(ptr)
}

#[cfg(target_family = "unix")]
pub fn free(ptr: Address, size: usize) {
    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let result = unsafe { libc::munmap(ptr.to_mut_ptr(), size) };

    if result != 0 {
        panic!("munmap() failed");
    }
}

#[cfg(target_family = "windows")]
pub fn free(ptr: Address, size: usize) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};

    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let result = unsafe { VirtualFree(ptr.to_mut_ptr(), 0, MEM_RELEASE) };

    if result == 0 {
        panic!("VirtualFree failed");
    }
}

#[cfg(target_family = "unix")]
pub fn commit_at(ptr: Address, size: usize, permission: MemoryPermission) {
    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let protection = match permission {
        MemoryPermission::None => libc::PROT_NONE,
        MemoryPermission::Read => libc::PROT_READ,
        MemoryPermission::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    };

    let val = unsafe {
        libc::mmap(
            ptr.to_mut_ptr(),
            size,
            protection,
            libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_FIXED,
            -1,
            0,
        )
    };

    if val == libc::MAP_FAILED {
        panic!("committing memory with mmap() failed");
    }
}

#[cfg(target_family = "windows")]
pub fn commit_at(ptr: Address, size: usize, permission: MemoryPermission) {
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, MEM_COMMIT, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
    };

    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let protection = match permission {
        MemoryPermission::None => PAGE_NOACCESS,
        MemoryPermission::Read => PAGE_READONLY,
        MemoryPermission::ReadWrite => PAGE_READWRITE,
    };

    let result = unsafe { VirtualAlloc(ptr.to_ptr(), size, MEM_COMMIT, protection) };

    if result != ptr.to_mut_ptr() {
        panic!("VirtualAlloc failed");
    }
}

#[cfg(target_family = "unix")]
pub fn discard(ptr: Address, size: usize) {
    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let res = unsafe { libc::madvise(ptr.to_mut_ptr(), size, libc::MADV_DONTNEED) };

    if res != 0 {
        panic!("discarding memory with madvise() failed");
    }

    let res = unsafe { libc::mprotect(ptr.to_mut_ptr(), size, libc::PROT_NONE) };

    if res != 0 {
        panic!("discarding memory with mprotect() failed");
    }
}

#[cfg(target_family = "windows")]
pub fn discard(ptr: Address, size: usize) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_DECOMMIT};

    debug_assert!(ptr.is_os_page_aligned());
    debug_assert!(mem::is_os_page_aligned(size));

    let result = unsafe { VirtualFree(ptr.to_mut_ptr(), size, MEM_DECOMMIT) };

    if result == 0 {
        panic!("VirtualFree failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_aligned_range() {
        let align = 1 << 20;
        let reservation = reserve_align(align, align);
        assert_eq!(0, reservation.start().to_usize() & (align - 1));
    }

    #[test]
    fn commit_write_discard() {
        let size = 1 << 20;
        let reservation = reserve_align(size, size);
        let start = reservation.start();

        commit_at(start, size, MemoryPermission::ReadWrite);

        unsafe {
            *start.to_mut_ptr::<usize>() = 4711;
            assert_eq!(4711, *start.to_ptr::<usize>());
        }

        discard(start, size);
    }
}
