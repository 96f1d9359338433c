// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows platform collaborator. Windows has no unnamed equivalent of
// `mmap(MAP_ANON|MAP_SHARED)`, so `anon_shared_map` backs onto an unnamed
// `CreateFileMappingW` (pagefile-backed) section instead — still invisible
// to any process that doesn't inherit the handle, which is the anonymity
// property the pool relies on.
//
// Windows also has no `PTHREAD_MUTEX_ROBUST` equivalent; `WAIT_ABANDONED`
// from `WaitForSingleObject` gives the same "previous owner died while
// holding the lock" signal that `EOWNERDEAD` gives on POSIX, so the portable
// lock built on `sync::portable_mutex` is used here instead of a native
// primitive (see DESIGN.md).

use std::io;
use std::ptr;

/// Page / allocation granularity on Windows. Slab requests round up to this
/// the same way the POSIX side rounds to `getpagesize()`.
pub fn page_size() -> usize {
    use windows_sys::Win32::System::SystemInformation::GetSystemInfo;

    let mut info = unsafe { std::mem::zeroed() };
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}

/// Windows has no native robust-mutex primitive; callers fall back to the
/// portable PID-liveness emulation regardless of this return value.
pub fn robust_mutex_available() -> bool {
    false
}

// ---------------------------------------------------------------------------
// Anonymous shared memory — backs Pool's SHARED slab class.
// ---------------------------------------------------------------------------

pub struct SharedMapping {
    handle: windows_sys::Win32::Foundation::HANDLE,
    mem: *mut u8,
    size: usize,
}

unsafe impl Send for SharedMapping {}
unsafe impl Sync for SharedMapping {}

impl SharedMapping {
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Memory::UnmapViewOfFile;

        if !self.mem.is_null() {
            unsafe { UnmapViewOfFile(self.mem as *const _) };
        }
        if self.handle != 0 {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

/// Map `size` bytes of anonymous, inheritable shared memory via an unnamed,
/// pagefile-backed file mapping.
pub fn anon_shared_map(size: usize) -> io::Result<SharedMapping> {
    use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
    use windows_sys::Win32::System::Memory::*;

    if size == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
    }

    let handle = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            ptr::null(),
            PAGE_READWRITE | SEC_COMMIT,
            0,
            size as u32,
            ptr::null(),
        )
    };
    if handle == 0 {
        return Err(io::Error::last_os_error());
    }

    let mem = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size) };
    if mem.is_null() {
        let e = io::Error::last_os_error();
        unsafe { windows_sys::Win32::Foundation::CloseHandle(handle) };
        return Err(e);
    }

    Ok(SharedMapping {
        handle,
        mem: mem as *mut u8,
        size,
    })
}

// ---------------------------------------------------------------------------
// Mutex / rwlock sizing stubs — real synchronization happens through
// `sync::portable_mutex` / `sync::portable_rwlock` on this platform, but the
// sizing API stays uniform across platforms so `pool::slab` need not
// branch on target OS when reserving header space.
// ---------------------------------------------------------------------------

pub fn mutex_size() -> usize {
    std::mem::size_of::<u32>()
}

pub fn mutex_align() -> usize {
    std::mem::align_of::<u32>()
}

pub fn rwlock_size() -> usize {
    std::mem::size_of::<u32>()
}

pub fn rwlock_align() -> usize {
    std::mem::align_of::<u32>()
}
