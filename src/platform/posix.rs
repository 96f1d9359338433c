// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX platform collaborator: anonymous shared memory (backing the pool's
// SHARED slab class, mem_pool.c's `RSPAMD_MEMPOOL_SHARED` mmap branch) and
// the raw `pthread_mutex_t` / `pthread_rwlock_t` sequence used by
// `sync::robust_mutex` / `sync::robust_rwlock`.
//
// The robust-attribute sequence below initializes in place inside memory
// the caller already owns (a pool allocation) rather than a separately
// `shm_open`'d segment, since a pool's lock is torn down as an ordinary
// destructor alongside the slab it lives in.

use std::io;
use std::ptr;

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

/// Page size of the running process; slab requests round up to this the way
/// `rspamd_mempool_chain_new` rounds to `getpagesize()`.
pub fn page_size() -> usize {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 {
        4096
    } else {
        sz as usize
    }
}

/// Whether `PTHREAD_MUTEX_ROBUST` is available. macOS has no robust mutex
/// support; every other POSIX target here does.
pub fn robust_mutex_available() -> bool {
    cfg!(not(target_os = "macos"))
}

// ---------------------------------------------------------------------------
// Anonymous shared memory — backs Pool's SHARED slab class.
// ---------------------------------------------------------------------------

/// An anonymous `MAP_SHARED` mapping, inherited across `fork()`. Unlike the
/// named segments rspamd's workers also support, this has no name to
/// `shm_open` by: the mapping is reachable only through descendants of the
/// process that created it, which matches how a pool's SHARED slabs are
/// handed to forked filter workers.
pub struct SharedMapping {
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
        if !self.mem.is_null() {
            unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        }
    }
}

/// Map `size` bytes of anonymous, process-shared memory.
pub fn anon_shared_map(size: usize) -> io::Result<SharedMapping> {
    if size == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
    }

    let mem = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_ANON | libc::MAP_SHARED,
            -1,
            0,
        )
    };

    if mem == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(SharedMapping {
        mem: mem as *mut u8,
        size,
    })
}

// ---------------------------------------------------------------------------
// Robust pthread mutex — initialized in place on caller-owned memory.
// ---------------------------------------------------------------------------

pub fn mutex_size() -> usize {
    std::mem::size_of::<libc::pthread_mutex_t>()
}

pub fn mutex_align() -> usize {
    std::mem::align_of::<libc::pthread_mutex_t>()
}

/// Initialize a `pthread_mutex_t` in place at `ptr`, process-shared and
/// (where supported) robust.
///
/// # Safety
/// `ptr` must be valid and suitably aligned for `mutex_size()` bytes and must
/// not already hold an initialized mutex. The caller owns the memory for the
/// mutex's lifetime and must call [`destroy_mutex_at`] exactly once before
/// releasing it.
pub unsafe fn init_mutex_at(ptr: *mut u8) -> io::Result<()> {
    let mtx = ptr as *mut libc::pthread_mutex_t;
    ptr::write_bytes(mtx, 0, 1);

    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
    let mut eno = libc::pthread_mutexattr_init(&mut attr);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }

    eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if eno != 0 {
        libc::pthread_mutexattr_destroy(&mut attr);
        return Err(io::Error::from_raw_os_error(eno));
    }

    #[cfg(not(target_os = "macos"))]
    {
        eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
        if eno != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(io::Error::from_raw_os_error(eno));
        }
    }

    eno = libc::pthread_mutex_init(mtx, &attr);
    libc::pthread_mutexattr_destroy(&mut attr);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }

    Ok(())
}

/// # Safety
/// `ptr` must point to a mutex previously initialized by [`init_mutex_at`]
/// that is currently unlocked and has no other waiters.
pub unsafe fn destroy_mutex_at(ptr: *mut u8) {
    libc::pthread_mutex_destroy(ptr as *mut libc::pthread_mutex_t);
}

/// Lock the mutex at `ptr`, transparently recovering from `EOWNERDEAD` (a
/// previous holder died while holding the lock) by calling
/// `pthread_mutex_consistent`, the same recovery `rspamd_mempool_lock_mutex`
/// performs for the pthread-backed path.
///
/// # Safety
/// `ptr` must point to a mutex initialized by [`init_mutex_at`].
pub unsafe fn lock_mutex_at(ptr: *mut u8) -> io::Result<()> {
    let mtx = ptr as *mut libc::pthread_mutex_t;
    let eno = libc::pthread_mutex_lock(mtx);
    match eno {
        0 => Ok(()),
        #[cfg(not(target_os = "macos"))]
        EOWNERDEAD => {
            let eno2 = pthread_mutex_consistent(mtx);
            if eno2 != 0 {
                return Err(io::Error::from_raw_os_error(eno2));
            }
            Ok(())
        }
        _ => Err(io::Error::from_raw_os_error(eno)),
    }
}

/// # Safety
/// `ptr` must point to a mutex initialized by [`init_mutex_at`] currently
/// held by the calling thread.
pub unsafe fn unlock_mutex_at(ptr: *mut u8) -> io::Result<()> {
    let eno = libc::pthread_mutex_unlock(ptr as *mut libc::pthread_mutex_t);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Robust pthread rwlock — same in-place-initialization shape as the mutex.
// ---------------------------------------------------------------------------

pub fn rwlock_size() -> usize {
    std::mem::size_of::<libc::pthread_rwlock_t>()
}

pub fn rwlock_align() -> usize {
    std::mem::align_of::<libc::pthread_rwlock_t>()
}

/// # Safety
/// See [`init_mutex_at`]; same contract for `pthread_rwlock_t`.
pub unsafe fn init_rwlock_at(ptr: *mut u8) -> io::Result<()> {
    let lock = ptr as *mut libc::pthread_rwlock_t;
    ptr::write_bytes(lock, 0, 1);

    let mut attr: libc::pthread_rwlockattr_t = std::mem::zeroed();
    let mut eno = libc::pthread_rwlockattr_init(&mut attr);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }

    eno = libc::pthread_rwlockattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if eno != 0 {
        libc::pthread_rwlockattr_destroy(&mut attr);
        return Err(io::Error::from_raw_os_error(eno));
    }

    eno = libc::pthread_rwlock_init(lock, &attr);
    libc::pthread_rwlockattr_destroy(&mut attr);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }

    Ok(())
}

/// # Safety
/// See [`destroy_mutex_at`]; same contract for `pthread_rwlock_t`.
pub unsafe fn destroy_rwlock_at(ptr: *mut u8) {
    libc::pthread_rwlock_destroy(ptr as *mut libc::pthread_rwlock_t);
}

/// # Safety
/// `ptr` must point to an rwlock initialized by [`init_rwlock_at`].
pub unsafe fn read_lock_rwlock_at(ptr: *mut u8) -> io::Result<()> {
    let eno = libc::pthread_rwlock_rdlock(ptr as *mut libc::pthread_rwlock_t);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }
    Ok(())
}

/// # Safety
/// `ptr` must point to an rwlock initialized by [`init_rwlock_at`].
pub unsafe fn write_lock_rwlock_at(ptr: *mut u8) -> io::Result<()> {
    let eno = libc::pthread_rwlock_wrlock(ptr as *mut libc::pthread_rwlock_t);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }
    Ok(())
}

/// # Safety
/// `ptr` must point to an rwlock initialized by [`init_rwlock_at`] currently
/// held (read or write) by the calling thread.
pub unsafe fn unlock_rwlock_at(ptr: *mut u8) -> io::Result<()> {
    let eno = libc::pthread_rwlock_unlock(ptr as *mut libc::pthread_rwlock_t);
    if eno != 0 {
        return Err(io::Error::from_raw_os_error(eno));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_shared_map_zero_size_errors() {
        assert!(anon_shared_map(0).is_err());
    }

    #[test]
    fn anon_shared_map_roundtrip() {
        let mapping = anon_shared_map(page_size()).unwrap();
        assert_eq!(mapping.len(), page_size());
        unsafe {
            *mapping.as_mut_ptr() = 0x42;
            assert_eq!(*mapping.as_mut_ptr(), 0x42);
        }
    }

    #[test]
    fn mutex_lock_unlock_roundtrip() {
        let mut buf = vec![0u8; mutex_size()];
        unsafe {
            init_mutex_at(buf.as_mut_ptr()).unwrap();
            lock_mutex_at(buf.as_mut_ptr()).unwrap();
            unlock_mutex_at(buf.as_mut_ptr()).unwrap();
            destroy_mutex_at(buf.as_mut_ptr());
        }
    }

    #[test]
    fn rwlock_read_write_roundtrip() {
        let mut buf = vec![0u8; rwlock_size()];
        unsafe {
            init_rwlock_at(buf.as_mut_ptr()).unwrap();
            read_lock_rwlock_at(buf.as_mut_ptr()).unwrap();
            unlock_rwlock_at(buf.as_mut_ptr()).unwrap();
            write_lock_rwlock_at(buf.as_mut_ptr()).unwrap();
            unlock_rwlock_at(buf.as_mut_ptr()).unwrap();
            destroy_rwlock_at(buf.as_mut_ptr());
        }
    }
}
