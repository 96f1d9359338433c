// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-process robust mutex facade (§4.5). Picks the native
// `PTHREAD_MUTEX_ROBUST` primitive when the `robust_locks` feature is
// enabled and the platform supports it (`platform::robust_mutex_available`),
// and falls back to the PID-liveness emulation in `portable_mutex`
// otherwise — the same choice `rspamd_mempool_get_mutex` makes between its
// `HAVE_PTHREAD_PROCESS_SHARED` and portable branches, except the decision
// here is also influenced by the `robust_locks` Cargo feature so callers can
// force the portable path for testing.
//
// The chosen backend is recorded as a leading tag byte so a mutex initialized
// by one process is unlocked correctly by any other process mapping the same
// memory, regardless of which branch `init_at` took.

use std::io;

const TAG_NATIVE: u8 = 0;
const TAG_PORTABLE: u8 = 1;

#[cfg(unix)]
fn native_available() -> bool {
    cfg!(feature = "robust_locks") && crate::platform::robust_mutex_available()
}

#[cfg(not(unix))]
fn native_available() -> bool {
    false
}

#[cfg(unix)]
fn native_size() -> usize {
    crate::platform::posix::mutex_size()
}

#[cfg(not(unix))]
fn native_size() -> usize {
    0
}

#[cfg(unix)]
fn native_align() -> usize {
    crate::platform::posix::mutex_align()
}

#[cfg(not(unix))]
fn native_align() -> usize {
    1
}

fn header_len() -> usize {
    payload_align().max(1)
}

fn payload_align() -> usize {
    native_align().max(super::portable_mutex::align())
}

fn payload_len() -> usize {
    native_size().max(super::portable_mutex::size())
}

/// Total storage a caller must reserve for one robust mutex.
pub fn size() -> usize {
    header_len() + payload_len()
}

/// Required alignment for that storage.
pub fn align() -> usize {
    payload_align()
}

unsafe fn tag_at(ptr: *mut u8) -> *mut u8 {
    ptr
}

unsafe fn payload_at(ptr: *mut u8) -> *mut u8 {
    ptr.add(header_len())
}

/// Initialize a robust mutex in place at `ptr`.
///
/// # Safety
/// `ptr` must be valid and aligned to [`align`] for [`size`] bytes, and must
/// not already hold an initialized mutex.
pub unsafe fn init_at(ptr: *mut u8) -> io::Result<()> {
    #[cfg(unix)]
    {
        if native_available() {
            *tag_at(ptr) = TAG_NATIVE;
            return crate::platform::posix::init_mutex_at(payload_at(ptr));
        }
    }
    *tag_at(ptr) = TAG_PORTABLE;
    super::portable_mutex::init_at(payload_at(ptr));
    Ok(())
}

/// # Safety
/// `ptr` must point to a mutex initialized by [`init_at`] that is currently
/// unlocked.
pub unsafe fn destroy_at(ptr: *mut u8) {
    #[cfg(unix)]
    {
        if *tag_at(ptr) == TAG_NATIVE {
            crate::platform::posix::destroy_mutex_at(payload_at(ptr));
            return;
        }
    }
    // Portable backend has no kernel resource to release.
}

/// # Safety
/// `ptr` must point to a mutex initialized by [`init_at`].
pub unsafe fn lock_at(ptr: *mut u8) -> io::Result<()> {
    #[cfg(unix)]
    {
        if *tag_at(ptr) == TAG_NATIVE {
            return crate::platform::posix::lock_mutex_at(payload_at(ptr));
        }
    }
    super::portable_mutex::lock_at(payload_at(ptr))
}

/// # Safety
/// `ptr` must point to a mutex initialized by [`init_at`] currently held by
/// the calling thread/process.
pub unsafe fn unlock_at(ptr: *mut u8) -> io::Result<()> {
    #[cfg(unix)]
    {
        if *tag_at(ptr) == TAG_NATIVE {
            return crate::platform::posix::unlock_mutex_at(payload_at(ptr));
        }
    }
    super::portable_mutex::unlock_at(payload_at(ptr))
}
