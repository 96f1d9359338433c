// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Portable cross-process mutex emulation for platforms/configurations where
// a native robust mutex isn't available (Windows, or POSIX with
// `robust_locks` disabled). Grounded in mem_pool.c's non-pthread
// `__mutex_spin` fallback: a lock word tagged with the owning process's pid,
// so a waiter whose owner has died (instead of merely released the lock)
// can detect that and steal it rather than spinning forever — the same
// crash-recovery guarantee `PTHREAD_MUTEX_ROBUST` gives natively. Backoff
// reuses the same adaptive spin/yield/sleep ladder as the in-process
// spin lock.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use super::spin_lock::adaptive_yield;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

#[repr(C)]
struct Word {
    state: AtomicU32,
    owner_pid: AtomicU32,
}

pub fn size() -> usize {
    std::mem::size_of::<Word>()
}

pub fn align() -> usize {
    std::mem::align_of::<Word>()
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // kill(pid, 0) only probes existence/permission, it sends no signal.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
fn pid_is_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, WAIT_TIMEOUT};
    use windows_sys::Win32::System::Threading::{
        OpenProcess, WaitForSingleObject, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    if pid == 0 {
        return false;
    }
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        let alive = WaitForSingleObject(handle, 0) == WAIT_TIMEOUT;
        CloseHandle(handle);
        alive
    }
}

fn current_pid() -> u32 {
    std::process::id()
}

/// # Safety
/// `ptr` must be valid and suitably aligned for `size()` bytes and must not
/// already hold an initialized lock word.
pub unsafe fn init_at(ptr: *mut u8) {
    let w = &*(ptr as *const Word);
    w.state.store(UNLOCKED, Ordering::Release);
    w.owner_pid.store(0, Ordering::Release);
}

/// Acquire the lock at `ptr`, recovering automatically if the previous
/// owner's process is no longer alive.
///
/// # Safety
/// `ptr` must point to a word initialized by [`init_at`].
pub unsafe fn lock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    let mut k = 0u32;
    loop {
        if w
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            w.owner_pid.store(current_pid(), Ordering::Release);
            return Ok(());
        }

        let owner = w.owner_pid.load(Ordering::Acquire);
        if owner != 0 && !pid_is_alive(owner) {
            // Owner died holding the lock — steal it, mirroring EOWNERDEAD recovery.
            if w
                .state
                .compare_exchange(LOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                w.owner_pid.store(current_pid(), Ordering::Release);
                return Ok(());
            }
        }

        adaptive_yield(&mut k);
    }
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`].
pub unsafe fn try_lock_at(ptr: *mut u8) -> io::Result<bool> {
    let w = &*(ptr as *const Word);
    if w
        .state
        .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
    {
        w.owner_pid.store(current_pid(), Ordering::Release);
        return Ok(true);
    }
    let owner = w.owner_pid.load(Ordering::Acquire);
    if owner != 0 && !pid_is_alive(owner) {
        w.owner_pid.store(current_pid(), Ordering::Release);
        return Ok(true);
    }
    Ok(false)
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`] currently held by
/// the calling process.
pub unsafe fn unlock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    w.owner_pid.store(0, Ordering::Release);
    w.state.store(UNLOCKED, Ordering::Release);
    Ok(())
}
