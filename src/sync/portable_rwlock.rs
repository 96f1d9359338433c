// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Portable cross-process rwlock emulation, the read-write counterpart of
// `portable_mutex`. Grounded in mem_pool.c's `rspamd_mempool_rlock_rwlock` /
// `wlock_rwlock` portable fallback: readers just bump a count, a writer
// claims the high bit and records its pid so a waiter can detect and steal
// from a writer whose process has died.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use super::spin_lock::adaptive_yield;

const W_MASK: u32 = i32::MAX as u32;
const W_FLAG: u32 = W_MASK + 1;

#[repr(C)]
struct Word {
    lc: AtomicU32,
    writer_pid: AtomicU32,
}

pub fn size() -> usize {
    std::mem::size_of::<Word>()
}

pub fn align() -> usize {
    std::mem::align_of::<Word>()
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    pid != 0 && unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
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
/// `ptr` must be valid for `size()` bytes and hold no initialized lock.
pub unsafe fn init_at(ptr: *mut u8) {
    let w = &*(ptr as *const Word);
    w.lc.store(0, Ordering::Release);
    w.writer_pid.store(0, Ordering::Release);
}

fn steal_if_writer_dead(w: &Word) -> bool {
    let old = w.lc.load(Ordering::Acquire);
    if old & W_FLAG == 0 {
        return false;
    }
    let owner = w.writer_pid.load(Ordering::Acquire);
    if owner != 0 && !pid_is_alive(owner) {
        w.lc.store(0, Ordering::Release);
        w.writer_pid.store(0, Ordering::Release);
        return true;
    }
    false
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`].
pub unsafe fn read_lock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    let mut k = 0u32;
    loop {
        steal_if_writer_dead(w);
        let old = w.lc.load(Ordering::Acquire);
        if old & W_FLAG != 0 {
            adaptive_yield(&mut k);
            continue;
        }
        if w
            .lc
            .compare_exchange_weak(old, old + 1, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return Ok(());
        }
        adaptive_yield(&mut k);
    }
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`] currently held for
/// read by the calling process.
pub unsafe fn read_unlock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    w.lc.fetch_sub(1, Ordering::Release);
    Ok(())
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`].
pub unsafe fn write_lock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    let mut k = 0u32;
    loop {
        steal_if_writer_dead(w);
        let old = w.lc.fetch_or(W_FLAG, Ordering::AcqRel);
        if old == 0 {
            w.writer_pid.store(current_pid(), Ordering::Release);
            return Ok(());
        }
        if old & W_FLAG == 0 {
            // Readers were present but no other writer; we now hold W_FLAG,
            // wait for the readers to drain.
            let mut k2 = 0u32;
            while w.lc.load(Ordering::Acquire) & W_MASK != 0 {
                adaptive_yield(&mut k2);
            }
            w.writer_pid.store(current_pid(), Ordering::Release);
            return Ok(());
        }
        adaptive_yield(&mut k);
    }
}

/// # Safety
/// `ptr` must point to a word initialized by [`init_at`] currently held for
/// write by the calling process.
pub unsafe fn write_unlock_at(ptr: *mut u8) -> io::Result<()> {
    let w = &*(ptr as *const Word);
    w.writer_pid.store(0, Ordering::Release);
    w.lc.store(0, Ordering::Release);
    Ok(())
}
