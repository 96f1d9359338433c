// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// In-process spin lock with adaptive backoff: busy-spin, then a CPU pause
// hint, then a thread yield, then a 1ms sleep. Used wherever the pool needs
// a short in-process critical section (e.g. around `StatsRegistry` updates)
// rather than a robust, cross-process lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// Adaptive backoff: k < 4 busy-spins, k < 16 issues a pause hint,
/// k < 32 yields the thread, otherwise sleeps 1ms.
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// A simple spin lock with adaptive backoff.
pub struct SpinLock {
    lc: AtomicU32,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            lc: AtomicU32::new(0),
        }
    }

    pub fn lock(&self) {
        let mut k = 0u32;
        while self.lc.swap(1, Ordering::Acquire) != 0 {
            adaptive_yield(&mut k);
        }
    }

    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}
