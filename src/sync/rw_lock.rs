// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-word atomic in-process read-write lock. High bit marks an
// exclusive/write lock, the remaining 31 bits count concurrent readers.
// Used to guard a map's generation pointer across the swap in
// `maps::Generation::install` (§4.10) — readers taking a cheap shared lock
// to dereference the current generation, the finalizer taking the
// exclusive lock only for the instant it swaps the pointer.

use std::sync::atomic::{AtomicU32, Ordering};

use super::spin_lock::adaptive_yield;

const W_MASK: u32 = i32::MAX as u32;
const W_FLAG: u32 = W_MASK + 1;

/// A single-word atomic read-write lock.
pub struct RwLock {
    lc: AtomicU32,
}

impl RwLock {
    pub const fn new() -> Self {
        Self {
            lc: AtomicU32::new(0),
        }
    }

    /// Acquire an exclusive (write) lock.
    pub fn lock(&self) {
        let mut k = 0u32;
        loop {
            let old = self.lc.fetch_or(W_FLAG, Ordering::AcqRel);
            if old == 0 {
                return;
            }
            if old & W_FLAG == 0 {
                break;
            }
            adaptive_yield(&mut k);
        }
        let mut k = 0u32;
        while self.lc.load(Ordering::Acquire) & W_MASK != 0 {
            adaptive_yield(&mut k);
        }
    }

    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }

    /// Acquire a shared (read) lock.
    pub fn lock_shared(&self) {
        let mut old = self.lc.load(Ordering::Acquire);
        let mut k = 0u32;
        loop {
            if old & W_FLAG != 0 {
                adaptive_yield(&mut k);
                old = self.lc.load(Ordering::Acquire);
            } else if self
                .lc
                .compare_exchange_weak(old, old + 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            } else {
                old = self.lc.load(Ordering::Acquire);
            }
        }
    }

    pub fn unlock_shared(&self) {
        self.lc.fetch_sub(1, Ordering::Release);
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}
