// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Self-tuning slab sizing (§4.2). Each entry-point row tracks a ring of 64
// `{fragmentation, leftover}` observations for one call site (here, a
// pool's tag plus the slab class it's allocating into). Fragmentation
// accumulates into the current ring slot every time a slab rolls over;
// leftover is recorded once, at pool teardown, from the departing head of
// the `Normal` chain, which also advances the ring cursor. When the cursor
// wraps back to zero, `rspamd_mempool_adjust_entry`'s algorithm runs: sort
// the per-slot net waste, read off a stochastic quantile pair, and grow or
// shrink the suggestion by a factor of 1.5.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use rand::RngCore;

use crate::sync::SpinLock;

/// `ENTRY_NELTS` in `mem_pool.c` — fixed, not configurable.
const ENTRY_NELTS: usize = 64;

/// Fixed suggestion bounds (§3.3 invariant, §4.2 step 7). Independent of
/// any pool's own `initial_slab_size`.
const MIN_SUGGESTION: f64 = 1024.0;
const MAX_SUGGESTION: f64 = 1024.0 * 1024.0 * 10.0;

#[derive(Clone, Copy, Default)]
struct EntryElt {
    fragmentation: i64,
    leftover: i64,
}

/// Per-call-site entry point (§3.3): a suggestion plus the ring of raw
/// observations that feeds its periodic adjustment.
pub struct EntryPoint {
    cur_suggestion: f64,
    elts: [EntryElt; ENTRY_NELTS],
    cur_elts: usize,
    hits: u64,
}

impl EntryPoint {
    fn new(initial_suggestion: usize) -> Self {
        Self {
            cur_suggestion: (initial_suggestion as f64).clamp(MIN_SUGGESTION, MAX_SUGGESTION),
            elts: [EntryElt::default(); ENTRY_NELTS],
            cur_elts: 0,
            hits: 0,
        }
    }

    /// Current suggested slab size for this call site, always within
    /// `[1 KiB, 10 MiB]`.
    pub fn suggested_size(&self) -> usize {
        self.cur_suggestion.clamp(MIN_SUGGESTION, MAX_SUGGESTION).round() as usize
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Accumulate `bytes` of fragmentation (the departing head's leftover
    /// bytes) into the current ring slot. Called on every fresh-slab event.
    fn record_fragmentation(&mut self, bytes: usize) {
        self.hits += 1;
        self.elts[self.cur_elts].fragmentation += bytes as i64;
    }

    /// Record `leftover` bytes in the current ring slot and advance the
    /// cursor, adjusting the suggestion when the ring wraps. Called once
    /// per pool lifetime, at teardown.
    fn record_leftover_and_advance(&mut self, leftover: usize) {
        self.elts[self.cur_elts].leftover += leftover as i64;
        self.cur_elts = (self.cur_elts + 1) % ENTRY_NELTS;
        if self.cur_elts == 0 {
            self.adjust();
        }
    }

    /// `rspamd_mempool_adjust_entry`: sort the ring's net waste
    /// (`fragmentation - leftover`) and nudge the suggestion by a
    /// stochastic quantile pair, then reset the ring.
    fn adjust(&mut self) {
        let mut sz = [0i64; ENTRY_NELTS];
        for (i, e) in self.elts.iter().enumerate() {
            sz[i] = e.fragmentation - e.leftover;
        }
        sz.sort_unstable();

        let jitter = (rand::thread_rng().next_u32() % 10) as usize;
        let pos = sz[50 + jitter] as f64;
        let neg = sz[4 + jitter] as f64;

        if neg > 0.0 {
            // Fragmentation outweighs leftovers even at the low quantile:
            // slabs are too small.
            self.cur_suggestion *= 1.5 * (1.0 + pos / self.cur_suggestion);
        } else if -neg > pos {
            // Leftovers dominate: slabs are too large.
            self.cur_suggestion /= 1.5 * (1.0 + (-neg) / self.cur_suggestion);
        } else {
            self.cur_suggestion *= 1.5 * (1.0 + pos / self.cur_suggestion);
        }

        self.cur_suggestion = self.cur_suggestion.clamp(MIN_SUGGESTION, MAX_SUGGESTION);
        self.elts = [EntryElt::default(); ENTRY_NELTS];
    }
}

struct GlobalTable {
    lock: SpinLock,
    entries: std::cell::UnsafeCell<HashMap<String, EntryPoint>>,
}

// SAFETY: every access to `entries` happens while `lock` is held.
unsafe impl Sync for GlobalTable {}

impl GlobalTable {
    fn with_entry<R>(&self, key: &str, initial_suggestion: usize, f: impl FnOnce(&mut EntryPoint) -> R) -> R {
        self.lock.lock();
        let map = unsafe { &mut *self.entries.get() };
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| EntryPoint::new(initial_suggestion));
        let result = f(entry);
        self.lock.unlock();
        result
    }
}

fn table() -> &'static GlobalTable {
    static TABLE: OnceLock<GlobalTable> = OnceLock::new();
    TABLE.get_or_init(|| GlobalTable {
        lock: SpinLock::new(),
        entries: std::cell::UnsafeCell::new(HashMap::new()),
    })
}

/// Handle onto the process-global entry-point table (§3.3 — "process-global,
/// keyed by a source-code location string"); each [`crate::pool::Pool`]
/// holds one of these, keying into rows shared with every other pool that
/// allocates under the same tag.
pub struct StatsRegistry {
    initial_suggestion: usize,
}

impl StatsRegistry {
    pub fn new(initial_suggestion: usize) -> Self {
        Self { initial_suggestion }
    }

    pub fn suggested_size(&self, key: &str) -> usize {
        table().with_entry(key, self.initial_suggestion, |e| e.suggested_size())
    }

    /// Feed a fresh-slab fragmentation observation into `key`'s row.
    pub fn record_fragmentation(&self, key: &str, bytes: usize) {
        if bytes == 0 {
            return;
        }
        table().with_entry(key, self.initial_suggestion, |e| e.record_fragmentation(bytes));
    }

    /// Feed a pool-teardown leftover observation into `key`'s row,
    /// advancing its ring cursor and adjusting the suggestion on wrap.
    pub fn record_leftover(&self, key: &str, leftover: usize) {
        table().with_entry(key, self.initial_suggestion, |e| e.record_leftover_and_advance(leftover));
    }

    pub fn hits(&self, key: &str) -> u64 {
        table().with_entry(key, self.initial_suggestion, |e| e.hits())
    }
}

/// Process-wide allocation totals, kept separate from any entry-point row —
/// every `Pool` in the process folds its lifetime byte count in here,
/// mirroring a counter rspamd keeps outside any individual
/// `rspamd_mempool_t` for whole-process memory accounting.
#[derive(Debug, Default)]
pub struct GlobalStats {
    pools_created: AtomicU64,
    bytes_allocated: AtomicU64,
    slabs_allocated: AtomicU64,
}

impl GlobalStats {
    fn get() -> &'static GlobalStats {
        static STATS: OnceLock<GlobalStats> = OnceLock::new();
        STATS.get_or_init(GlobalStats::default)
    }

    pub fn pool_created() {
        Self::get().pools_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slab_allocated(bytes: usize) {
        let s = Self::get();
        s.slabs_allocated.fetch_add(1, Ordering::Relaxed);
        s.bytes_allocated.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot() -> GlobalStatsSnapshot {
        let s = Self::get();
        GlobalStatsSnapshot {
            pools_created: s.pools_created.load(Ordering::Relaxed),
            bytes_allocated: s.bytes_allocated.load(Ordering::Relaxed),
            slabs_allocated: s.slabs_allocated.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalStatsSnapshot {
    pub pools_created: u64,
    pub bytes_allocated: u64,
    pub slabs_allocated: u64,
}
