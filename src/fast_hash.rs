// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fast, non-cryptographic hash used to fingerprint map index contents
// (§3.7, §4.9) so a generation swap can cheaply detect whether a freshly
// parsed map actually differs from the one it's replacing. Seeded once per
// process (mirroring rspamd's `rspamd_cryptobox_fast_hash` seeded with
// `rspamd_hash_seed()`) so fingerprints from distinct processes cannot be
// trivially collided by an adversary feeding crafted map contents.

use std::sync::OnceLock;

use rand::RngCore;

fn process_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| rand::thread_rng().next_u64())
}

/// Unseeded FNV-1a 64-bit hash, exposed for callers that need a stable,
/// reproducible digest (e.g. golden-file tests).
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Process-seeded fast hash: FNV-1a over the process seed followed by
/// `data`. Two processes hashing identical bytes get different digests,
/// which is the point — map fingerprints are compared only within a single
/// process's lifetime, never across machines or restarts.
pub fn seeded_hash(data: &[u8]) -> u64 {
    let seed = process_seed();
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in seed.to_le_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// A rolling fingerprint accumulator: map insertion helpers fold each
/// inserted key/value pair's hash into this state (mirrors
/// `rspamd_cryptobox_fast_hash_update` being threaded through
/// `rspamd_map_helper_insert_*`), producing a single fingerprint for the
/// whole index without re-hashing all entries at finalize time.
#[derive(Debug, Default, Clone, Copy)]
pub struct RollingFingerprint {
    state: u64,
}

impl RollingFingerprint {
    pub fn new() -> Self {
        Self {
            state: process_seed(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut hash = self.state;
        for &b in data {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        self.state = hash;
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}
