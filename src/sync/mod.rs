// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Synchronization primitives (§4.5, §5): in-process spin/rw locks for
// internal bookkeeping, and cross-process robust mutex/rwlock built on top
// of `platform`'s raw primitives with a PID-liveness-checked portable
// fallback.

pub mod spin_lock;
pub mod rw_lock;

pub mod portable_mutex;
pub mod portable_rwlock;

pub mod robust_mutex;
pub mod robust_rwlock;

pub use rw_lock::RwLock;
pub use spin_lock::SpinLock;
