// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Platform collaborator (§6): page size, anonymous shared mmap, and the raw
// robust-mutex/rwlock primitives that back `sync::robust_mutex`.

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use posix::{anon_shared_map, page_size, robust_mutex_available, SharedMapping};

#[cfg(windows)]
pub use windows::{anon_shared_map, page_size, robust_mutex_available, SharedMapping};
