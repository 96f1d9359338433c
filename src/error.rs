// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error handling (§7). Rspamd's C allocator treats OOM as fatal (`g_error`
// + `abort()`) — `pool::slab` keeps that behavior directly rather than
// surfacing it through this enum. `PoolError` covers the *soft* failures
// §7 calls out: a lock primitive the OS refused to hand back, and a
// validation failure a caller can recover from. No-op conditions (looking
// up a destructor that was never registered, matching against an empty
// map) are modeled as `Option`/`bool` returns, not errors, per §7.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("lock primitive failed: {0}")]
    Lock(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("key-value list is malformed: {0}")]
    Parse(String),

    #[error("pattern compilation failed: {0}")]
    PatternCompile(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;
