// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region-based memory allocator with self-tuning slab sizing, robust
// cross-process locks, and a match-map engine (hash/radix/regex lookups
// fed by a resumable key/value-list parser) layered on top.

pub mod config;
pub mod error;
pub mod fast_hash;
pub mod kv_parser;
pub mod maps;
mod platform;
pub mod pool;
pub mod sync;

pub use config::{PoolConfig, RegexMapConfig};
pub use error::{PoolError, Result};
pub use kv_parser::Parser as KvParser;
pub use pool::Pool;
