// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed configuration shapes (§4.1, §4.9). Mirrors how rspamd's config
// parser hands `mem_pool.c`/`map_helpers.c` a handful of tunables rather
// than those modules reading files themselves — this crate never performs
// file I/O internally; callers deserialize a `PoolConfig`/`RegexMapConfig`
// from wherever their own configuration lives (a TOML file, a CLI flag, a
// hardcoded default) and hand the struct to `Pool::new` / `RegexMapIndex::new`.

use serde::Deserialize;

use crate::error::{PoolError, Result};

/// Tunables for a [`crate::pool::Pool`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Starting slab-size suggestion for a call site seen for the first
    /// time, before any self-tuning history exists. rspamd seeds this from
    /// the page size; this crate lets callers override it. The suggestion
    /// this seeds is still clamped to the fixed `[1 KiB, 10 MiB]` range
    /// every subsequent adjustment enforces (§3.3, §4.2) — this field does
    /// not raise or lower that ceiling.
    pub initial_slab_size: usize,
    /// Route every allocation through the system allocator and a trash
    /// stack instead of the slab chain. Overridable at runtime; the
    /// `always_malloc` Cargo feature only changes the compiled-in default.
    pub always_malloc: bool,
    /// Human-readable tag used in log messages and as part of each slab
    /// class's entry-point key, mirroring the `tag` field rspamd attaches
    /// to each pool for diagnostics.
    pub tag: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_slab_size: 4096,
            always_malloc: cfg!(feature = "always_malloc"),
            tag: String::from("pool"),
        }
    }
}

impl PoolConfig {
    /// Parse a `PoolConfig` from a TOML document already read into memory.
    /// Does not touch the filesystem itself — see module docs.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| PoolError::Config(e.to_string()))
    }
}

/// Tunables for a [`crate::maps::regex_map::RegexMapIndex`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegexMapConfig {
    /// Case-insensitive matching for every pattern in the map.
    pub case_insensitive: bool,
    /// Allow `.` to match newlines (PCRE `DOTALL`).
    pub dot_matches_new_line: bool,
    /// Reject subjects that aren't valid UTF-8 instead of matching byte
    /// ranges that happen to straddle multi-byte sequences. See §9's note
    /// on the UTF-8 validation guard carried over from
    /// `rspamd_match_regexp_map_single`.
    pub utf8_strict: bool,
    /// Build a `RegexSet`-backed multi-pattern index alongside per-pattern
    /// regexes, so `match_all` can short-circuit on patterns that can't
    /// possibly match before running the full per-pattern scan. This is the
    /// `regex` crate's stand-in for rspamd's optional hyperscan database
    /// (see DESIGN.md for the substitution rationale).
    pub multi_pattern: bool,
}

impl Default for RegexMapConfig {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            dot_matches_new_line: false,
            utf8_strict: true,
            multi_pattern: true,
        }
    }
}
