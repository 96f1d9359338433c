// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Regex-list index (§3.7, §4.9). Parallel `Vec<Regex>`/`Vec<Record>` plus
// an optional `RegexSet` built once at `finalize()` — this crate's
// natural analogue of the original's block-mode multi-pattern scan:
// "does any pattern match, and which ids" in one pass over the haystack,
// instead of one `Regex::is_match` per pattern. There is no SIMD capability
// probe at the `regex` crate's level, so the finalize gate collapses to
// "build the set iff there is at least one pattern" (recorded as a
// REDESIGN-FLAG substitution in the design ledger, not a silent omission).

use std::borrow::Cow;
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::{Regex, RegexBuilder, RegexSet};

use crate::config::RegexMapConfig;
use crate::fast_hash::RollingFingerprint;
use crate::maps::glob::glob_to_regex;
use crate::pool::Pool;

/// Per-map behavior flags (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexMapFlags(u8);

impl RegexMapFlags {
    /// Treat inserted keys as shell globs instead of regexes.
    pub const GLOB: RegexMapFlags = RegexMapFlags(0b001);
    /// Build the multi-pattern `RegexSet` at `finalize()`.
    pub const MULTIPLE: RegexMapFlags = RegexMapFlags(0b010);
    /// At least one member pattern requires Unicode-aware matching.
    pub const UTF: RegexMapFlags = RegexMapFlags(0b100);

    pub const fn empty() -> Self {
        RegexMapFlags(0)
    }

    pub fn contains(self, other: RegexMapFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RegexMapFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for RegexMapFlags {
    type Output = RegexMapFlags;

    fn bitor(self, rhs: RegexMapFlags) -> RegexMapFlags {
        RegexMapFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy)]
struct PoolSpan {
    ptr: *const u8,
    len: usize,
}

unsafe impl Send for PoolSpan {}
unsafe impl Sync for PoolSpan {}

impl PoolSpan {
    unsafe fn as_bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

pub struct Record {
    value: PoolSpan,
    hits: AtomicU64,
}

impl Record {
    pub fn value(&self) -> &[u8] {
        unsafe { self.value.as_bytes() }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Regex-list index with an optional finalized multi-pattern scanner.
pub struct RegexMapIndex {
    pool: Pool,
    config: RegexMapConfig,
    patterns: Vec<String>,
    regexps: Vec<Regex>,
    records: Vec<Record>,
    flags: RegexMapFlags,
    set: Option<RegexSet>,
    fingerprint: RollingFingerprint,
}

impl RegexMapIndex {
    pub fn new(flags: RegexMapFlags, config: RegexMapConfig) -> Self {
        Self {
            pool: Pool::with_default_config(),
            config,
            patterns: Vec::new(),
            regexps: Vec::new(),
            records: Vec::new(),
            flags,
            set: None,
            fingerprint: RollingFingerprint::new(),
        }
    }

    /// Compile `key` (as a glob if `GLOB` is set, else directly as a
    /// regex) and associate it with `value`. A compile failure is logged
    /// and the entry is dropped — it does not abort the whole map load.
    pub fn insert(&mut self, key: &str, value: &[u8]) {
        let pattern = if self.flags.contains(RegexMapFlags::GLOB) {
            glob_to_regex(key)
        } else {
            key.to_string()
        };

        let compiled = match RegexBuilder::new(&pattern)
            .case_insensitive(self.config.case_insensitive)
            .dot_matches_new_line(self.config.dot_matches_new_line)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                log::warn!("regex map: skipping '{key}', compile failed: {e}");
                return;
            }
        };

        if !compiled.as_str().is_ascii() {
            self.flags.insert(RegexMapFlags::UTF);
        }

        let value_ptr = self.pool.strdup_bytes(value);
        self.fingerprint.update(key.as_bytes());
        self.patterns.push(pattern);
        self.regexps.push(compiled);
        self.records.push(Record {
            value: PoolSpan { ptr: value_ptr, len: value.len() },
            hits: AtomicU64::new(0),
        });
        self.set = None;
    }

    /// Build the multi-pattern scanner from every pattern accepted so far.
    /// Safe to call more than once (e.g. after more chunks were inserted);
    /// a later `insert` invalidates the cached set until `finalize` runs
    /// again. Builds nothing (and leaves the map on the per-pattern
    /// fallback path) when there are zero compiled patterns.
    pub fn finalize(&mut self) {
        if !self.config.multi_pattern || self.patterns.is_empty() {
            self.set = None;
            return;
        }
        match RegexSet::new(&self.patterns) {
            Ok(set) => self.set = Some(set),
            Err(e) => {
                log::warn!("regex map: multi-pattern compile failed, falling back: {e}");
                self.set = None;
            }
        }
    }

    /// Decode `haystack` per `utf8_strict`: reject invalid UTF-8 outright
    /// (mirroring `rspamd_match_regexp_map_single`'s UTF-8 validation
    /// guard) or fall back to lossy replacement-character decoding.
    fn decode<'a>(&self, haystack: &'a [u8]) -> Option<Cow<'a, str>> {
        match str::from_utf8(haystack) {
            Ok(s) => Some(Cow::Borrowed(s)),
            Err(_) if self.config.utf8_strict => None,
            Err(_) => Some(String::from_utf8_lossy(haystack)),
        }
    }

    /// Return the value of the first pattern that matches `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<&[u8]> {
        let haystack = self.decode(haystack)?;
        if let Some(set) = &self.set {
            let idx = set.matches(haystack.as_ref()).iter().next()?;
            self.records[idx].hits.fetch_add(1, Ordering::Relaxed);
            return Some(self.records[idx].value());
        }
        for (re, record) in self.regexps.iter().zip(self.records.iter()) {
            if re.is_match(haystack.as_ref()) {
                record.hits.fetch_add(1, Ordering::Relaxed);
                return Some(record.value());
            }
        }
        None
    }

    /// Return the values of every pattern matching `haystack` (the
    /// `MULTIPLE` behavior) rather than stopping at the first hit.
    pub fn find_all(&self, haystack: &[u8]) -> Vec<&[u8]> {
        let Some(haystack) = self.decode(haystack) else {
            return Vec::new();
        };
        if let Some(set) = &self.set {
            return set
                .matches(haystack.as_ref())
                .iter()
                .map(|idx| {
                    self.records[idx].hits.fetch_add(1, Ordering::Relaxed);
                    self.records[idx].value()
                })
                .collect();
        }
        self.regexps
            .iter()
            .zip(self.records.iter())
            .filter(|(re, _)| re.is_match(haystack.as_ref()))
            .map(|(_, record)| {
                record.hits.fetch_add(1, Ordering::Relaxed);
                record.value()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn flags(&self) -> RegexMapFlags {
        self.flags
    }

    pub fn has_multi_pattern_db(&self) -> bool {
        self.set.is_some()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_regex_matches() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.insert(r"^foo\d+$", b"matched");
        idx.finalize();
        assert_eq!(idx.find(b"foo123"), Some(b"matched".as_slice()));
        assert_eq!(idx.find(b"bar123"), None);
    }

    #[test]
    fn glob_flag_translates_pattern() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::GLOB, RegexMapConfig::default());
        idx.insert("*.example.com", b"domain");
        idx.finalize();
        assert_eq!(idx.find(b"mail.example.com"), Some(b"domain".as_slice()));
        assert_eq!(idx.find(b"example.com"), None);
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.insert("(unterminated", b"v");
        idx.insert("ok", b"v2");
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn finalize_builds_multi_pattern_set_when_nonempty() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.insert("a", b"1");
        idx.insert("b", b"2");
        idx.finalize();
        assert!(idx.has_multi_pattern_db());
    }

    #[test]
    fn finalize_with_zero_patterns_stays_on_fallback() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.finalize();
        assert!(!idx.has_multi_pattern_db());
    }

    #[test]
    fn find_all_returns_every_match() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.insert("a", b"1");
        idx.insert(".", b"2");
        idx.finalize();
        assert_eq!(idx.find_all(b"a").len(), 2);
    }

    #[test]
    fn utf8_strict_rejects_invalid_bytes() {
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), RegexMapConfig::default());
        idx.insert(".", b"v");
        idx.finalize();
        assert_eq!(idx.find(&[0xff, 0xfe]), None);
    }

    #[test]
    fn non_strict_falls_back_to_lossy_decoding() {
        let mut cfg = RegexMapConfig::default();
        cfg.utf8_strict = false;
        let mut idx = RegexMapIndex::new(RegexMapFlags::empty(), cfg);
        idx.insert(".", b"v");
        idx.finalize();
        assert_eq!(idx.find(&[0xff, 0xfe]), Some(b"v".as_slice()));
    }
}
