// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Match-map engine: three index kinds (hash/radix/regex) sharing a common
// generation-swap lifecycle (§4.10). A map is rebuilt off to the side —
// fed chunk by chunk through the kv-list parser, then finalized — and only
// swapped into the live slot atomically once finished, so readers never
// see a half-built index. Installing a new generation drops the old one's
// `Pool` (and with it every slab it owns) at exactly the moment the new
// one takes over. The swap itself is guarded by `std::sync::RwLock`, not
// the crate's own spin-based
// `sync::RwLock` — that one exists for guarding data shared *across*
// processes, which this in-process pointer swing never needs.

pub mod glob;
pub mod hash_map;
pub mod radix_map;
pub mod regex_map;

use std::sync::RwLock;

use crate::kv_parser::Parser;

/// One generation of a match-map index, built incrementally from chunks
/// and then frozen. `parser` is `Some` while still accepting chunks and
/// `None` once finalized or aborted.
pub struct Generation<T> {
    index: T,
    parser: Option<Parser>,
}

impl<T> Generation<T> {
    pub fn new(index: T) -> Self {
        Self {
            index,
            parser: Some(Parser::new()),
        }
    }

    /// Feed a chunk of kv-list text through the parser, calling `insert`
    /// for every accepted `(key, value)` pair. A no-op once the generation
    /// has been finalized.
    pub fn read_chunk(
        &mut self,
        chunk: &[u8],
        final_chunk: bool,
        default_value: &[u8],
        mut insert: impl FnMut(&mut T, &[u8], &[u8]),
    ) {
        let index = &mut self.index;
        if let Some(parser) = &mut self.parser {
            parser.parse(chunk, final_chunk, default_value, &mut |k, v| insert(index, k, v));
        }
    }

    /// Freeze the generation, running `finish` on the index (e.g.
    /// `RegexMapIndex::finalize`) exactly once. A no-op if already
    /// finalized.
    pub fn finalize(&mut self, finish: impl FnOnce(&mut T)) {
        if self.parser.take().is_some() {
            finish(&mut self.index);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.parser.is_none()
    }

    /// The built index, readable even mid-build — callers that need to
    /// enforce "only query once finalized" should check `is_ready` first.
    pub fn index(&self) -> &T {
        &self.index
    }
}

/// A published match-map index with atomic swap-in of new generations.
pub struct MatchIndex<T> {
    current: RwLock<Option<Generation<T>>>,
}

impl<T> Default for MatchIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MatchIndex<T> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Install `new` as the live generation. The previous generation (and
    /// its `Pool`) is dropped once this returns.
    pub fn swap(&self, new: Generation<T>) {
        let mut guard = self.current.write().expect("match index lock poisoned");
        *guard = Some(new);
    }

    /// Abandon any in-progress or published generation, leaving the map
    /// empty until the next `swap`.
    pub fn abort(&self) {
        let mut guard = self.current.write().expect("match index lock poisoned");
        *guard = None;
    }

    pub fn with_current<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.current.read().expect("match index lock poisoned");
        f(guard.as_ref().map(Generation::index))
    }
}
