// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Resumable key/value-list parser (§4.6). Fed arbitrarily-sized chunks of a
// line-oriented `key value # comment` format, one call at a time, with no
// requirement that a call boundary land on a key/value/line boundary. The
// original C parser carried partial progress between calls as a tail
// pointer the caller had to re-feed; here the partial key/value bytes and
// the current state just live in `Parser` itself, so `parse` always
// consumes its whole input slice and the "tail" concept collapses to
// "whatever is still in `self.key`/`self.value` when the call returns".
// `parse` still reports how many bytes it consumed, mirroring the original
// entry point's signature even though every byte is always accounted for.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    SkipSpacesBeforeKey,
    ReadKey,
    ReadKeyQuoted,
    ReadKeySlashed,
    ReadKeyAfterSlash,
    BackslashQuoted,
    BackslashSlashed,
    SkipSpacesAfterKey,
    ReadValue,
    ReadCommentStart,
    SkipComment,
    ReadEol,
}

/// A resumable parser for the key/value list format (§4.6). Feed it chunks
/// with [`parse`](Self::parse) in order; a single logical line may be split
/// across any number of calls.
pub struct Parser {
    state: ParserState,
    key: Vec<u8>,
    modifiers: Vec<u8>,
    value: Vec<u8>,
    line: u64,
    malformed_count: u64,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::SkipSpacesBeforeKey,
            key: Vec::new(),
            modifiers: Vec::new(),
            value: Vec::new(),
            line: 1,
            malformed_count: 0,
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    /// Regex-key modifier flags captured after the most recently committed
    /// slashed key (§4.6) — captured for diagnostics only; they are never
    /// forwarded to a regex compiler by this parser.
    pub fn last_modifiers(&self) -> &[u8] {
        &self.modifiers
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed_count
    }

    /// Feed `chunk` through the state machine, calling `insert(key, value)`
    /// for each accepted line. `default_value` fills in for a key with no
    /// explicit value. Pass `final_chunk = true` on the last call so any
    /// still-in-flight key/value is committed (or logged and dropped, if it
    /// was malformed at EOF) instead of waiting for more input. Returns the
    /// number of bytes consumed from `chunk` (always `chunk.len()`).
    pub fn parse(
        &mut self,
        chunk: &[u8],
        final_chunk: bool,
        default_value: &[u8],
        insert: &mut dyn FnMut(&[u8], &[u8]),
    ) -> usize {
        let mut i = 0;
        while i < chunk.len() {
            let c = chunk[i];
            let mut consume = true;

            match self.state {
                ParserState::SkipSpacesBeforeKey => match c {
                    b' ' | b'\t' => {}
                    b'\n' => self.state = ParserState::ReadEol,
                    b'#' => self.state = ParserState::ReadCommentStart,
                    b'"' => {
                        self.key.clear();
                        self.modifiers.clear();
                        self.state = ParserState::ReadKeyQuoted;
                    }
                    b'/' => {
                        self.key.clear();
                        self.modifiers.clear();
                        self.key.push(c);
                        self.state = ParserState::ReadKeySlashed;
                    }
                    _ => {
                        self.key.clear();
                        self.modifiers.clear();
                        self.key.push(c);
                        self.state = ParserState::ReadKey;
                    }
                },

                ParserState::ReadKey => match c {
                    b' ' | b'\t' => self.state = ParserState::SkipSpacesAfterKey,
                    b'\n' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadEol;
                    }
                    b'#' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadCommentStart;
                    }
                    _ => self.key.push(c),
                },

                ParserState::ReadKeyQuoted => match c {
                    b'\\' => self.state = ParserState::BackslashQuoted,
                    b'"' => self.state = ParserState::SkipSpacesAfterKey,
                    b'\n' => {
                        self.malformed_line();
                        self.state = ParserState::ReadEol;
                    }
                    _ => self.key.push(c),
                },

                ParserState::BackslashQuoted => {
                    self.key.push(c);
                    self.state = ParserState::ReadKeyQuoted;
                }

                ParserState::ReadKeySlashed => match c {
                    b'\\' => self.state = ParserState::BackslashSlashed,
                    b'/' => {
                        self.key.push(c);
                        self.state = ParserState::ReadKeyAfterSlash;
                    }
                    b'\n' => {
                        self.malformed_line();
                        self.state = ParserState::ReadEol;
                    }
                    _ => self.key.push(c),
                },

                ParserState::BackslashSlashed => {
                    self.key.push(c);
                    self.state = ParserState::ReadKeySlashed;
                }

                ParserState::ReadKeyAfterSlash => match c {
                    b' ' | b'\t' => self.state = ParserState::SkipSpacesAfterKey,
                    b'\n' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadEol;
                    }
                    b'#' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadCommentStart;
                    }
                    _ => self.modifiers.push(c),
                },

                ParserState::SkipSpacesAfterKey => match c {
                    b' ' | b'\t' => {}
                    b'\n' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadEol;
                    }
                    b'#' => {
                        self.commit_with_default(default_value, insert);
                        self.state = ParserState::ReadCommentStart;
                    }
                    _ => {
                        self.value.clear();
                        self.value.push(c);
                        self.state = ParserState::ReadValue;
                    }
                },

                ParserState::ReadValue => match c {
                    b'\n' => {
                        self.commit_value(insert);
                        self.state = ParserState::ReadEol;
                    }
                    b'#' => {
                        self.commit_value(insert);
                        self.state = ParserState::ReadCommentStart;
                    }
                    _ => self.value.push(c),
                },

                ParserState::ReadCommentStart => {
                    consume = false;
                    self.state = ParserState::SkipComment;
                }

                ParserState::SkipComment => match c {
                    b'\n' => self.state = ParserState::ReadEol,
                    _ => {}
                },

                ParserState::ReadEol => {
                    consume = false;
                    self.line += 1;
                    self.state = ParserState::SkipSpacesBeforeKey;
                }
            }

            if consume {
                i += 1;
            }
        }

        if final_chunk {
            self.finish(default_value, insert);
        }

        chunk.len()
    }

    fn finish(&mut self, default_value: &[u8], insert: &mut dyn FnMut(&[u8], &[u8])) {
        match self.state {
            ParserState::ReadKey | ParserState::ReadKeyAfterSlash | ParserState::SkipSpacesAfterKey => {
                self.commit_with_default(default_value, insert);
            }
            ParserState::ReadValue => {
                self.commit_value(insert);
            }
            ParserState::ReadKeyQuoted
            | ParserState::ReadKeySlashed
            | ParserState::BackslashQuoted
            | ParserState::BackslashSlashed => {
                self.malformed_line();
            }
            ParserState::SkipSpacesBeforeKey
            | ParserState::ReadCommentStart
            | ParserState::SkipComment
            | ParserState::ReadEol => {}
        }
        self.state = ParserState::SkipSpacesBeforeKey;
    }

    fn commit_with_default(&mut self, default_value: &[u8], insert: &mut dyn FnMut(&[u8], &[u8])) {
        if self.key.is_empty() {
            self.malformed_line();
            return;
        }
        insert(&self.key, default_value);
        self.key.clear();
        self.modifiers.clear();
    }

    fn commit_value(&mut self, insert: &mut dyn FnMut(&[u8], &[u8])) {
        if self.key.is_empty() {
            self.malformed_line();
            return;
        }
        trim_ascii_whitespace(&mut self.value);
        insert(&self.key, &self.value);
        self.key.clear();
        self.modifiers.clear();
        self.value.clear();
    }

    fn malformed_line(&mut self) {
        self.malformed_count += 1;
        log::warn!("malformed key/value line {}: skipping", self.line);
        self.key.clear();
        self.modifiers.clear();
        self.value.clear();
    }
}

fn trim_ascii_whitespace(buf: &mut Vec<u8>) {
    while matches!(buf.last(), Some(b' ') | Some(b'\t')) {
        buf.pop();
    }
    let start = buf.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(buf.len());
    buf.drain(0..start);
}
