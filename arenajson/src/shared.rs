// SPDX-License-Identifier: Apache-2.0

/// Shared components for the tokenizer, parsing passes and document
use crate::ParseError;

/// A half-open range of bytes (or slots) inside a buffer.
///
/// Used both for token positions in the source and for slices carved
/// out of the document arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// First byte or slot covered by the span
    pub start: usize,
    /// Number of bytes or slots covered
    pub len: usize,
}

impl Span {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last covered position.
    pub const fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    pub const fn range(&self) -> core::ops::Range<usize> {
        self.start..self.end()
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The span of a quoted string token with both quote marks removed.
    pub const fn without_quotes(&self) -> Span {
        Span::new(self.start.saturating_add(1), self.len.saturating_sub(2))
    }
}

/// The two kinds of JSON container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

impl ContainerKind {
    pub const fn opener(self) -> char {
        match self {
            ContainerKind::Object => '{',
            ContainerKind::Array => '[',
        }
    }

    pub const fn closer(self) -> char {
        match self {
            ContainerKind::Object => '}',
            ContainerKind::Array => ']',
        }
    }
}

pub const fn from_utf8(v: &[u8]) -> Result<&str, ParseError> {
    match core::str::from_utf8(v) {
        Ok(s) => Ok(s),
        Err(e) => Err(ParseError::InvalidUtf8(e)),
    }
}
