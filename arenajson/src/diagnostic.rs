// SPDX-License-Identifier: Apache-2.0

//! Human-readable rendering of a [`ParseError`] against its source.
//!
//! ```text
//! Parse error at:
//! {"one": 1, "two": 2,}
//!                    ^
//! Got: ','. Expected: [string, number, boolean, null, '{', '[']
//! ```

use core::fmt::{self, Write};

use crate::parse_error::ParseError;
use crate::shared::Span;

/// Bytes of context shown before the offending token
const CONTEXT_BEFORE: usize = 20;
/// Bytes of context shown after the offending token
const CONTEXT_AFTER: usize = 10;
const ELLIPSIS: &str = "...";

/// A [`ParseError`] paired with the source it was produced from.
///
/// The `Display` output is a source excerpt with a caret under the offending
/// token, followed by the error message.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic<'e, 's> {
    error: &'e ParseError,
    source: &'s [u8],
}

impl<'e, 's> Diagnostic<'e, 's> {
    pub fn new(error: &'e ParseError, source: &'s [u8]) -> Self {
        Self { error, source }
    }

    fn write_excerpt(&self, f: &mut fmt::Formatter<'_>, span: Span) -> fmt::Result {
        let len = self.source.len();
        let start = span.start.min(len);
        let end = span.end().min(len).max(start);
        let window_start = start.saturating_sub(CONTEXT_BEFORE);
        let window_end = end.saturating_add(CONTEXT_AFTER).min(len);

        let mut caret_column = display_width(&self.source[window_start..start]);
        if window_start > 0 {
            f.write_str(ELLIPSIS)?;
            caret_column += ELLIPSIS.len();
        }
        write_flattened(f, &self.source[window_start..window_end])?;
        if window_end < len {
            f.write_str(ELLIPSIS)?;
        }
        f.write_char('\n')?;

        let token_width = display_width(&self.source[start..end]).max(1);
        for _ in 0..caret_column {
            f.write_char(' ')?;
        }
        f.write_char('^')?;
        for _ in 1..token_width {
            f.write_char('~')?;
        }
        f.write_char('\n')
    }
}

impl fmt::Display for Diagnostic<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = self.error.span() {
            f.write_str("Parse error at:\n")?;
            self.write_excerpt(f, span)?;
        }
        write!(f, "{}", self.error)
    }
}

/// Columns `bytes` take up once rendered.
fn display_width(bytes: &[u8]) -> usize {
    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid().chars().count() + usize::from(!chunk.invalid().is_empty()))
        .sum()
}

/// Write `bytes` on a single line: line breaks and tabs become spaces and
/// invalid UTF-8 becomes U+FFFD.
fn write_flattened(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            f.write_char(if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })?;
        }
        if !chunk.invalid().is_empty() {
            f.write_char(char::REPLACEMENT_CHARACTER)?;
        }
    }
    Ok(())
}
