// SPDX-License-Identifier: Apache-2.0

use crate::allocator::AllocError;
use crate::diagnostic::Diagnostic;
use crate::shared::Span;
use crate::tokenizer::{Token, TokenKind};

/// Internal invariants of the count/build passes that did not hold.
///
/// Seeing one of these means the counter and builder disagreed about the
/// document shape; the build is abandoned instead of writing out of place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnexpectedState {
    /// The builder entered more containers than the counter recorded.
    NodeListExhausted,
    /// The builder finished with recorded containers left over.
    NodesLeftOver,
    /// The Nth container built is not the kind the Nth node describes.
    NodeKindMismatch,
    /// A container received a different number of members than counted.
    MemberCountMismatch,
    /// A write or carve went past the end of an arena.
    ArenaOverflow,
    /// An arena still had uncarved slots after building.
    ArenaSlack,
    /// A token did not carry the literal its kind implies.
    LiteralMismatch,
    /// The traversal met the end of the tokens with containers still open.
    UnbalancedTraversal,
}

/// Errors that can occur during JSON parsing
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A token of the wrong kind was found.
    UnexpectedToken {
        expected: &'static [TokenKind],
        found: Token,
    },
    /// An object key was the empty string `""`.
    EmptyKey(Span),
    /// A string reached the end of input without its closing quote.
    UnterminatedString(Span),
    /// `true`, `false` or `null` was cut off by the end of input.
    UnterminatedToken(Span),
    /// A number token did not form a valid number.
    MalformedNumber(Span),
    /// A number does not fit in an `f64`.
    NumericOverflow(Span),
    /// Containers were nested deeper than the configured limit.
    MaxDepthExceeded { max_depth: usize, span: Span },
    /// The allocator refused a request.
    AllocationFailure(AllocError),
    /// A string slice was not valid UTF-8.
    InvalidUtf8(core::str::Utf8Error),
    /// The parser entered an unexpected internal state.
    Unexpected(UnexpectedState),
}

impl ParseError {
    pub(crate) fn unexpected(expected: &'static [TokenKind], found: Token) -> Self {
        ParseError::UnexpectedToken { expected, found }
    }

    /// Source bytes the error points at, if it points anywhere.
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { found, .. } => Some(found.span),
            ParseError::EmptyKey(span)
            | ParseError::UnterminatedString(span)
            | ParseError::UnterminatedToken(span)
            | ParseError::MalformedNumber(span)
            | ParseError::NumericOverflow(span)
            | ParseError::MaxDepthExceeded { span, .. } => Some(*span),
            ParseError::AllocationFailure(_)
            | ParseError::InvalidUtf8(_)
            | ParseError::Unexpected(_) => None,
        }
    }

    /// Render this error against the source it came from.
    pub fn diagnostic<'e, 's>(&'e self, source: &'s [u8]) -> Diagnostic<'e, 's> {
        Diagnostic::new(self, source)
    }
}

impl From<AllocError> for ParseError {
    fn from(err: AllocError) -> Self {
        ParseError::AllocationFailure(err)
    }
}

impl From<core::str::Utf8Error> for ParseError {
    fn from(err: core::str::Utf8Error) -> Self {
        ParseError::InvalidUtf8(err)
    }
}

impl From<UnexpectedState> for ParseError {
    fn from(info: UnexpectedState) -> Self {
        ParseError::Unexpected(info)
    }
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "Got: {}. Expected: [", found.kind)?;
                for (i, kind) in expected.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{kind}")?;
                }
                f.write_str("]")
            }
            ParseError::EmptyKey(_) => {
                f.write_str("Empty key strings are not allowed in JSON objects")
            }
            ParseError::UnterminatedString(_) => f.write_str("Unterminated string"),
            ParseError::UnterminatedToken(_) => f.write_str("Unterminated token"),
            ParseError::MalformedNumber(_) => f.write_str("Malformed number"),
            ParseError::NumericOverflow(_) => f.write_str("Number out of range"),
            ParseError::MaxDepthExceeded { max_depth, .. } => {
                write!(f, "Nesting deeper than {max_depth} levels")
            }
            ParseError::AllocationFailure(e) => write!(f, "Allocation failure: {e}"),
            ParseError::InvalidUtf8(e) => write!(f, "Invalid UTF-8: {e}"),
            ParseError::Unexpected(state) => write!(f, "Internal error: {state:?}"),
        }
    }
}
