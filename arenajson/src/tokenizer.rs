// SPDX-License-Identifier: Apache-2.0

use log::debug;

use crate::allocator::{AllocVec, Allocator};
use crate::number_parser;
use crate::parse_error::ParseError;
use crate::shared::Span;

/// Tokens the buffer starts out with; it doubles from there.
const INITIAL_TOKEN_CAPACITY: usize = 128;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Comma,
    Colon,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    String,
    Number,
    Bool,
    Null,
    /// End of the input buffer.
    End,
    /// A byte that cannot start any token. Always the last token of a stream.
    Invalid,
}

impl TokenKind {
    /// Every token that may begin a value.
    pub const VALUE_START: &'static [TokenKind] = &[
        TokenKind::String,
        TokenKind::Number,
        TokenKind::Bool,
        TokenKind::Null,
        TokenKind::OpenBrace,
        TokenKind::OpenBracket,
    ];

    /// Every token that may follow `[`: a value, or the closer of an empty array.
    pub const ARRAY_START: &'static [TokenKind] = &[
        TokenKind::String,
        TokenKind::Number,
        TokenKind::Bool,
        TokenKind::Null,
        TokenKind::OpenBrace,
        TokenKind::OpenBracket,
        TokenKind::CloseBracket,
    ];

    fn from_punctuation(byte: u8) -> Option<TokenKind> {
        match byte {
            b',' => Some(TokenKind::Comma),
            b':' => Some(TokenKind::Colon),
            b'[' => Some(TokenKind::OpenBracket),
            b']' => Some(TokenKind::CloseBracket),
            b'{' => Some(TokenKind::OpenBrace),
            b'}' => Some(TokenKind::CloseBrace),
            _ => None,
        }
    }

    /// True for the kinds that terminate a stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, TokenKind::End | TokenKind::Invalid)
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::OpenBracket => "'['",
            TokenKind::CloseBracket => "']'",
            TokenKind::OpenBrace => "'{'",
            TokenKind::CloseBrace => "'}'",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Bool => "boolean",
            TokenKind::Null => "null",
            TokenKind::End => "end of input",
            TokenKind::Invalid => "invalid token",
        };
        f.write_str(name)
    }
}

/// Literal decoded while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    None,
    Number(f64),
    Bool(bool),
}

/// A lexical unit with its position in the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Bytes covered in the source; string spans include both quote marks.
    pub span: Span,
    pub literal: Literal,
}

impl Token {
    pub const fn new(kind: TokenKind, span: Span, literal: Literal) -> Self {
        Self {
            kind,
            span,
            literal,
        }
    }

    const fn end_of_input(len: usize) -> Self {
        Token::new(TokenKind::End, Span::new(len, 0), Literal::None)
    }
}

/// The complete, immutable token sequence of one source buffer.
///
/// The last token is always [`TokenKind::End`] or [`TokenKind::Invalid`].
pub struct TokenStream<'s, 'a, A: Allocator> {
    source: &'s [u8],
    tokens: AllocVec<'a, Token, A>,
}

impl<'s, 'a, A: Allocator> TokenStream<'s, 'a, A> {
    pub fn source(&self) -> &'s [u8] {
        self.source
    }

    /// The allocator the token buffer came from.
    pub fn allocator(&self) -> &'a A {
        self.tokens.allocator()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// A fresh cursor positioned at the first token.
    pub fn cursor(&self) -> TokenCursor<'_> {
        TokenCursor::new(&self.tokens)
    }
}

/// Read position over a token slice.
///
/// Any number of cursors may walk the same stream independently. Reading past
/// the last token keeps returning that terminal token.
#[derive(Debug, Clone)]
pub struct TokenCursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> TokenCursor<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Consume and return the next token.
    pub fn next(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// The next token, without consuming it.
    pub fn peek(&self) -> Token {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .copied()
            .unwrap_or(Token::end_of_input(0))
    }

    /// Go back to the first token.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Number of tokens consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\t' | b'\r')
}

/// Split `source` into tokens.
///
/// Stops at the end of input or at the first byte that cannot start a token.
/// Strings that never close and keywords cut short by the end of the buffer
/// are reported here; everything else grammatical is left to the validator.
pub fn tokenize<'s, 'a, A: Allocator>(
    source: &'s [u8],
    allocator: &'a A,
) -> Result<TokenStream<'s, 'a, A>, ParseError> {
    let mut tokens = AllocVec::with_capacity(allocator, INITIAL_TOKEN_CAPACITY)?;
    let mut pos = 0;
    loop {
        let token = read_token(source, pos)?;
        tokens.push(token)?;
        if token.kind.is_terminal() {
            break;
        }
        pos = token.span.end();
    }
    debug!(
        "Tokenized {} bytes into {} tokens",
        source.len(),
        tokens.len()
    );
    Ok(TokenStream { source, tokens })
}

/// Read the token starting at or after `pos`.
pub(crate) fn read_token(source: &[u8], pos: usize) -> Result<Token, ParseError> {
    let start = source
        .get(pos..)
        .and_then(|rest| rest.iter().position(|&b| !is_whitespace(b)))
        .map(|skipped| pos + skipped);
    let Some(start) = start else {
        return Ok(Token::end_of_input(source.len()));
    };
    let byte = source[start];

    if let Some(kind) = TokenKind::from_punctuation(byte) {
        return Ok(Token::new(kind, Span::new(start, 1), Literal::None));
    }
    match byte {
        b'"' => scan_string(source, start),
        b'n' => scan_keyword(source, start, b"null", TokenKind::Null, Literal::None),
        b't' => scan_keyword(source, start, b"true", TokenKind::Bool, Literal::Bool(true)),
        b'f' => scan_keyword(source, start, b"false", TokenKind::Bool, Literal::Bool(false)),
        b'-' | b'0'..=b'9' => number_parser::scan_number(source, start),
        _ => Ok(Token::new(
            TokenKind::Invalid,
            Span::new(start, 1),
            Literal::None,
        )),
    }
}

fn scan_string(source: &[u8], start: usize) -> Result<Token, ParseError> {
    let mut i = start + 1;
    while let Some(&byte) = source.get(i) {
        match byte {
            b'"' => {
                let span = Span::new(start, i + 1 - start);
                return Ok(Token::new(TokenKind::String, span, Literal::None));
            }
            // Skip whatever is escaped; escapes are kept verbatim
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    Err(ParseError::UnterminatedString(Span::new(
        start,
        source.len() - start,
    )))
}

fn scan_keyword(
    source: &[u8],
    start: usize,
    word: &[u8],
    kind: TokenKind,
    literal: Literal,
) -> Result<Token, ParseError> {
    let rest = source.get(start..).unwrap_or_default();
    let available = rest.len().min(word.len());
    if rest[..available] != word[..available] {
        // Underline the whole run of letters, e.g. `nope`
        let len = rest
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count()
            .max(1);
        return Ok(Token::new(
            TokenKind::Invalid,
            Span::new(start, len),
            Literal::None,
        ));
    }
    if available < word.len() {
        return Err(ParseError::UnterminatedToken(Span::new(start, available)));
    }
    Ok(Token::new(kind, Span::new(start, word.len()), literal))
}
