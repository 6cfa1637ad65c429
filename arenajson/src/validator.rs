// SPDX-License-Identifier: Apache-2.0

//! Grammar check over a token stream.
//!
//! Runs as a state machine over an explicit stack of open containers, so the
//! call stack stays flat no matter how deeply the input nests. Nesting is
//! bounded by [`ParseConfig::max_depth`].

use log::debug;

use crate::allocator::{AllocVec, Allocator};
use crate::parse_error::ParseError;
use crate::parser::ParseConfig;
use crate::shared::{ContainerKind, Span};
use crate::tokenizer::{Token, TokenCursor, TokenKind, TokenStream};

/// A token stream that passed [`validate`].
///
/// Only this type is accepted by the counting and building passes, which
/// therefore never check grammar themselves.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedTokens<'t> {
    tokens: &'t [Token],
    source: &'t [u8],
}

impl<'t> ValidatedTokens<'t> {
    pub fn tokens(&self) -> &'t [Token] {
        self.tokens
    }

    pub fn source(&self) -> &'t [u8] {
        self.source
    }

    /// A fresh cursor at the first token.
    pub fn cursor(&self) -> TokenCursor<'t> {
        TokenCursor::new(self.tokens)
    }

    /// Source bytes a token covers.
    pub(crate) fn bytes(&self, span: Span) -> &'t [u8] {
        self.source.get(span.range()).unwrap_or_default()
    }
}

/// Where a container is in its member list.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    /// Just opened: a member or the closer may follow.
    Start,
    /// After a comma: a member must follow. Holds the comma for reporting.
    AfterComma(Token),
    /// After a member: a comma or the closer may follow.
    AfterMember,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    kind: ContainerKind,
    position: Position,
}

struct Validator<'t, 'a, A: Allocator> {
    cursor: TokenCursor<'t>,
    stack: AllocVec<'a, Frame, A>,
    max_depth: usize,
    deepest: usize,
}

impl<'t, 'a, A: Allocator> Validator<'t, 'a, A> {
    fn run(&mut self) -> Result<(), ParseError> {
        let root = self.cursor.next();
        if root.kind != TokenKind::OpenBrace {
            return Err(ParseError::unexpected(&[TokenKind::OpenBrace], root));
        }
        self.enter(ContainerKind::Object, root)?;

        while let Some(frame) = self.stack.last().copied() {
            let token = self.cursor.next();
            match frame.kind {
                ContainerKind::Object => self.validate_object(frame.position, token)?,
                ContainerKind::Array => self.validate_array(frame.position, token)?,
            }
        }

        let trailing = self.cursor.next();
        if trailing.kind != TokenKind::End {
            return Err(ParseError::unexpected(&[TokenKind::End], trailing));
        }
        Ok(())
    }

    fn validate_object(&mut self, position: Position, token: Token) -> Result<(), ParseError> {
        match (position, token.kind) {
            (Position::Start | Position::AfterMember, TokenKind::CloseBrace) => self.leave(),
            (Position::Start | Position::AfterComma(_), TokenKind::String) => {
                self.validate_pair(token)
            }
            (Position::AfterComma(comma), TokenKind::CloseBrace) => {
                Err(ParseError::unexpected(TokenKind::VALUE_START, comma))
            }
            (Position::AfterMember, TokenKind::Comma) => self.set_position(Position::AfterComma(token)),
            (Position::Start, _) => Err(ParseError::unexpected(
                &[TokenKind::String, TokenKind::CloseBrace],
                token,
            )),
            (Position::AfterComma(_), _) => {
                Err(ParseError::unexpected(&[TokenKind::String], token))
            }
            (Position::AfterMember, _) => Err(ParseError::unexpected(
                &[TokenKind::Comma, TokenKind::CloseBrace],
                token,
            )),
        }
    }

    fn validate_array(&mut self, position: Position, token: Token) -> Result<(), ParseError> {
        match (position, token.kind) {
            (Position::Start | Position::AfterMember, TokenKind::CloseBracket) => self.leave(),
            (Position::AfterComma(comma), TokenKind::CloseBracket) => {
                Err(ParseError::unexpected(TokenKind::VALUE_START, comma))
            }
            (Position::AfterMember, TokenKind::Comma) => self.set_position(Position::AfterComma(token)),
            (Position::AfterMember, _) => Err(ParseError::unexpected(
                &[TokenKind::Comma, TokenKind::CloseBracket],
                token,
            )),
            (Position::Start, kind) if !TokenKind::VALUE_START.contains(&kind) => {
                Err(ParseError::unexpected(TokenKind::ARRAY_START, token))
            }
            (Position::Start | Position::AfterComma(_), _) => {
                self.set_position(Position::AfterMember)?;
                self.validate_value(token)
            }
        }
    }

    /// `string : value`, with `key` already read.
    fn validate_pair(&mut self, key: Token) -> Result<(), ParseError> {
        // Two bytes means nothing between the quotes
        if key.span.len == 2 {
            return Err(ParseError::EmptyKey(key.span));
        }
        let colon = self.cursor.next();
        if colon.kind != TokenKind::Colon {
            return Err(ParseError::unexpected(&[TokenKind::Colon], colon));
        }
        self.set_position(Position::AfterMember)?;
        let value = self.cursor.next();
        self.validate_value(value)
    }

    fn validate_value(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::String | TokenKind::Number | TokenKind::Bool | TokenKind::Null => Ok(()),
            TokenKind::OpenBrace => self.enter(ContainerKind::Object, token),
            TokenKind::OpenBracket => self.enter(ContainerKind::Array, token),
            _ => Err(ParseError::unexpected(TokenKind::VALUE_START, token)),
        }
    }

    fn enter(&mut self, kind: ContainerKind, opener: Token) -> Result<(), ParseError> {
        if self.stack.len() >= self.max_depth {
            return Err(ParseError::MaxDepthExceeded {
                max_depth: self.max_depth,
                span: opener.span,
            });
        }
        self.stack.push(Frame {
            kind,
            position: Position::Start,
        })?;
        self.deepest = self.deepest.max(self.stack.len());
        Ok(())
    }

    fn leave(&mut self) -> Result<(), ParseError> {
        self.stack.pop();
        Ok(())
    }

    fn set_position(&mut self, position: Position) -> Result<(), ParseError> {
        if let Some(frame) = self.stack.last_mut() {
            frame.position = position;
        }
        Ok(())
    }
}

/// Check that `stream` is a single JSON object followed by the end of input.
///
/// On success the returned proof borrows the stream and can be handed to the
/// counting and building passes. Validation is pure: the stream is not
/// modified and the same stream always gives the same answer.
pub fn validate<'t, A: Allocator>(
    stream: &'t TokenStream<'_, '_, A>,
    config: &ParseConfig,
) -> Result<ValidatedTokens<'t>, ParseError> {
    let mut validator = Validator {
        cursor: stream.cursor(),
        stack: AllocVec::with_capacity(stream.allocator(), config.max_depth.min(64))?,
        max_depth: config.max_depth,
        deepest: 0,
    };
    validator.run()?;
    debug!(
        "Validated {} tokens, nesting depth {}",
        stream.len(),
        validator.deepest
    );
    Ok(ValidatedTokens {
        tokens: stream.tokens(),
        source: stream.source(),
    })
}

/// [`validate`], reduced to a flag.
pub fn is_valid<A: Allocator>(stream: &TokenStream<'_, '_, A>, config: &ParseConfig) -> bool {
    validate(stream, config).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Global;
    use crate::tokenizer::tokenize;
    use test_log::test;

    fn check(source: &str) -> Result<(), ParseError> {
        let stream = tokenize(source.as_bytes(), &Global)?;
        validate(&stream, &ParseConfig::default()).map(|_| ())
    }

    fn expected_found(source: &str) -> (&'static [TokenKind], TokenKind, Span) {
        match check(source) {
            Err(ParseError::UnexpectedToken { expected, found }) => {
                (expected, found.kind, found.span)
            }
            other => panic!("Expected UnexpectedToken for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_well_formed_documents() {
        for source in [
            "{}",
            r#"{"a":1}"#,
            r#" { "a" : [ ] , "b" : { } } "#,
            r#"{"a":[1,"x",true,false,null,{"b":[[]]}]}"#,
            r#"{"a":1,"a":2}"#,
        ] {
            assert_eq!(check(source), Ok(()), "{source}");
        }
    }

    #[test]
    fn test_root_must_be_object() {
        let (expected, found, _) = expected_found("[1]");
        assert_eq!(expected, &[TokenKind::OpenBrace]);
        assert_eq!(found, TokenKind::OpenBracket);
        let (_, found, _) = expected_found("");
        assert_eq!(found, TokenKind::End);
    }

    #[test]
    fn test_trailing_comma_cites_comma() {
        let (expected, found, span) = expected_found(r#"{"a":1,}"#);
        assert_eq!(expected, TokenKind::VALUE_START);
        assert_eq!(found, TokenKind::Comma);
        assert_eq!(span, Span::new(6, 1));

        let (expected, found, span) = expected_found(r#"{"a":[1,2,]}"#);
        assert_eq!(expected, TokenKind::VALUE_START);
        assert_eq!(found, TokenKind::Comma);
        assert_eq!(span, Span::new(9, 1));
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(check(r#"{"":1}"#), Err(ParseError::EmptyKey(Span::new(1, 2))));
        // Empty string values are fine
        assert_eq!(check(r#"{"a":""}"#), Ok(()));
    }

    #[test]
    fn test_missing_colon_and_value() {
        let (expected, found, _) = expected_found(r#"{"a" 1}"#);
        assert_eq!(expected, &[TokenKind::Colon]);
        assert_eq!(found, TokenKind::Number);

        let (expected, found, _) = expected_found(r#"{"a":}"#);
        assert_eq!(expected, TokenKind::VALUE_START);
        assert_eq!(found, TokenKind::CloseBrace);
    }

    #[test]
    fn test_opened_containers_expect_member_or_closer() {
        let (expected, found, span) = expected_found(r#"{"a":[,1]}"#);
        assert_eq!(expected, TokenKind::ARRAY_START);
        assert!(expected.contains(&TokenKind::CloseBracket));
        assert_eq!(found, TokenKind::Comma);
        assert_eq!(span, Span::new(6, 1));

        let (expected, found, _) = expected_found(r#"{"a":[:]}"#);
        assert_eq!(expected, TokenKind::ARRAY_START);
        assert_eq!(found, TokenKind::Colon);

        // After a comma only a value may follow
        let (expected, _, _) = expected_found(r#"{"a":[1,:]}"#);
        assert_eq!(expected, TokenKind::VALUE_START);

        let (expected, _, _) = expected_found(r#"{"a":{,}}"#);
        assert_eq!(expected, &[TokenKind::String, TokenKind::CloseBrace]);
    }

    #[test]
    fn test_mismatched_closers() {
        let (expected, found, _) = expected_found(r#"{"a":[1}"#);
        assert_eq!(expected, &[TokenKind::Comma, TokenKind::CloseBracket]);
        assert_eq!(found, TokenKind::CloseBrace);

        let (expected, _, _) = expected_found(r#"{"a":1]"#);
        assert_eq!(expected, &[TokenKind::Comma, TokenKind::CloseBrace]);
    }

    #[test]
    fn test_unclosed_root_reports_end() {
        let (expected, found, span) = expected_found(r#"{"a":1"#);
        assert_eq!(expected, &[TokenKind::Comma, TokenKind::CloseBrace]);
        assert_eq!(found, TokenKind::End);
        assert_eq!(span, Span::new(6, 0));
    }

    #[test]
    fn test_content_after_root() {
        let (expected, found, _) = expected_found("{} {}");
        assert_eq!(expected, &[TokenKind::End]);
        assert_eq!(found, TokenKind::OpenBrace);
    }

    #[test]
    fn test_invalid_token_is_reported() {
        let (expected, found, span) = expected_found(r#"{"a": nope}"#);
        assert_eq!(expected, TokenKind::VALUE_START);
        assert_eq!(found, TokenKind::Invalid);
        assert_eq!(span, Span::new(6, 4));
    }

    #[test]
    fn test_key_must_be_string() {
        let (expected, found, _) = expected_found("{1:2}");
        assert_eq!(expected, &[TokenKind::String, TokenKind::CloseBrace]);
        assert_eq!(found, TokenKind::Number);
        let (expected, _, _) = expected_found(r#"{"a":1,2:3}"#);
        assert_eq!(expected, &[TokenKind::String]);
    }

    #[test]
    fn test_depth_limit() {
        let config = ParseConfig { max_depth: 3 };
        let ok = r#"{"a":{"b":[1]}}"#;
        let stream = tokenize(ok.as_bytes(), &Global).unwrap();
        assert!(is_valid(&stream, &config));

        let deep = r#"{"a":{"b":[[1]]}}"#;
        let stream = tokenize(deep.as_bytes(), &Global).unwrap();
        assert_eq!(
            validate(&stream, &config).unwrap_err(),
            ParseError::MaxDepthExceeded {
                max_depth: 3,
                span: Span::new(11, 1)
            }
        );
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let depth = 100_000;
        let mut source = String::from(r#"{"a":"#);
        source.push_str(&"[".repeat(depth));
        source.push_str(&"]".repeat(depth));
        source.push('}');
        let stream = tokenize(source.as_bytes(), &Global).unwrap();
        let config = ParseConfig {
            max_depth: depth + 1,
        };
        assert!(is_valid(&stream, &config));
        assert!(!is_valid(&stream, &ParseConfig::default()));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let stream = tokenize(br#"{"a":[1,{"b":null}],"c":"d"}"#, &Global).unwrap();
        let config = ParseConfig::default();
        let first = validate(&stream, &config).map(|v| v.tokens().len());
        let second = validate(&stream, &config).map(|v| v.tokens().len());
        assert_eq!(first, second);

        let bad = tokenize(br#"{"a":1,}"#, &Global).unwrap();
        assert_eq!(validate(&bad, &config).err(), validate(&bad, &config).err());
    }
}
