// SPDX-License-Identifier: Apache-2.0

//! The one traversal shared by the counting and building passes.
//!
//! Both passes must see containers, keys and scalars in exactly the same
//! order, so neither walks the tokens itself: each implements [`Visitor`]
//! and is driven by [`walk`].

use crate::parse_error::{ParseError, UnexpectedState};
use crate::shared::ContainerKind;
use crate::tokenizer::{Token, TokenKind};
use crate::validator::ValidatedTokens;

/// Callbacks fired in document order.
pub(crate) trait Visitor {
    /// A container was opened. Fired before any of its members.
    fn enter(&mut self, kind: ContainerKind) -> Result<(), ParseError>;

    /// An object key; the member value follows.
    fn key(&mut self, token: &Token) -> Result<(), ParseError>;

    /// A string, number, boolean or null member.
    fn scalar(&mut self, token: &Token) -> Result<(), ParseError>;

    /// The innermost open container was closed.
    fn exit(&mut self) -> Result<(), ParseError>;
}

/// Drive `visitor` over the root object of `tokens`.
///
/// The walk is iterative and keeps no stack: on a validated stream a string
/// is a key exactly when a colon follows it, and a depth counter tells when
/// the root closes.
pub(crate) fn walk<V: Visitor>(tokens: &ValidatedTokens<'_>, visitor: &mut V) -> Result<(), ParseError> {
    let mut cursor = tokens.cursor();
    let mut depth = 0usize;
    loop {
        let token = cursor.next();
        match token.kind {
            TokenKind::OpenBrace => {
                visitor.enter(ContainerKind::Object)?;
                depth += 1;
            }
            TokenKind::OpenBracket => {
                visitor.enter(ContainerKind::Array)?;
                depth += 1;
            }
            TokenKind::CloseBrace | TokenKind::CloseBracket => {
                visitor.exit()?;
                depth = depth
                    .checked_sub(1)
                    .ok_or(UnexpectedState::UnbalancedTraversal)?;
                if depth == 0 {
                    return Ok(());
                }
            }
            TokenKind::String if cursor.peek().kind == TokenKind::Colon => visitor.key(&token)?,
            TokenKind::String | TokenKind::Number | TokenKind::Bool | TokenKind::Null => {
                visitor.scalar(&token)?
            }
            TokenKind::Comma | TokenKind::Colon => {}
            TokenKind::End | TokenKind::Invalid => {
                return Err(UnexpectedState::UnbalancedTraversal.into())
            }
        }
    }
}
