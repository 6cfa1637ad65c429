// SPDX-License-Identifier: Apache-2.0

//! Second pass: lay the tree out in arenas sized by the counting pass.
//!
//! The arenas are acquired once, at exactly the counted totals. The Nth
//! container entered claims the Nth [`Node`] and carves exactly the slots that
//! node recorded. Any disagreement with the counts is reported as
//! [`UnexpectedState`] rather than written.

use log::{debug, trace};

use crate::allocator::{AllocVec, Allocator};
use crate::arena::Arenas;
use crate::counter::{Node, NodeList};
use crate::document::{Document, RawValue};
use crate::parse_error::{ParseError, UnexpectedState};
use crate::shared::{ContainerKind, Span};
use crate::tokenizer::{Literal, Token, TokenKind};
use crate::validator::ValidatedTokens;
use crate::walker::{walk, Visitor};

/// Frames the open-container stack starts out with; it doubles from there.
const INITIAL_STACK_CAPACITY: usize = 64;

/// A container being filled.
struct Open {
    node: Node,
    /// Carved member slots.
    values: Span,
    /// First carved key slot; only meaningful for objects.
    keys: usize,
    written: usize,
}

struct Builder<'t, 'n, 'a, A: Allocator> {
    tokens: &'n ValidatedTokens<'t>,
    nodes: &'n [Node],
    claimed: usize,
    arenas: Arenas<'a, A>,
    open: AllocVec<'a, Open, A>,
    /// Slots of the root object once it has been entered.
    root: Option<(Span, usize)>,
}

impl<A: Allocator> Builder<'_, '_, '_, A> {
    fn claim(&mut self, kind: ContainerKind) -> Result<Node, ParseError> {
        let node = *self
            .nodes
            .get(self.claimed)
            .ok_or(UnexpectedState::NodeListExhausted)?;
        if node.kind != kind {
            return Err(UnexpectedState::NodeKindMismatch.into());
        }
        self.claimed += 1;
        Ok(node)
    }

    fn top(&mut self) -> Result<&mut Open, ParseError> {
        self.open
            .last_mut()
            .ok_or_else(|| UnexpectedState::UnbalancedTraversal.into())
    }

    /// Write `value` into the next member slot of the innermost container.
    fn place(&mut self, value: RawValue) -> Result<(), ParseError> {
        let top = self.top()?;
        if top.written >= top.node.members {
            return Err(UnexpectedState::MemberCountMismatch.into());
        }
        let slot = top.values.start + top.written;
        top.written += 1;
        self.arenas.values_mut().set(slot, value)
    }

    fn copy_string(&mut self, token: &Token) -> Result<Span, ParseError> {
        let bytes = self.tokens.bytes(token.span.without_quotes());
        self.arenas.chars_mut().push_slice(bytes)
    }
}

impl<A: Allocator> Visitor for Builder<'_, '_, '_, A> {
    fn enter(&mut self, kind: ContainerKind) -> Result<(), ParseError> {
        let node = self.claim(kind)?;
        let values = self.arenas.values_mut().carve(node.members)?;
        let keys = self.arenas.keys_mut().carve(node.keys)?.start;
        trace!(
            "Container {} {:?}: {} members at slot {}",
            self.claimed - 1,
            kind,
            node.members,
            values.start
        );

        if self.open.is_empty() {
            if self.root.is_some() || kind != ContainerKind::Object {
                return Err(UnexpectedState::NodeKindMismatch.into());
            }
            self.root = Some((values, keys));
        } else {
            self.place(match kind {
                ContainerKind::Object => RawValue::Object { values, keys },
                ContainerKind::Array => RawValue::Array(values),
            })?;
        }
        self.open.push(Open {
            node,
            values,
            keys,
            written: 0,
        })?;
        Ok(())
    }

    fn key(&mut self, token: &Token) -> Result<(), ParseError> {
        let span = self.copy_string(token)?;
        let top = self.top()?;
        if top.node.kind != ContainerKind::Object || top.written >= top.node.keys {
            return Err(UnexpectedState::MemberCountMismatch.into());
        }
        // The key shares its index with the value that follows it
        let slot = top.keys + top.written;
        self.arenas.keys_mut().set(slot, span)
    }

    fn scalar(&mut self, token: &Token) -> Result<(), ParseError> {
        let value = match (token.kind, token.literal) {
            (TokenKind::String, Literal::None) => RawValue::String(self.copy_string(token)?),
            (TokenKind::Number, Literal::Number(n)) => RawValue::Number(n),
            (TokenKind::Bool, Literal::Bool(b)) => RawValue::Bool(b),
            (TokenKind::Null, Literal::None) => RawValue::Null,
            _ => return Err(UnexpectedState::LiteralMismatch.into()),
        };
        self.place(value)
    }

    fn exit(&mut self) -> Result<(), ParseError> {
        let done = self
            .open
            .pop()
            .ok_or(UnexpectedState::UnbalancedTraversal)?;
        if done.written != done.node.members {
            return Err(UnexpectedState::MemberCountMismatch.into());
        }
        Ok(())
    }
}

/// Build the document for `tokens` from the sizes in `nodes`.
///
/// `nodes` must come from [`count`](crate::counter::count) over the same
/// tokens. They may live in a different allocator than the document.
pub fn build<'a, A: Allocator, B: Allocator>(
    tokens: &ValidatedTokens<'_>,
    nodes: &NodeList<'_, B>,
    allocator: &'a A,
) -> Result<Document<'a, A>, ParseError> {
    let totals = nodes.totals();
    let arenas = Arenas::allocate(allocator, &totals)?;
    debug!(
        "Allocated {} bytes for {} values, {} keys, {} chars",
        arenas.bytes(),
        totals.values,
        totals.keys,
        totals.chars
    );

    let mut builder = Builder {
        tokens,
        nodes: nodes.nodes(),
        claimed: 0,
        arenas,
        open: AllocVec::with_capacity(allocator, INITIAL_STACK_CAPACITY)?,
        root: None,
    };
    walk(tokens, &mut builder)?;

    if builder.claimed != builder.nodes.len() {
        return Err(UnexpectedState::NodesLeftOver.into());
    }
    builder.arenas.ensure_full()?;
    let (root_values, root_keys) = builder.root.ok_or(UnexpectedState::NodeListExhausted)?;
    let containers = builder.claimed;
    let Builder { arenas, .. } = builder;
    debug!("Built document with {} containers", containers);
    Ok(Document::new(arenas, root_values, root_keys, containers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{BoundedAllocator, Global};
    use crate::counter::count;
    use crate::parser::ParseConfig;
    use crate::tokenizer::tokenize;
    use crate::validator::validate;
    use test_log::test;

    #[test]
    fn test_arenas_are_exactly_full() {
        let source = br#"{"a": [1, "two", {"three": [true, null]}], "b": "c"}"#;
        let stream = tokenize(source, &Global).unwrap();
        let tokens = validate(&stream, &ParseConfig::default()).unwrap();
        let nodes = count(&tokens, &Global).unwrap();
        let doc = build(&tokens, &nodes, &Global).unwrap();
        let stats = doc.stats();
        assert_eq!(stats.containers, nodes.len());
        assert_eq!(stats.values, nodes.totals().values);
        assert_eq!(stats.keys, nodes.totals().keys);
        assert_eq!(stats.chars, nodes.totals().chars);

        let three = doc
            .root()
            .get("a")
            .and_then(|v| v.as_array())
            .and_then(|a| a.get(2))
            .and_then(|v| v.as_object())
            .and_then(|o| o.get("three"))
            .and_then(|v| v.as_array())
            .unwrap();
        assert_eq!(three.get(0).and_then(|v| v.as_bool()), Some(true));
        assert!(three.get(1).is_some_and(|v| v.is_null()));
    }

    #[test]
    fn test_mismatched_nodes_are_rejected() {
        let stream = tokenize(br#"{"a": [1, 2]}"#, &Global).unwrap();
        let tokens = validate(&stream, &ParseConfig::default()).unwrap();

        // Counts from a different document must not be written through
        let other = tokenize(br#"{"a": {"b": 1}}"#, &Global).unwrap();
        let other_tokens = validate(&other, &ParseConfig::default()).unwrap();
        let wrong = count(&other_tokens, &Global).unwrap();
        assert_eq!(
            build(&tokens, &wrong, &Global).unwrap_err(),
            ParseError::Unexpected(UnexpectedState::NodeKindMismatch)
        );

        let shorter = tokenize(br#"{"a": [1]}"#, &Global).unwrap();
        let shorter_tokens = validate(&shorter, &ParseConfig::default()).unwrap();
        let too_few = count(&shorter_tokens, &Global).unwrap();
        assert_eq!(
            build(&tokens, &too_few, &Global).unwrap_err(),
            ParseError::Unexpected(UnexpectedState::MemberCountMismatch)
        );

        let extra = tokenize(br#"{"a": [1, 2], "b": []}"#, &Global).unwrap();
        let extra_tokens = validate(&extra, &ParseConfig::default()).unwrap();
        let too_many = count(&extra_tokens, &Global).unwrap();
        assert!(matches!(
            build(&tokens, &too_many, &Global),
            Err(ParseError::Unexpected(
                UnexpectedState::MemberCountMismatch | UnexpectedState::NodesLeftOver
            ))
        ));
    }

    #[test]
    fn test_arena_allocation_failure_releases_everything() {
        let source = br#"{"k": "a fairly long string value", "xs": [1, 2, 3, 4]}"#;
        let stream = tokenize(source, &Global).unwrap();
        let tokens = validate(&stream, &ParseConfig::default()).unwrap();
        let nodes = count(&tokens, &Global).unwrap();

        let allocator = BoundedAllocator::new(64);
        assert!(matches!(
            build(&tokens, &nodes, &allocator),
            Err(ParseError::AllocationFailure(_))
        ));
        assert_eq!(allocator.in_use(), 0);
    }

    #[test]
    fn test_document_memory_returns_on_deallocate() {
        let source = br#"{"k": "v", "xs": [1, 2, 3]}"#;
        let stream = tokenize(source, &Global).unwrap();
        let tokens = validate(&stream, &ParseConfig::default()).unwrap();
        let nodes = count(&tokens, &Global).unwrap();

        let allocator = BoundedAllocator::new(1 << 16);
        let doc = build(&tokens, &nodes, &allocator).unwrap();
        // The builder's own stack is gone; only the document block is left
        assert_eq!(allocator.live_blocks(), 1);
        assert!(allocator.in_use() > 0);
        doc.deallocate();
        assert_eq!(allocator.in_use(), 0);
        assert_eq!(allocator.live_blocks(), 0);
    }
}
