// SPDX-License-Identifier: Apache-2.0

//! First pass: measure every container so the arenas can be sized exactly.

use log::debug;

use crate::allocator::{AllocVec, Allocator};
use crate::parse_error::{ParseError, UnexpectedState};
use crate::shared::ContainerKind;
use crate::tokenizer::{Token, TokenKind};
use crate::validator::ValidatedTokens;
use crate::walker::{walk, Visitor};

/// Nodes the list starts out with; it doubles from there.
const INITIAL_NODE_CAPACITY: usize = 128;

/// Size descriptor of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub kind: ContainerKind,
    /// Direct members (values).
    pub members: usize,
    /// Direct keys; always zero for arrays.
    pub keys: usize,
    /// Bytes of the strings this container owns directly, quotes excluded.
    pub chars: usize,
}

impl Node {
    fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            members: 0,
            keys: 0,
            chars: 0,
        }
    }
}

/// Grand totals over all nodes: the exact arena sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Value slots, i.e. the sum of member counts. The root is not a member.
    pub values: usize,
    pub keys: usize,
    pub chars: usize,
}

/// Containers of a document in pre-order, with their totals.
pub struct NodeList<'a, A: Allocator> {
    nodes: AllocVec<'a, Node, A>,
    totals: Totals,
}

impl<A: Allocator> NodeList<'_, A> {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Counter<'a, A: Allocator> {
    nodes: AllocVec<'a, Node, A>,
    /// Indices into `nodes` of the containers currently open.
    open: AllocVec<'a, usize, A>,
    totals: Totals,
}

impl<A: Allocator> Counter<'_, A> {
    fn current(&mut self) -> Result<&mut Node, ParseError> {
        let index = *self.open.last().ok_or(UnexpectedState::UnbalancedTraversal)?;
        self.nodes
            .get_mut(index)
            .ok_or_else(|| UnexpectedState::NodeListExhausted.into())
    }

    fn add_member(&mut self) -> Result<(), ParseError> {
        // The root has no parent and takes no value slot
        if self.open.is_empty() {
            return Ok(());
        }
        self.current()?.members += 1;
        self.totals.values += 1;
        Ok(())
    }

    fn add_chars(&mut self, token: &Token) -> Result<(), ParseError> {
        let len = token.span.without_quotes().len;
        self.current()?.chars += len;
        self.totals.chars += len;
        Ok(())
    }
}

impl<A: Allocator> Visitor for Counter<'_, A> {
    fn enter(&mut self, kind: ContainerKind) -> Result<(), ParseError> {
        self.add_member()?;
        let index = self.nodes.len();
        self.nodes.push(Node::new(kind))?;
        self.open.push(index)?;
        Ok(())
    }

    fn key(&mut self, token: &Token) -> Result<(), ParseError> {
        self.current()?.keys += 1;
        self.totals.keys += 1;
        self.add_chars(token)
    }

    fn scalar(&mut self, token: &Token) -> Result<(), ParseError> {
        self.add_member()?;
        if token.kind == TokenKind::String {
            self.add_chars(token)?;
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ParseError> {
        self.open
            .pop()
            .map(|_| ())
            .ok_or_else(|| UnexpectedState::UnbalancedTraversal.into())
    }
}

/// Walk `tokens` and record one [`Node`] per container, in pre-order.
pub fn count<'a, A: Allocator>(
    tokens: &ValidatedTokens<'_>,
    allocator: &'a A,
) -> Result<NodeList<'a, A>, ParseError> {
    let mut counter = Counter {
        nodes: AllocVec::with_capacity(allocator, INITIAL_NODE_CAPACITY)?,
        open: AllocVec::with_capacity(allocator, INITIAL_NODE_CAPACITY)?,
        totals: Totals::default(),
    };
    walk(tokens, &mut counter)?;
    let Counter { nodes, totals, .. } = counter;
    debug!(
        "Counted {} containers: {} values, {} keys, {} chars",
        nodes.len(),
        totals.values,
        totals.keys,
        totals.chars
    );
    Ok(NodeList { nodes, totals })
}
