// SPDX-License-Identifier: Apache-2.0

//! A two-pass JSON parser that builds into pre-sized arenas.
//!
//! The input is tokenized once, validated, then walked twice: a counting pass
//! measures every container, and a building pass writes the tree into three
//! arenas carved from one block allocated at exactly the counted size.
//! Nothing is reallocated or moved while building.
//!
//! ```
//! let doc = arenajson::parse_str(r#"{"a": 1, "b": [true, "x"]}"#).unwrap();
//! let root = doc.root();
//! assert_eq!(root.get("a").and_then(|v| v.as_f64()), Some(1.0));
//! assert_eq!(root.get("b").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
//! ```
//!
//! Errors carry the offending span and render against the input:
//!
//! ```
//! let input = br#"{"a": 1,}"#;
//! let err = arenajson::parse(input).unwrap_err();
//! println!("{}", err.diagnostic(input));
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Compile-time configuration validation
mod config_check;

mod allocator;
pub use allocator::{AllocError, Allocator, BoundedAllocator, Global};

mod arena;

mod shared;
pub use shared::{ContainerKind, Span};

mod tokenizer;
pub use tokenizer::{tokenize, Literal, Token, TokenCursor, TokenKind, TokenStream};

mod number_parser;

mod parse_error;
pub use parse_error::{ParseError, UnexpectedState};

mod diagnostic;
pub use diagnostic::Diagnostic;

mod validator;
pub use validator::{is_valid, validate, ValidatedTokens};

mod walker;

mod counter;
pub use counter::{count, Node, NodeList, Totals};

mod builder;
pub use builder::build;

mod document;
pub use document::{
    Array, ArrayIter, Document, DocumentStats, JsonStr, Object, ObjectIter, Value,
};

mod printer;
pub use printer::write_pretty;

mod parser;
pub use parser::{parse, parse_str, JsonParser, ParseConfig, DEFAULT_MAX_DEPTH};
