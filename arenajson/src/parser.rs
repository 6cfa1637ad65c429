// SPDX-License-Identifier: Apache-2.0

use log::{debug, warn};

use crate::allocator::{Allocator, Global};
use crate::builder::build;
use crate::counter::count;
use crate::document::Document;
use crate::parse_error::ParseError;
use crate::tokenizer::tokenize;
use crate::validator::validate;

/// Default limit on container nesting.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Runtime parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Deepest container nesting accepted; the root object is depth 1.
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parses a whole JSON document held in memory.
///
/// Runs four steps over the input: tokenize, validate, count, build. Nothing
/// is sized or allocated for the document before the input is known to be
/// well formed. Every buffer comes from the allocator `A`.
///
/// # Example
/// ```
/// use arenajson::JsonParser;
/// let doc = JsonParser::new(r#"{"name": "value"}"#).parse().unwrap();
/// assert_eq!(doc.root().get("name").and_then(|v| v.as_str()), Some("value"));
/// ```
pub struct JsonParser<'s, 'a, A: Allocator = Global> {
    input: &'s [u8],
    allocator: &'a A,
    config: ParseConfig,
}

static GLOBAL: Global = Global;

/// Constructors using the global heap.
impl<'s> JsonParser<'s, 'static, Global> {
    /// Creates a new parser for the given JSON input.
    pub fn new(input: &'s str) -> Self {
        Self::new_from_slice(input.as_bytes())
    }

    /// Creates a new parser from a byte slice.
    ///
    /// The bytes are assumed to be UTF-8 and are not checked; see
    /// [`JsonStr::as_str`](crate::JsonStr::as_str).
    pub fn new_from_slice(input: &'s [u8]) -> Self {
        Self::with_config_from_slice(input, ParseConfig::default())
    }

    /// Creates a new parser with custom settings.
    pub fn with_config(input: &'s str, config: ParseConfig) -> Self {
        Self::with_config_from_slice(input.as_bytes(), config)
    }

    /// Creates a new parser from a byte slice with custom settings.
    pub fn with_config_from_slice(input: &'s [u8], config: ParseConfig) -> Self {
        Self::with_config_and_allocator(input, config, &GLOBAL)
    }
}

impl<'s, 'a, A: Allocator> JsonParser<'s, 'a, A> {
    /// Creates a new parser that takes all of its memory from `allocator`.
    ///
    /// # Example
    /// ```
    /// use arenajson::{BoundedAllocator, JsonParser};
    /// let allocator = BoundedAllocator::new(64 * 1024);
    /// let doc = JsonParser::with_allocator(br#"{"a": [1, 2]}"#, &allocator)
    ///     .parse()
    ///     .unwrap();
    /// // Only the document's block is still held
    /// assert_eq!(allocator.live_blocks(), 1);
    /// doc.deallocate();
    /// assert_eq!(allocator.in_use(), 0);
    /// ```
    pub fn with_allocator(input: &'s [u8], allocator: &'a A) -> Self {
        Self::with_config_and_allocator(input, ParseConfig::default(), allocator)
    }

    /// Creates a new parser with custom settings and allocator.
    ///
    /// This is the core constructor that all other constructors delegate to.
    pub fn with_config_and_allocator(input: &'s [u8], config: ParseConfig, allocator: &'a A) -> Self {
        Self {
            input,
            allocator,
            config,
        }
    }

    /// The bytes this parser reads.
    pub fn input(&self) -> &'s [u8] {
        self.input
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Parses the input into a [`Document`].
    ///
    /// The token stream and node list are released before this returns,
    /// whether it succeeds or not. On error, render the source excerpt with
    /// [`ParseError::diagnostic`].
    pub fn parse(&self) -> Result<Document<'a, A>, ParseError> {
        let stream = tokenize(self.input, self.allocator).inspect_err(|e| {
            warn!("Rejected input while tokenizing: {e}");
        })?;
        let tokens = validate(&stream, &self.config).inspect_err(|e| {
            warn!("Rejected input: {e}");
        })?;
        let nodes = count(&tokens, self.allocator)?;
        let document = build(&tokens, &nodes, self.allocator)?;
        debug!("Parsed {} bytes", self.input.len());
        Ok(document)
    }
}

/// Parse `input` on the global heap with default settings.
pub fn parse(input: &[u8]) -> Result<Document<'static>, ParseError> {
    JsonParser::new_from_slice(input).parse()
}

/// [`parse`] for string input.
pub fn parse_str(input: &str) -> Result<Document<'static>, ParseError> {
    JsonParser::new(input).parse()
}
