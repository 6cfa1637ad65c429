// SPDX-License-Identifier: Apache-2.0

//! The parsed tree and its read-only views.
//!
//! A [`Document`] owns three arenas carved from one block. Every view handed out ([`Value`],
//! [`Object`], [`Array`], [`JsonStr`]) is a pair of slices into them, so views
//! are `Copy` and member access is a slice index.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::allocator::{Allocator, Global};
use crate::arena::Arenas;
use crate::parse_error::ParseError;
use crate::printer::write_pretty;
use crate::shared::{from_utf8, Span};

/// A value as stored in the values arena.
///
/// Containers refer to their members by slot ranges, strings to their bytes in
/// the chars arena.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) enum RawValue {
    #[default]
    Null,
    Number(f64),
    Bool(bool),
    String(Span),
    /// `values` are the member slots; the matching keys start at `keys`.
    Object { values: Span, keys: usize },
    Array(Span),
}

/// Borrowed arena contents.
#[derive(Clone, Copy)]
struct Slots<'d> {
    values: &'d [RawValue],
    keys: &'d [Span],
    chars: &'d [u8],
}

impl<'d> Slots<'d> {
    fn value(self, raw: RawValue) -> Value<'d> {
        match raw {
            RawValue::Null => Value::Null,
            RawValue::Number(n) => Value::Number(n),
            RawValue::Bool(b) => Value::Bool(b),
            RawValue::String(span) => Value::String(self.string(span)),
            RawValue::Object { values, keys } => Value::Object(self.object(values, keys)),
            RawValue::Array(values) => Value::Array(Array {
                slots: self,
                values: self.values.get(values.range()).unwrap_or_default(),
            }),
        }
    }

    fn object(self, values: Span, keys: usize) -> Object<'d> {
        let key_range = keys..keys.saturating_add(values.len);
        Object {
            slots: self,
            values: self.values.get(values.range()).unwrap_or_default(),
            keys: self.keys.get(key_range).unwrap_or_default(),
        }
    }

    fn string(self, span: Span) -> JsonStr<'d> {
        JsonStr(self.chars.get(span.range()).unwrap_or_default())
    }
}

/// Sizes of a parsed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentStats {
    /// Objects and arrays, the root included.
    pub containers: usize,
    /// Slots in the values arena.
    pub values: usize,
    /// Slots in the keys arena.
    pub keys: usize,
    /// Bytes in the chars arena.
    pub chars: usize,
}

/// A parsed JSON document.
///
/// Immutable once built. All of its memory is one block, split into three
/// arenas, that came from the allocator `A`, and goes back there on [`Document::deallocate`] or
/// drop.
pub struct Document<'a, A: Allocator = Global> {
    arenas: Arenas<'a, A>,
    root_values: Span,
    root_keys: usize,
    containers: usize,
}

impl<'a, A: Allocator> Document<'a, A> {
    pub(crate) fn new(
        arenas: Arenas<'a, A>,
        root_values: Span,
        root_keys: usize,
        containers: usize,
    ) -> Self {
        Self {
            arenas,
            root_values,
            root_keys,
            containers,
        }
    }

    fn slots(&self) -> Slots<'_> {
        Slots {
            values: self.arenas.values().as_slice(),
            keys: self.arenas.keys().as_slice(),
            chars: self.arenas.chars().as_slice(),
        }
    }

    /// The top-level object.
    pub fn root(&self) -> Object<'_> {
        self.slots().object(self.root_values, self.root_keys)
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats {
            containers: self.containers,
            values: self.arenas.values().len(),
            keys: self.arenas.keys().len(),
            chars: self.arenas.chars().len(),
        }
    }

    /// Release the document's block back to the allocator.
    pub fn deallocate(self) {
        drop(self);
    }

    /// Indented JSON text of the whole document.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        let written = write_pretty(&mut out, Value::Object(self.root()));
        debug_assert!(written.is_ok(), "printing into a String failed");
        out
    }
}

impl<A: Allocator> fmt::Display for Document<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pretty(f, Value::Object(self.root()))
    }
}

impl<A: Allocator> fmt::Debug for Document<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// One JSON value inside a [`Document`].
#[derive(Debug, Clone, Copy)]
pub enum Value<'d> {
    Number(f64),
    Bool(bool),
    Null,
    String(JsonStr<'d>),
    Object(Object<'d>),
    Array(Array<'d>),
}

impl<'d> Value<'d> {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_json_str(&self) -> Option<JsonStr<'d>> {
        match self {
            Value::String(s) => Some(*s),
            _ => None,
        }
    }

    /// The string contents, if this is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&'d str> {
        self.as_json_str().and_then(|s| s.as_str().ok())
    }

    pub fn as_bytes(&self) -> Option<&'d [u8]> {
        self.as_json_str().map(|s| s.as_bytes())
    }

    pub fn as_object(&self) -> Option<Object<'d>> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<Array<'d>> {
        match self {
            Value::Array(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pretty(f, *self)
    }
}

/// Structural equality: same kinds, same key order, same numbers.
///
/// Compared with an explicit worklist, so nesting depth does not grow the
/// call stack.
impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        let mut pending: Vec<(Value<'_>, Value<'_>)> = Vec::new();
        pending.push((*self, *other));
        while let Some(pair) = pending.pop() {
            match pair {
                (Value::Number(a), Value::Number(b)) if a == b => {}
                (Value::Bool(a), Value::Bool(b)) if a == b => {}
                (Value::Null, Value::Null) => {}
                (Value::String(a), Value::String(b)) if a == b => {}
                (Value::Object(a), Value::Object(b)) if a.len() == b.len() => {
                    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                        if ka != kb {
                            return false;
                        }
                        pending.push((va, vb));
                    }
                }
                (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
                    pending.extend(a.iter().zip(b.iter()));
                }
                _ => return false,
            }
        }
        true
    }
}

/// Raw bytes of a string, quotes removed and escapes left as written.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct JsonStr<'d>(&'d [u8]);

impl<'d> JsonStr<'d> {
    pub fn as_bytes(&self) -> &'d [u8] {
        self.0
    }

    pub fn as_str(&self) -> Result<&'d str, ParseError> {
        from_utf8(self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for JsonStr<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

impl PartialEq<str> for JsonStr<'_> {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for JsonStr<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

/// Lossy: invalid UTF-8 is shown as U+FFFD.
impl fmt::Display for JsonStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for JsonStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// An object: ordered key/value pairs, duplicate keys kept.
#[derive(Clone, Copy)]
pub struct Object<'d> {
    slots: Slots<'d>,
    values: &'d [RawValue],
    keys: &'d [Span],
}

impl<'d> Object<'d> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `index`th member, in document order.
    pub fn entry(&self, index: usize) -> Option<(JsonStr<'d>, Value<'d>)> {
        let key = *self.keys.get(index)?;
        let value = *self.values.get(index)?;
        Some((self.slots.string(key), self.slots.value(value)))
    }

    /// The value of the first member named `key`.
    ///
    /// A linear scan over the members.
    pub fn get(&self, key: &str) -> Option<Value<'d>> {
        self.get_all(key).next()
    }

    /// Values of every member named `key`, in document order.
    pub fn get_all<'k>(&self, key: &'k str) -> impl Iterator<Item = Value<'d>> + 'k
    where
        'd: 'k,
    {
        self.iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = JsonStr<'d>> {
        self.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> ObjectIter<'d> {
        ObjectIter {
            object: *self,
            next: 0,
        }
    }
}

impl<'d> IntoIterator for Object<'d> {
    type Item = (JsonStr<'d>, Value<'d>);
    type IntoIter = ObjectIter<'d>;

    fn into_iter(self) -> ObjectIter<'d> {
        self.iter()
    }
}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Object(")?;
        write_pretty(f, Value::Object(*self))?;
        f.write_str(")")
    }
}

/// Iterator over the members of an [`Object`].
#[derive(Clone)]
pub struct ObjectIter<'d> {
    object: Object<'d>,
    next: usize,
}

impl<'d> Iterator for ObjectIter<'d> {
    type Item = (JsonStr<'d>, Value<'d>);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.object.entry(self.next)?;
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.object.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ObjectIter<'_> {}

/// An array: ordered values.
#[derive(Clone, Copy)]
pub struct Array<'d> {
    slots: Slots<'d>,
    values: &'d [RawValue],
}

impl<'d> Array<'d> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `index`th element, in constant time.
    pub fn get(&self, index: usize) -> Option<Value<'d>> {
        self.values.get(index).map(|raw| self.slots.value(*raw))
    }

    pub fn iter(&self) -> ArrayIter<'d> {
        ArrayIter {
            array: *self,
            next: 0,
        }
    }
}

impl<'d> IntoIterator for Array<'d> {
    type Item = Value<'d>;
    type IntoIter = ArrayIter<'d>;

    fn into_iter(self) -> ArrayIter<'d> {
        self.iter()
    }
}

impl fmt::Debug for Array<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Array(")?;
        write_pretty(f, Value::Array(*self))?;
        f.write_str(")")
    }
}

/// Iterator over the elements of an [`Array`].
#[derive(Clone)]
pub struct ArrayIter<'d> {
    array: Array<'d>,
    next: usize,
}

impl<'d> Iterator for ArrayIter<'d> {
    type Item = Value<'d>;

    fn next(&mut self) -> Option<Value<'d>> {
        let value = self.array.get(self.next)?;
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.array.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ArrayIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;
    use test_log::test;

    #[test]
    fn test_scalar_helpers() {
        let doc = parse_str(r#"{"n": -2.5, "t": true, "z": null, "s": "hi"}"#).unwrap();
        let root = doc.root();
        assert_eq!(root.get("n").and_then(|v| v.as_f64()), Some(-2.5));
        assert_eq!(root.get("t").and_then(|v| v.as_bool()), Some(true));
        assert!(root.get("z").is_some_and(|v| v.is_null()));
        assert_eq!(root.get("s").and_then(|v| v.as_str()), Some("hi"));
        assert_eq!(root.get("s").and_then(|v| v.as_bytes()), Some(&b"hi"[..]));
        assert_eq!(root.get("n").and_then(|v| v.as_str()), None);
        assert!(root.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let doc = parse_str(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
        let root = doc.root();
        assert_eq!(root.len(), 3);
        assert_eq!(root.get("a").and_then(|v| v.as_f64()), Some(1.0));
        let all: Vec<f64> = root.get_all("a").filter_map(|v| v.as_f64()).collect();
        assert_eq!(all, vec![1.0, 3.0]);
        assert!(root.contains_key("b"));
        assert!(!root.contains_key("c"));
    }

    #[test]
    fn test_array_index_and_iter() {
        let doc = parse_str(r#"{"xs": [10, "x", [], {}]}"#).unwrap();
        let xs = doc.root().get("xs").and_then(|v| v.as_array()).unwrap();
        assert_eq!(xs.len(), 4);
        assert_eq!(xs.get(0).and_then(|v| v.as_f64()), Some(10.0));
        assert_eq!(xs.get(1).and_then(|v| v.as_str()), Some("x"));
        assert!(xs.get(2).and_then(|v| v.as_array()).is_some_and(|a| a.is_empty()));
        assert!(xs.get(3).and_then(|v| v.as_object()).is_some_and(|o| o.is_empty()));
        assert!(xs.get(4).is_none());
        assert_eq!(xs.iter().len(), 4);
    }

    #[test]
    fn test_escapes_are_kept_verbatim() {
        let doc = parse_str(r#"{"k\"ey": "a\nb"}"#).unwrap();
        let (key, value) = doc.root().entry(0).unwrap();
        assert_eq!(key, r#"k\"ey"#);
        assert_eq!(value.as_bytes(), Some(&br"a\nb"[..]));
    }

    #[test]
    fn test_invalid_utf8_string() {
        let doc = crate::parse(b"{\"k\": \"\xff\"}").unwrap();
        let value = doc.root().get("k").unwrap();
        assert_eq!(value.as_str(), None);
        let raw = value.as_json_str().unwrap();
        assert!(matches!(raw.as_str(), Err(ParseError::InvalidUtf8(_))));
        assert_eq!(raw.to_string(), "\u{FFFD}");
    }

    #[test]
    fn test_structural_equality() {
        let a = parse_str(r#"{"x": [1, {"y": "z"}], "w": null}"#).unwrap();
        let b = parse_str(r#"{ "x" : [ 1.0 , { "y" : "z" } ] , "w" : null }"#).unwrap();
        let c = parse_str(r#"{"w": null, "x": [1, {"y": "z"}]}"#).unwrap();
        assert_eq!(Value::Object(a.root()), Value::Object(b.root()));
        // Key order matters
        assert_ne!(Value::Object(a.root()), Value::Object(c.root()));
    }

    #[test]
    fn test_stats() {
        let doc = parse_str(r#"{"ab": [1, "xyz"], "c": {}}"#).unwrap();
        assert_eq!(
            doc.stats(),
            DocumentStats {
                containers: 3,
                values: 4,
                keys: 2,
                chars: 6
            }
        );
    }
}
