// SPDX-License-Identifier: Apache-2.0

//! Indented JSON output.

use alloc::vec::Vec;
use core::fmt::{self, Write};

use crate::document::{ArrayIter, JsonStr, ObjectIter, Value};
use crate::shared::ContainerKind;

const INDENT: &str = "  ";

/// Remaining members of an open container.
enum Members<'d> {
    Object(ObjectIter<'d>),
    Array(ArrayIter<'d>),
}

impl<'d> Members<'d> {
    fn kind(&self) -> ContainerKind {
        match self {
            Members::Object(_) => ContainerKind::Object,
            Members::Array(_) => ContainerKind::Array,
        }
    }

    fn next(&mut self) -> Option<(Option<JsonStr<'d>>, Value<'d>)> {
        match self {
            Members::Object(iter) => iter.next().map(|(key, value)| (Some(key), value)),
            Members::Array(iter) => iter.next().map(|value| (None, value)),
        }
    }
}

/// An open container and whether a member was printed yet.
struct Frame<'d> {
    members: Members<'d>,
    started: bool,
}

/// Write `value` as JSON, two spaces per nesting level.
///
/// Depth-first over an explicit stack; nesting depth does not grow the call
/// stack. Empty containers print as `{}` and `[]`. Strings are written back
/// with the bytes they were parsed from, so escapes survive unchanged.
///
/// The only errors are the ones `out` reports.
pub fn write_pretty<W: Write + ?Sized>(out: &mut W, value: Value<'_>) -> fmt::Result {
    let mut stack: Vec<Frame<'_>> = Vec::new();
    open(out, &mut stack, value)?;

    while let Some(frame) = stack.last_mut() {
        let Some((key, member)) = frame.members.next() else {
            let kind = frame.members.kind();
            stack.pop();
            newline(out, stack.len())?;
            out.write_char(kind.closer())?;
            continue;
        };
        if frame.started {
            out.write_char(',')?;
        }
        frame.started = true;
        newline(out, stack.len())?;
        if let Some(key) = key {
            write!(out, "\"{key}\": ")?;
        }
        open(out, &mut stack, member)?;
    }
    Ok(())
}

/// Print a scalar, or print a container's opener and push it.
fn open<'d, W: Write + ?Sized>(
    out: &mut W,
    stack: &mut Vec<Frame<'d>>,
    value: Value<'d>,
) -> fmt::Result {
    let members = match value {
        Value::Number(n) => return write!(out, "{n}"),
        Value::Bool(b) => return write!(out, "{b}"),
        Value::Null => return out.write_str("null"),
        Value::String(s) => return write!(out, "\"{s}\""),
        Value::Object(o) => Members::Object(o.iter()),
        Value::Array(a) => Members::Array(a.iter()),
    };
    let kind = members.kind();
    out.write_char(kind.opener())?;
    let empty = match &members {
        Members::Object(iter) => iter.len() == 0,
        Members::Array(iter) => iter.len() == 0,
    };
    if empty {
        return out.write_char(kind.closer());
    }
    stack.push(Frame {
        members,
        started: false,
    });
    Ok(())
}

fn newline<W: Write + ?Sized>(out: &mut W, depth: usize) -> fmt::Result {
    out.write_char('\n')?;
    for _ in 0..depth {
        out.write_str(INDENT)?;
    }
    Ok(())
}
