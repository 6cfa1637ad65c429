// SPDX-License-Identifier: Apache-2.0

//! Fixed-size arenas carved forward-only out of one block.
//!
//! The block is acquired once at its final size and split into the values,
//! keys and chars regions. Slices are carved off the front of each region in
//! order and then filled by index; nothing is ever moved or resized.

use core::alloc::Layout;
use core::ptr::NonNull;
use core::slice;

use crate::allocator::{array_layout, AllocError, Allocator, Block};
use crate::counter::Totals;
use crate::document::RawValue;
use crate::parse_error::{ParseError, UnexpectedState};
use crate::shared::Span;

/// One region of the document block.
pub(crate) struct Arena<T> {
    base: NonNull<T>,
    len: usize,
    carved: usize,
}

impl<T: Copy> Arena<T> {
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` values of `T` for
    /// as long as the arena is used, and not aliased by anything else.
    unsafe fn fill(base: NonNull<T>, len: usize, value: T) -> Self {
        for i in 0..len {
            // SAFETY: `i < len`, inside the region
            unsafe { base.add(i).write(value) };
        }
        Self {
            base,
            len,
            carved: 0,
        }
    }

    fn slots_mut(&mut self) -> &mut [T] {
        // SAFETY: every slot was written by `fill`
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Reserve the next `count` slots.
    pub fn carve(&mut self, count: usize) -> Result<Span, ParseError> {
        let end = self
            .carved
            .checked_add(count)
            .filter(|&end| end <= self.len)
            .ok_or(UnexpectedState::ArenaOverflow)?;
        let span = Span::new(self.carved, count);
        self.carved = end;
        Ok(span)
    }

    /// Write one slot that was previously carved.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), ParseError> {
        if index >= self.carved {
            return Err(UnexpectedState::ArenaOverflow.into());
        }
        let slot = self
            .slots_mut()
            .get_mut(index)
            .ok_or(UnexpectedState::ArenaOverflow)?;
        *slot = value;
        Ok(())
    }

    /// Carve a slice and fill it from `src` in one step.
    pub fn push_slice(&mut self, src: &[T]) -> Result<Span, ParseError> {
        let span = self.carve(src.len())?;
        let dst = self
            .slots_mut()
            .get_mut(span.range())
            .ok_or(UnexpectedState::ArenaOverflow)?;
        dst.copy_from_slice(src);
        Ok(span)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Slots not carved yet.
    pub fn remaining(&self) -> usize {
        self.len - self.carved
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: every slot was written by `fill`
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }
}

/// Byte offsets of the regions inside the document block.
struct Regions {
    layout: Layout,
    keys: usize,
    chars: usize,
}

impl Regions {
    fn for_totals(totals: &Totals) -> Result<Self, AllocError> {
        let values = array_layout::<RawValue>(totals.values)?;
        let keys = array_layout::<Span>(totals.keys)?;
        let chars = array_layout::<u8>(totals.chars)?;
        let too_big = |_| AllocError {
            requested: usize::MAX,
        };
        let (with_keys, keys_at) = values.extend(keys).map_err(too_big)?;
        let (whole, chars_at) = with_keys.extend(chars).map_err(too_big)?;
        Ok(Self {
            layout: whole.pad_to_align(),
            keys: keys_at,
            chars: chars_at,
        })
    }
}

/// The three arenas backing a document, in a single allocation.
///
/// Values hold every member of every container, keys hold the spans of object
/// keys, and chars hold the bytes of all strings.
pub(crate) struct Arenas<'a, A: Allocator> {
    values: Arena<RawValue>,
    keys: Arena<Span>,
    chars: Arena<u8>,
    block: Block<'a, A>,
}

// SAFETY: the arenas point into the block they own; the allocator is only
// shared by reference
unsafe impl<A: Allocator + Sync> Send for Arenas<'_, A> {}
unsafe impl<A: Allocator + Sync> Sync for Arenas<'_, A> {}

impl<'a, A: Allocator> Arenas<'a, A> {
    /// Acquire one block holding all three arenas sized exactly to `totals`.
    pub fn allocate(allocator: &'a A, totals: &Totals) -> Result<Self, ParseError> {
        let regions = Regions::for_totals(totals)?;
        let block = Block::new(allocator, regions.layout)?;
        // SAFETY: `Regions` lays the three ranges out disjoint and aligned
        // inside the block, which lives as long as the arenas
        let (values, keys, chars) = unsafe {
            (
                Arena::fill(block.typed(0, totals.values), totals.values, RawValue::Null),
                Arena::fill(
                    block.typed(regions.keys, totals.keys),
                    totals.keys,
                    Span::default(),
                ),
                Arena::fill(block.typed(regions.chars, totals.chars), totals.chars, 0),
            )
        };
        Ok(Self {
            values,
            keys,
            chars,
            block,
        })
    }

    pub fn values(&self) -> &Arena<RawValue> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Arena<RawValue> {
        &mut self.values
    }

    pub fn keys(&self) -> &Arena<Span> {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut Arena<Span> {
        &mut self.keys
    }

    pub fn chars(&self) -> &Arena<u8> {
        &self.chars
    }

    pub fn chars_mut(&mut self) -> &mut Arena<u8> {
        &mut self.chars
    }

    /// Size of the single block, padding included.
    pub fn bytes(&self) -> usize {
        self.block.layout().size()
    }

    /// Fails unless every slot of every arena was carved.
    pub fn ensure_full(&self) -> Result<(), ParseError> {
        if self.values.remaining() != 0 || self.keys.remaining() != 0 || self.chars.remaining() != 0
        {
            return Err(UnexpectedState::ArenaSlack.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{BoundedAllocator, Global};
    use core::mem::size_of;

    fn arenas(values: usize, keys: usize, chars: usize) -> Arenas<'static, Global> {
        let totals = Totals {
            values,
            keys,
            chars,
        };
        Arenas::allocate(&Global, &totals).unwrap()
    }

    #[test]
    fn test_carve_is_forward_only() {
        let mut arenas = arenas(0, 0, 5);
        let chars = arenas.chars_mut();
        assert_eq!(chars.carve(2), Ok(Span::new(0, 2)));
        assert_eq!(chars.carve(0), Ok(Span::new(2, 0)));
        assert_eq!(chars.carve(3), Ok(Span::new(2, 3)));
        assert_eq!(chars.remaining(), 0);
        assert_eq!(
            chars.carve(1),
            Err(ParseError::Unexpected(UnexpectedState::ArenaOverflow))
        );
    }

    #[test]
    fn test_set_requires_carved_slot() {
        let mut arenas = arenas(3, 0, 0);
        let values = arenas.values_mut();
        assert!(values.set(0, RawValue::Bool(true)).is_err());
        values.carve(2).unwrap();
        values.set(1, RawValue::Number(42.0)).unwrap();
        assert_eq!(
            values.as_slice(),
            &[RawValue::Null, RawValue::Number(42.0), RawValue::Null]
        );
        assert!(values.set(2, RawValue::Null).is_err());
    }

    #[test]
    fn test_push_slice_copies_bytes() {
        let mut arenas = arenas(0, 0, 6);
        let chars = arenas.chars_mut();
        assert_eq!(chars.push_slice(b"abc"), Ok(Span::new(0, 3)));
        assert_eq!(chars.push_slice(b"de"), Ok(Span::new(3, 2)));
        assert_eq!(&chars.as_slice()[..5], b"abcde");
        assert!(chars.push_slice(b"fg").is_err());
    }

    #[test]
    fn test_regions_do_not_overlap() {
        let mut arenas = arenas(2, 3, 4);
        arenas.values_mut().carve(2).unwrap();
        arenas.values_mut().set(0, RawValue::Number(1.5)).unwrap();
        arenas.values_mut().set(1, RawValue::Bool(false)).unwrap();
        arenas.keys_mut().carve(3).unwrap();
        for i in 0..3 {
            arenas.keys_mut().set(i, Span::new(i, 9)).unwrap();
        }
        arenas.chars_mut().push_slice(b"wxyz").unwrap();

        assert_eq!(
            arenas.values().as_slice(),
            &[RawValue::Number(1.5), RawValue::Bool(false)]
        );
        assert_eq!(
            arenas.keys().as_slice(),
            &[Span::new(0, 9), Span::new(1, 9), Span::new(2, 9)]
        );
        assert_eq!(arenas.chars().as_slice(), b"wxyz");
        assert!(arenas.bytes() >= 2 * size_of::<RawValue>() + 3 * size_of::<Span>() + 4);
    }

    #[test]
    fn test_all_arenas_share_one_allocation() {
        let allocator = BoundedAllocator::new(1 << 12);
        let totals = Totals {
            values: 4,
            keys: 2,
            chars: 10,
        };
        let arenas = Arenas::allocate(&allocator, &totals).unwrap();
        assert_eq!(allocator.live_blocks(), 1);
        assert_eq!(allocator.in_use(), arenas.bytes());
        drop(arenas);
        assert_eq!(allocator.live_blocks(), 0);
        assert_eq!(allocator.in_use(), 0);
    }

    #[test]
    fn test_empty_totals_allocate_nothing() {
        let allocator = BoundedAllocator::new(0);
        let arenas = Arenas::allocate(&allocator, &Totals::default()).unwrap();
        assert_eq!(arenas.bytes(), 0);
        assert!(arenas.values().as_slice().is_empty());
        assert_eq!(arenas.ensure_full(), Ok(()));
        assert_eq!(allocator.live_blocks(), 0);
    }

    #[test]
    fn test_ensure_full_detects_slack() {
        let mut arenas = arenas(2, 1, 3);
        arenas.values_mut().carve(2).unwrap();
        arenas.keys_mut().carve(1).unwrap();
        assert_eq!(
            arenas.ensure_full(),
            Err(ParseError::Unexpected(UnexpectedState::ArenaSlack))
        );
        arenas.chars_mut().push_slice(b"xyz").unwrap();
        assert_eq!(arenas.ensure_full(), Ok(()));
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let allocator = BoundedAllocator::new(16);
        let totals = Totals {
            values: 100,
            keys: 0,
            chars: 0,
        };
        match Arenas::allocate(&allocator, &totals) {
            Err(ParseError::AllocationFailure(_)) => {}
            Err(other) => panic!("Expected AllocationFailure, got {:?}", other),
            Ok(_) => panic!("Expected AllocationFailure"),
        }
        assert_eq!(allocator.in_use(), 0);
    }
}
