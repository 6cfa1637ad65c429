// SPDX-License-Identifier: Apache-2.0

//! Injectable memory acquisition.
//!
//! Every buffer the parser owns (token stream, node list, document block) is
//! a raw [`Layout`]-sized block obtained from an [`Allocator`] passed in by the
//! caller, and handed back to it when its owner goes away.

use core::alloc::Layout;
use core::cell::Cell;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

/// Smallest capacity a growing buffer is bumped to.
const MIN_GROWTH_CAPACITY: usize = 8;

/// Memory could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// Number of bytes that were asked for.
    pub requested: usize,
}

impl AllocError {
    pub(crate) fn for_layout(layout: Layout) -> Self {
        Self {
            requested: layout.size(),
        }
    }
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "failed to allocate {} bytes", self.requested)
    }
}

/// Source of the parser's memory.
///
/// The parser asks for raw blocks described by a [`Layout`] and never asks for
/// a zero-sized one. Where the bytes come from (the heap, a fixed region, an
/// OS reservation) is up to the implementor.
///
/// # Safety
///
/// A pointer returned by `allocate` or `reallocate` must be aligned to the
/// requested layout and valid for reads and writes of its size until it is
/// passed back to `reallocate` or `free`. Blocks handed out must not overlap.
/// `reallocate` must keep the first `min(old.size(), new.size())` bytes, and
/// must leave the old block untouched when it fails.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Resize a block to `new`, which has the same alignment as `old`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator with layout `old`.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must have come from this allocator with layout `layout`, and is
    /// not used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process heap, with allocation failures reported instead of aborting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::for_layout(layout));
        }
        // SAFETY: the layout has a non-zero size
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::for_layout(layout))
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if new.size() == 0 || new.align() != old.align() {
            return Err(AllocError::for_layout(new));
        }
        // SAFETY: the caller guarantees `ptr` was allocated here with `old`
        let ptr = unsafe { alloc::alloc::realloc(ptr.as_ptr(), old, new.size()) };
        NonNull::new(ptr).ok_or(AllocError::for_layout(new))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees `ptr` was allocated here with `layout`
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Heap allocator with a fixed byte budget.
///
/// Tracks the bytes and blocks currently handed out and the high-water mark,
/// and fails any request that would push usage past `limit`.
#[derive(Debug)]
pub struct BoundedAllocator {
    limit: usize,
    in_use: Cell<usize>,
    peak: Cell<usize>,
    live_blocks: Cell<usize>,
}

impl BoundedAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_use: Cell::new(0),
            peak: Cell::new(0),
            live_blocks: Cell::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently held by live blocks.
    pub fn in_use(&self) -> usize {
        self.in_use.get()
    }

    /// Largest value `in_use` has reached.
    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    /// Blocks handed out and not freed yet.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.get()
    }

    fn reserve(&self, bytes: usize, layout: Layout) -> Result<(), AllocError> {
        let in_use = self
            .in_use
            .get()
            .checked_add(bytes)
            .filter(|&total| total <= self.limit)
            .ok_or(AllocError::for_layout(layout))?;
        self.in_use.set(in_use);
        self.peak.set(self.peak.get().max(in_use));
        Ok(())
    }

    fn release(&self, bytes: usize) {
        self.in_use.set(self.in_use.get().saturating_sub(bytes));
    }
}

unsafe impl Allocator for BoundedAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.reserve(layout.size(), layout)?;
        Global
            .allocate(layout)
            .inspect(|_| self.live_blocks.set(self.live_blocks.get() + 1))
            .inspect_err(|_| self.release(layout.size()))
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        let extra = new.size().saturating_sub(old.size());
        self.reserve(extra, new)?;
        // SAFETY: blocks handed out here came from `Global` with the same layout
        match unsafe { Global.reallocate(ptr, old, new) } {
            Ok(ptr) => {
                self.release(old.size().saturating_sub(new.size()));
                Ok(ptr)
            }
            Err(e) => {
                self.release(extra);
                Err(e)
            }
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        self.release(layout.size());
        self.live_blocks
            .set(self.live_blocks.get().saturating_sub(1));
        // SAFETY: blocks handed out here came from `Global` with the same layout
        unsafe { Global.free(ptr, layout) }
    }
}

/// Layout of `len` values of `T`, or the error for asking that much.
pub(crate) fn array_layout<T>(len: usize) -> Result<Layout, AllocError> {
    Layout::array::<T>(len).map_err(|_| AllocError {
        requested: size_of::<T>().saturating_mul(len),
    })
}

/// One raw block from an [`Allocator`], handed back to it on drop.
///
/// Zero-sized layouts are satisfied without asking the allocator.
pub(crate) struct Block<'a, A: Allocator> {
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: &'a A,
}

impl<'a, A: Allocator> Block<'a, A> {
    pub fn new(allocator: &'a A, layout: Layout) -> Result<Self, AllocError> {
        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            allocator.allocate(layout)?
        };
        Ok(Self {
            ptr,
            layout,
            allocator,
        })
    }

    /// Enlarge the block to `layout`, keeping its contents.
    pub fn grow(&mut self, layout: Layout) -> Result<(), AllocError> {
        debug_assert!(layout.size() >= self.layout.size());
        debug_assert_eq!(layout.align(), self.layout.align());
        let ptr = if layout.size() == 0 {
            self.ptr
        } else if self.layout.size() == 0 {
            self.allocator.allocate(layout)?
        } else {
            // SAFETY: `ptr` came from this allocator with `self.layout`
            unsafe { self.allocator.reallocate(self.ptr, self.layout, layout)? }
        };
        self.ptr = ptr;
        self.layout = layout;
        Ok(())
    }

    /// Pointer to `len` values of `T` starting `offset` bytes into the block.
    ///
    /// Empty ranges get a dangling, well-aligned pointer.
    ///
    /// # Safety
    ///
    /// The range must lie inside the block and `offset` must be aligned for `T`.
    pub unsafe fn typed<T>(&self, offset: usize, len: usize) -> NonNull<T> {
        if len == 0 || size_of::<T>() == 0 {
            return NonNull::dangling();
        }
        // SAFETY: the caller keeps the range inside the block
        unsafe { self.ptr.add(offset).cast() }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn allocator(&self) -> &'a A {
        self.allocator
    }
}

impl<A: Allocator> Drop for Block<'_, A> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: the block came from this allocator with this layout
            unsafe { self.allocator.free(self.ptr, self.layout) }
        }
    }
}

/// A vector whose storage is a [`Block`] and goes back to the allocator on drop.
///
/// Growth goes through [`Allocator::reallocate`] with capacity doubling.
pub(crate) struct AllocVec<'a, T, A: Allocator> {
    block: Block<'a, A>,
    cap: usize,
    len: usize,
    _marker: PhantomData<T>,
}

// SAFETY: the vector owns its elements and only shares the allocator by reference
unsafe impl<T: Send, A: Allocator + Sync> Send for AllocVec<'_, T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync> Sync for AllocVec<'_, T, A> {}

impl<'a, T, A: Allocator> AllocVec<'a, T, A> {
    pub fn with_capacity(allocator: &'a A, capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            block: Block::new(allocator, array_layout::<T>(capacity)?)?,
            cap: capacity,
            len: 0,
            _marker: PhantomData,
        })
    }

    fn base(&self) -> NonNull<T> {
        // SAFETY: the block holds exactly `cap` values of `T` from offset zero
        unsafe { self.block.typed(0, self.cap) }
    }

    pub fn push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len == self.cap {
            let grown = self.cap.saturating_mul(2).max(MIN_GROWTH_CAPACITY);
            self.block.grow(array_layout::<T>(grown)?)?;
            self.cap = grown;
        }
        // SAFETY: `len < cap`, so the slot is inside the block and unused
        unsafe { self.base().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.len = self.len.checked_sub(1)?;
        // SAFETY: the slot was initialized and is no longer counted as live
        Some(unsafe { self.base().add(self.len).read() })
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn allocator(&self) -> &'a A {
        self.block.allocator()
    }
}

impl<T, A: Allocator> Deref for AllocVec<'_, T, A> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized
        unsafe { slice::from_raw_parts(self.base().as_ptr(), self.len) }
    }
}

impl<T, A: Allocator> DerefMut for AllocVec<'_, T, A> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are initialized and borrowed uniquely
        unsafe { slice::from_raw_parts_mut(self.base().as_ptr(), self.len) }
    }
}

impl<T, A: Allocator> Drop for AllocVec<'_, T, A> {
    fn drop(&mut self) {
        let live = ptr::slice_from_raw_parts_mut(self.base().as_ptr(), self.len);
        // SAFETY: the first `len` slots are initialized and dropped once; the
        // block itself is freed when the field drops
        unsafe { ptr::drop_in_place(live) }
    }
}

impl<T: core::fmt::Debug, A: Allocator> core::fmt::Debug for AllocVec<'_, T, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;

    #[test]
    fn test_global_allocate_and_free() {
        let layout = Layout::array::<u64>(16).unwrap();
        let ptr = Global.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        unsafe { Global.free(ptr, layout) };
    }

    #[test]
    fn test_global_refuses_zero_sized_request() {
        assert_eq!(
            Global.allocate(Layout::new::<()>()),
            Err(AllocError { requested: 0 })
        );
    }

    #[test]
    fn test_bounded_tracks_usage_and_peak() {
        let allocator = BoundedAllocator::new(1024);
        let first = Layout::array::<u8>(100).unwrap();
        let second = Layout::array::<u8>(200).unwrap();
        let a = allocator.allocate(first).unwrap();
        assert_eq!(allocator.in_use(), 100);
        let b = allocator.allocate(second).unwrap();
        assert_eq!(allocator.live_blocks(), 2);
        unsafe {
            allocator.free(a, first);
            allocator.free(b, second);
        }
        assert_eq!(allocator.in_use(), 0);
        assert_eq!(allocator.live_blocks(), 0);
        assert_eq!(allocator.peak(), 300);
    }

    #[test]
    fn test_bounded_rejects_over_budget() {
        let allocator = BoundedAllocator::new(64);
        let result = allocator.allocate(Layout::array::<u32>(17).unwrap());
        assert_eq!(result, Err(AllocError { requested: 68 }));
        assert_eq!(allocator.in_use(), 0);
        assert_eq!(allocator.live_blocks(), 0);
    }

    #[test]
    fn test_bounded_reallocate_over_budget_keeps_block() {
        let allocator = BoundedAllocator::new(32);
        let small = Layout::array::<u8>(16).unwrap();
        let ptr = allocator.allocate(small).unwrap();
        unsafe { ptr.as_ptr().write_bytes(7, 16) };
        let big = Layout::array::<u8>(64).unwrap();
        assert!(unsafe { allocator.reallocate(ptr, small, big) }.is_err());
        assert_eq!(unsafe { ptr.as_ptr().add(15).read() }, 7);
        assert_eq!(allocator.in_use(), 16);
        unsafe { allocator.free(ptr, small) };
        assert_eq!(allocator.in_use(), 0);
    }

    #[test]
    fn test_alloc_vec_grows_by_doubling() {
        let allocator = BoundedAllocator::new(4096);
        {
            let mut vec = AllocVec::with_capacity(&allocator, 2).unwrap();
            for i in 0..20u32 {
                vec.push(i).unwrap();
            }
            assert_eq!(vec.len(), 20);
            assert_eq!(vec[19], 19);
            assert_eq!(vec.capacity(), 32);
            assert_eq!(allocator.in_use(), 32 * size_of::<u32>());
            assert_eq!(allocator.live_blocks(), 1);
        }
        // Dropping the guard hands the block back
        assert_eq!(allocator.in_use(), 0);
        assert_eq!(allocator.live_blocks(), 0);
    }

    #[test]
    fn test_alloc_vec_zero_capacity_allocates_lazily() {
        let allocator = BoundedAllocator::new(4096);
        let mut vec = AllocVec::with_capacity(&allocator, 0).unwrap();
        assert!(vec.is_empty());
        assert_eq!(allocator.live_blocks(), 0);
        vec.push(1u16).unwrap();
        assert_eq!(&vec[..], &[1]);
        assert_eq!(allocator.in_use(), MIN_GROWTH_CAPACITY * size_of::<u16>());
    }

    #[test]
    fn test_alloc_vec_pop_returns_in_reverse() {
        let mut vec = AllocVec::with_capacity(&Global, 4).unwrap();
        vec.push('a').unwrap();
        vec.push('b').unwrap();
        assert_eq!(vec.pop(), Some('b'));
        assert_eq!(vec.pop(), Some('a'));
        assert_eq!(vec.pop(), None);
    }

    #[test]
    fn test_alloc_vec_drops_its_elements() {
        let shared = Rc::new(());
        {
            let mut vec = AllocVec::with_capacity(&Global, 1).unwrap();
            for _ in 0..5 {
                vec.push(Rc::clone(&shared)).unwrap();
            }
            drop(vec.pop());
            assert_eq!(Rc::strong_count(&shared), 5);
        }
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn test_alloc_vec_push_fails_when_budget_exhausted() {
        let allocator = BoundedAllocator::new(8);
        let mut vec = AllocVec::with_capacity(&allocator, 8).unwrap();
        for i in 0..8u8 {
            vec.push(i).unwrap();
        }
        assert!(vec.push(8).is_err());
        assert_eq!(vec.len(), 8);
        assert_eq!(&vec[..], &[0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
