//! # Arena Allocator
//!
//! A chained bump allocator with positional rollback.
//!
//! ## Layout
//!
//! ```text
//!  blocks: [B0]  [B1]  [B2]  [B3]          every block ever obtained
//!  live:    0 ──► 2 ──► 3                  oldest first, last is active
//!  free:    1                              retired, last is the head
//!
//!  logical position:
//!  |B0.size        |B2.size            |B3.pos
//!  0               B2.base_pos         B3.base_pos
//! ```
//!
//! Pushes bump the active block's cursor. When a push does not fit, a block
//! is taken from the free list (first fit, head to tail) or requested from
//! the [`BlockSource`], and appended to the live chain. Rolling back retires
//! whole blocks onto the free list instead of returning them to the source,
//! so push/pop-heavy frames stop allocating once the chain is warm.

// SAFETY: This module hands out references into raw block memory.
// Every unsafe block documents why the region is in bounds and unaliased.
#![allow(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::mem::{align_of, size_of, MaybeUninit};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Zeroable;

use super::source::{BlockSource, SystemSource, BLOCK_ALIGN};
use crate::config::ArenaParams;
use crate::error::{fatal, ArenaError, ArenaResult};

/// Bytes reserved at the start of every block.
///
/// Local block offsets start here, so logical position 0 is never an
/// allocation address and `pop_to` never rewinds into the prologue.
pub const ARENA_HEADER_SIZE: usize = 128;

const PTR_ALIGN: usize = align_of::<usize>();

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

#[inline]
const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Alignment used by the typed push helpers: at least 8 bytes.
#[inline]
pub(crate) const fn default_align<T>() -> usize {
    if align_of::<T>() > 8 {
        align_of::<T>()
    } else {
        8
    }
}

/// One contiguous region with its own bump cursor.
struct Block {
    base: NonNull<u8>,
    /// Total bytes, prologue included.
    size: usize,
    /// Logical position of this block's first byte.
    base_pos: usize,
    /// Next free offset within this block.
    pos: usize,
}

impl Block {
    const fn new(base: NonNull<u8>, size: usize) -> Self {
        Self {
            base,
            size,
            base_pos: 0,
            pos: ARENA_HEADER_SIZE,
        }
    }

    /// Start and end offsets of `size` bytes placed at the cursor.
    ///
    /// Alignment is applied to the absolute address so that externally
    /// supplied buffers still yield aligned pointers.
    fn place(&self, size: usize, align: usize) -> ArenaResult<(usize, usize)> {
        let addr = self.base.as_ptr() as usize;
        let cursor = addr.checked_add(self.pos).ok_or(ArenaError::SizeOverflow)?;
        let aligned = align_up(cursor, align).ok_or(ArenaError::SizeOverflow)?;
        let start = aligned - addr;
        let end = start.checked_add(size).ok_or(ArenaError::SizeOverflow)?;
        Ok((start, end))
    }

    fn fits(&self, size: usize, align: usize) -> bool {
        matches!(self.place(size, align), Ok((_, end)) if end <= self.size)
    }

    const fn position(&self) -> usize {
        self.base_pos + self.pos
    }
}

/// Mutable bookkeeping behind the arena's `RefCell`.
struct Chain {
    blocks: Vec<Block>,
    /// Live chain, oldest first. Never empty.
    live: Vec<usize>,
    /// Free list, head last.
    free: Vec<usize>,
    /// Positions of explicitly begun scopes, innermost last.
    open_scopes: Vec<usize>,
}

impl Chain {
    fn new(first: Block) -> Self {
        Self {
            blocks: vec![first],
            live: vec![0],
            free: Vec::new(),
            open_scopes: Vec::new(),
        }
    }

    #[inline]
    fn active_index(&self) -> usize {
        self.live[self.live.len() - 1]
    }

    #[inline]
    fn active(&self) -> &Block {
        &self.blocks[self.active_index()]
    }

    /// Unlinks the first free block, head to tail, that can hold the request.
    fn take_free(&mut self, size: usize, align: usize) -> Option<usize> {
        let blocks = &self.blocks;
        let slot = self.free.iter().rposition(|&i| blocks[i].fits(size, align))?;
        Some(self.free.remove(slot))
    }
}

/// Snapshot of an arena's memory usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaStats {
    /// Blocks on the live chain.
    pub live_blocks: usize,
    /// Blocks on the free list.
    pub free_blocks: usize,
    /// Bytes held from the block source, live and free.
    pub committed_bytes: usize,
    /// Current logical position.
    pub position: usize,
}

/// A chained bump-pointer arena.
///
/// Pushes take `&self` and return references tied to the arena borrow;
/// rollback takes `&mut self`, so nothing pushed can be used after the
/// memory behind it has been rewound.
///
/// # Thread Safety
///
/// The arena is `!Send` and `!Sync`. Use one arena per thread; the scratch
/// [`Context`](crate::Context) does exactly that.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = Arena::new(ArenaParams::default());
///
/// let mark = arena.position();
/// let ids = arena.push_array::<u32>(256);
/// ids[0] = 7;
///
/// arena.pop_to(mark); // everything after `mark` is reusable
/// ```
pub struct Arena {
    chain: RefCell<Chain>,
    source: Box<dyn BlockSource>,
    cannot_chain: bool,
    has_backing_buffer: bool,
    id: u64,
}

impl Arena {
    /// Creates an arena whose blocks come from the global allocator.
    ///
    /// # Panics
    ///
    /// Panics if the first block cannot be allocated.
    #[must_use]
    pub fn new(params: ArenaParams) -> Self {
        Self::with_source(params, Box::new(SystemSource))
    }

    /// Creates an arena, reporting allocation failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::OutOfMemory`] if the first block cannot be
    /// allocated.
    pub fn try_new(params: ArenaParams) -> ArenaResult<Self> {
        Self::try_with_source(params, Box::new(SystemSource))
    }

    /// Creates an arena that takes its blocks from `source`.
    ///
    /// # Panics
    ///
    /// Panics if the first block cannot be allocated.
    #[must_use]
    pub fn with_source(params: ArenaParams, source: Box<dyn BlockSource>) -> Self {
        Self::try_with_source(params, source).unwrap_or_else(|err| fatal(err))
    }

    /// Fallible form of [`Arena::with_source`].
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::OutOfMemory`] if `source` refuses the first
    /// block, or [`ArenaError::SizeOverflow`] for an absurd size.
    pub fn try_with_source(params: ArenaParams, source: Box<dyn BlockSource>) -> ArenaResult<Self> {
        let size = align_up(params.size.max(ARENA_HEADER_SIZE), PTR_ALIGN)
            .ok_or(ArenaError::SizeOverflow)?;
        let base = source.allocate(size).ok_or(ArenaError::OutOfMemory { size })?;
        let block = Block::new(base, size);
        let arena = Self::from_first_block(block, source, !params.allow_chaining, false);
        tracing::debug!(
            arena = arena.id,
            size,
            chaining = params.allow_chaining,
            "arena created"
        );
        Ok(arena)
    }

    /// Creates a fixed-capacity arena on top of an externally owned buffer.
    ///
    /// The arena never chains and never releases the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`ARENA_HEADER_SIZE`].
    #[must_use]
    pub fn with_backing_buffer(buffer: &'static mut [u8]) -> Self {
        Self::try_with_backing_buffer(buffer).unwrap_or_else(|err| fatal(err))
    }

    /// Fallible form of [`Arena::with_backing_buffer`].
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::BackingBufferTooSmall`] if the buffer cannot
    /// hold the block prologue.
    pub fn try_with_backing_buffer(buffer: &'static mut [u8]) -> ArenaResult<Self> {
        let size = buffer.len();
        let base = NonNull::from(buffer).cast::<u8>();
        // SAFETY: a leaked or static buffer outlives any arena and the
        // unique borrow is moved into it.
        unsafe { Self::from_raw_buffer(base, size) }
    }

    /// Creates a fixed-capacity arena on `size` bytes starting at `base`.
    ///
    /// Unlike [`Arena::with_backing_buffer`] the memory can be a stack buffer
    /// or a `Vec` the caller frees later.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::BackingBufferTooSmall`] if `size` cannot hold
    /// the block prologue.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid for reads and writes, must not be
    /// accessed through any other pointer, and must stay allocated until the
    /// arena is dropped.
    pub unsafe fn from_raw_buffer(base: NonNull<u8>, size: usize) -> ArenaResult<Self> {
        if size < ARENA_HEADER_SIZE {
            return Err(ArenaError::BackingBufferTooSmall {
                size,
                required: ARENA_HEADER_SIZE,
            });
        }
        let block = Block::new(base, size);
        let arena = Self::from_first_block(block, Box::new(SystemSource), true, true);
        tracing::debug!(arena = arena.id, size, "arena created on backing buffer");
        Ok(arena)
    }

    fn from_first_block(
        block: Block,
        source: Box<dyn BlockSource>,
        cannot_chain: bool,
        has_backing_buffer: bool,
    ) -> Self {
        Self {
            chain: RefCell::new(Chain::new(block)),
            source,
            cannot_chain,
            has_backing_buffer,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Process-unique identifier of this arena.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the arena may grow by chaining new blocks.
    #[inline]
    #[must_use]
    pub const fn is_chaining(&self) -> bool {
        !self.cannot_chain
    }

    /// Whether the arena lives in an externally owned buffer.
    #[inline]
    #[must_use]
    pub const fn has_backing_buffer(&self) -> bool {
        self.has_backing_buffer
    }

    /// The arena's logical write cursor.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.chain.borrow().active().position()
    }

    /// Memory usage snapshot.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chain = self.chain.borrow();
        ArenaStats {
            live_blocks: chain.live.len(),
            free_blocks: chain.free.len(),
            committed_bytes: chain.blocks.iter().map(|b| b.size).sum(),
            position: chain.active().position(),
        }
    }

    /// Blocks on the live chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.chain.borrow().live.len()
    }

    /// Blocks waiting on the free list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.chain.borrow().free.len()
    }

    /// Bytes held from the block source.
    #[must_use]
    pub fn committed_bytes(&self) -> usize {
        self.chain.borrow().blocks.iter().map(|b| b.size).sum()
    }

    /// Whether `ptr` points into a block on the live chain.
    #[must_use]
    pub fn contains_ptr(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let chain = self.chain.borrow();
        chain.live.iter().any(|&i| {
            let block = &chain.blocks[i];
            let start = block.base.as_ptr() as usize;
            addr >= start && addr < start + block.size
        })
    }

    /// Pushes `size` bytes aligned to `align` and returns their address.
    ///
    /// The memory is uninitialized.
    ///
    /// # Panics
    ///
    /// Panics on a non power-of-two alignment, on overflow of a
    /// non-chaining arena, and when the block source is exhausted.
    #[inline]
    pub fn push(&self, size: usize, align: usize) -> NonNull<u8> {
        self.try_push(size, align).unwrap_or_else(|err| fatal(err))
    }

    /// Fallible form of [`Arena::push`]. On error the arena is unchanged.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidAlignment`], [`ArenaError::Overflow`],
    /// [`ArenaError::OutOfMemory`] or [`ArenaError::SizeOverflow`].
    pub fn try_push(&self, size: usize, align: usize) -> ArenaResult<NonNull<u8>> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }

        let mut chain = self.chain.borrow_mut();
        let mut active = chain.active_index();
        let (mut start, mut end) = chain.blocks[active].place(size, align)?;

        if end > chain.blocks[active].size {
            if self.cannot_chain {
                let block = &chain.blocks[active];
                return Err(ArenaError::Overflow {
                    requested: end - block.pos,
                    available: block.size - block.pos,
                });
            }
            active = self.grow(&mut chain, size, align)?;
            (start, end) = chain.blocks[active].place(size, align)?;
            debug_assert!(end <= chain.blocks[active].size);
        }

        let block = &mut chain.blocks[active];
        block.pos = end;
        // SAFETY: start + size == end <= block.size, so the address is inside
        // the block's allocation and the range was never handed out since the
        // cursor last passed it.
        Ok(unsafe { NonNull::new_unchecked(block.base.as_ptr().add(start)) })
    }

    /// Appends a block able to hold the request to the live chain.
    fn grow(&self, chain: &mut Chain, size: usize, align: usize) -> ArenaResult<usize> {
        let (prev_base_pos, prev_size) = {
            let prev = chain.active();
            (prev.base_pos, prev.size)
        };

        let index = if let Some(index) = chain.take_free(size, align) {
            tracing::trace!(
                arena = self.id,
                block = index,
                size = chain.blocks[index].size,
                "reusing free block"
            );
            index
        } else {
            let needed = size
                .checked_add(ARENA_HEADER_SIZE)
                .and_then(|n| n.checked_add(align.saturating_sub(BLOCK_ALIGN)))
                .and_then(|n| align_up(n, align.max(PTR_ALIGN)))
                .ok_or(ArenaError::SizeOverflow)?;
            let block_size = prev_size.max(needed);
            let base = self
                .source
                .allocate(block_size)
                .ok_or(ArenaError::OutOfMemory { size: block_size })?;
            chain.blocks.push(Block::new(base, block_size));
            tracing::debug!(
                arena = self.id,
                size = block_size,
                blocks = chain.blocks.len(),
                "chained new block"
            );
            chain.blocks.len() - 1
        };

        chain.blocks[index].base_pos = prev_base_pos + prev_size;
        chain.live.push(index);
        Ok(index)
    }

    /// Rewinds the arena to a position previously returned by [`Arena::position`].
    ///
    /// Blocks that start at or after `target` go back to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a position the arena currently covers: ahead
    /// of the write cursor, or inside a block tail abandoned by chaining.
    #[inline]
    pub fn pop_to(&mut self, target: usize) {
        self.try_pop_to(target).unwrap_or_else(|err| fatal(err));
    }

    /// Fallible form of [`Arena::pop_to`]. On error the arena is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidRollback`] if `target` is ahead of the
    /// current position, or lies in the unused tail a block was left with
    /// when the chain grew past it.
    pub fn try_pop_to(&mut self, target: usize) -> ArenaResult<()> {
        let id = self.id;
        let chain = self.chain.get_mut();
        let position = chain.active().position();
        let target = target.max(ARENA_HEADER_SIZE);

        // The oldest live block has base_pos 0 and target is past its prologue.
        let keep = chain
            .live
            .iter()
            .rposition(|&i| chain.blocks[i].base_pos < target)
            .unwrap_or(0);
        let landing = &chain.blocks[chain.live[keep]];
        if target - landing.base_pos > landing.pos {
            return Err(ArenaError::InvalidRollback { target, position });
        }
        let local = target - landing.base_pos;

        let retired = chain.live.len() - keep - 1;
        for index in chain.live.drain(keep + 1..).rev() {
            chain.blocks[index].pos = ARENA_HEADER_SIZE;
            chain.free.push(index);
        }
        let active = chain.active_index();
        chain.blocks[active].pos = local;

        if retired > 0 {
            tracing::trace!(arena = id, retired, target, "retired blocks to free list");
        }
        Ok(())
    }

    /// Rewinds `amount` bytes, stopping at the start of the arena.
    pub fn pop(&mut self, amount: usize) {
        let position = self.position();
        self.pop_to(position.saturating_sub(amount));
    }

    /// Rewinds to the start of the arena, retiring every chained block.
    pub fn clear(&mut self) {
        self.pop_to(0);
    }

    /// Releases every block back to the block source.
    ///
    /// A no-op for arenas on a backing buffer. Dropping the arena does the
    /// same.
    pub fn release(self) {
        drop(self);
    }

    /// Records an explicitly begun scope; returns its depth.
    pub(super) fn open_scope(&self, position: usize) -> usize {
        let mut chain = self.chain.borrow_mut();
        chain.open_scopes.push(position);
        chain.open_scopes.len() - 1
    }

    /// Removes the innermost open scope if it has the given depth.
    pub(super) fn close_scope(&mut self, depth: usize) -> ArenaResult<()> {
        let open_scopes = &mut self.chain.get_mut().open_scopes;
        let open = open_scopes.len();
        if open == 0 || depth != open - 1 {
            return Err(ArenaError::ScopeOrder { depth, open });
        }
        open_scopes.pop();
        Ok(())
    }

    /// Number of explicitly begun scopes that have not ended.
    #[must_use]
    pub fn open_scope_count(&self) -> usize {
        self.chain.borrow().open_scopes.len()
    }

    // ------------------------------------------------------------------
    // Typed pushes
    // ------------------------------------------------------------------

    /// Pushes `count` uninitialized elements.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows or the push fails.
    #[allow(clippy::mut_from_ref)]
    pub fn push_array_no_zero<T>(&self, count: usize) -> &mut [MaybeUninit<T>] {
        let size = array_bytes::<T>(count);
        let ptr = self.push(size, default_align::<T>());
        // SAFETY: the region is freshly pushed, exclusive to the returned
        // borrow, aligned for T and `size_of::<T>() * count` bytes long.
        // MaybeUninit<T> has no validity requirement.
        unsafe { slice::from_raw_parts_mut(ptr.as_ptr().cast::<MaybeUninit<T>>(), count) }
    }

    /// Pushes `count` zeroed elements aligned to at least `align`.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows or the push fails.
    #[allow(clippy::mut_from_ref)]
    pub fn push_array_aligned<T: Zeroable>(&self, count: usize, align: usize) -> &mut [T] {
        let size = array_bytes::<T>(count);
        let ptr = self.push(size, align.max(align_of::<T>()));
        // SAFETY: as in `push_array_no_zero`; the bytes are zeroed before the
        // slice is formed and `T: Zeroable` makes all-zero a valid T.
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, size);
            slice::from_raw_parts_mut(ptr.as_ptr().cast::<T>(), count)
        }
    }

    /// Pushes `count` zeroed elements.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn push_array<T: Zeroable>(&self, count: usize) -> &mut [T] {
        self.push_array_aligned(count, default_align::<T>())
    }

    /// Pushes one zeroed value.
    #[allow(clippy::mut_from_ref)]
    pub fn push_struct<T: Zeroable>(&self) -> &mut T {
        let ptr = self.push(size_of::<T>(), default_align::<T>()).cast::<T>();
        // SAFETY: fresh, aligned, exclusive region of size_of::<T>() bytes;
        // all-zero is a valid T.
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, 1);
            &mut *ptr.as_ptr()
        }
    }

    /// Moves `value` into the arena.
    ///
    /// The value is never dropped; rolling back simply forgets it.
    #[allow(clippy::mut_from_ref)]
    pub fn push_value<T>(&self, value: T) -> &mut T {
        let ptr = self.push(size_of::<T>(), default_align::<T>()).cast::<T>();
        // SAFETY: fresh, aligned, exclusive region of size_of::<T>() bytes.
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Copies `src` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn push_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        let dst = self.push_array_no_zero::<T>(src.len()).as_mut_ptr().cast::<T>();
        // SAFETY: dst is a fresh region of src.len() elements that cannot
        // overlap src, which was borrowed before the push.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            slice::from_raw_parts_mut(dst, src.len())
        }
    }

    #[cfg(test)]
    fn active_block_span(&self) -> (usize, usize) {
        let chain = self.chain.borrow();
        let block = chain.active();
        let start = block.base.as_ptr() as usize;
        (start, start + block.size)
    }
}

/// Byte size of `count` elements of `T`, fatal on overflow.
#[inline]
pub(crate) fn array_bytes<T>(count: usize) -> usize {
    size_of::<T>()
        .checked_mul(count)
        .unwrap_or_else(|| fatal(ArenaError::SizeOverflow))
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaParams::default())
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("position", &stats.position)
            .field("live_blocks", &stats.live_blocks)
            .field("free_blocks", &stats.free_blocks)
            .field("committed_bytes", &stats.committed_bytes)
            .field("cannot_chain", &self.cannot_chain)
            .field("has_backing_buffer", &self.has_backing_buffer)
            .finish()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if self.has_backing_buffer {
            return;
        }
        let chain = self.chain.get_mut();
        let count = chain.blocks.len();
        for block in chain.blocks.drain(..) {
            // SAFETY: every block in `blocks` came from `self.source` with
            // exactly this size, and no borrow of the arena is alive.
            unsafe { self.source.release(block.base, block.size) };
        }
        chain.live.clear();
        chain.free.clear();
        tracing::debug!(arena = self.id, blocks = count, "arena released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::source::TrackingSource;

    fn tracked(params: ArenaParams) -> (Arena, TrackingSource) {
        let source = TrackingSource::new();
        let arena = Arena::with_source(params, Box::new(source.clone()));
        (arena, source)
    }

    fn leaked_buffer(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn test_new_arena_starts_after_prologue() {
        let arena = Arena::default();
        assert_eq!(arena.position(), ARENA_HEADER_SIZE);
        assert!(arena.is_chaining());
        assert!(!arena.has_backing_buffer());
        assert_eq!(arena.stats().committed_bytes, 64 * 1024);
    }

    #[test]
    fn test_push_respects_alignment() {
        let arena = Arena::default();
        let _ = arena.push(3, 1);
        for align in [1usize, 2, 4, 8, 16, 64, 256] {
            let ptr = arena.push(5, align);
            assert_eq!(ptr.as_ptr() as usize % align, 0, "align {align}");
        }
    }

    #[test]
    fn test_position_advances_by_size() {
        let arena = Arena::default();
        let start = arena.position();
        let _ = arena.push(40, 8);
        assert_eq!(arena.position(), start + 40);
    }

    #[test]
    fn test_round_trip_reuses_addresses() {
        let mut arena = Arena::new(ArenaParams::with_size(1024));
        let mark = arena.position();
        let first: Vec<usize> = (0..50).map(|_| arena.push(64, 8).as_ptr() as usize).collect();
        assert!(arena.stats().live_blocks > 1);

        arena.pop_to(mark);
        assert_eq!(arena.position(), mark);

        let second: Vec<usize> = (0..50).map(|_| arena.push(64, 8).as_ptr() as usize).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chaining_scenario() {
        let (arena, source) = tracked(ArenaParams::with_size(128));
        let ptr = arena.push(200, 8);

        let stats = arena.stats();
        assert_eq!(stats.live_blocks, 2);
        assert_eq!(source.stats().allocations, 2);
        // 128-byte first block, then prologue + 200 bytes in the new block.
        assert_eq!(arena.position(), 128 + ARENA_HEADER_SIZE + 200);

        let (start, end) = arena.active_block_span();
        assert!(end - start >= 200 + ARENA_HEADER_SIZE);
        let addr = ptr.as_ptr() as usize;
        assert!(addr >= start && addr + 200 <= end);
    }

    #[test]
    fn test_new_block_at_least_current_size() {
        let (arena, _source) = tracked(ArenaParams::with_size(4096));
        let _ = arena.push(4000, 8);
        let (start, end) = arena.active_block_span();
        assert_eq!(end - start, 4000 + ARENA_HEADER_SIZE);

        // The next block inherits the working size even for a small request.
        let _ = arena.push(64, 8);
        let (start, end) = arena.active_block_span();
        assert_eq!(end - start, 4000 + ARENA_HEADER_SIZE);
        assert_eq!(arena.stats().live_blocks, 3);
    }

    #[test]
    fn test_free_list_reuse_avoids_allocation() {
        let (mut arena, source) = tracked(ArenaParams::with_size(1024));
        let mark = arena.position();
        for _ in 0..4 {
            let _ = arena.push(800, 8);
        }
        let allocations = source.stats().allocations;
        assert_eq!(arena.stats().live_blocks, 4);

        arena.pop_to(mark);
        assert_eq!(arena.stats().free_blocks, 3);

        for _ in 0..4 {
            let _ = arena.push(800, 8);
        }
        assert_eq!(source.stats().allocations, allocations);
        assert_eq!(arena.stats().free_blocks, 0);
    }

    #[test]
    fn test_free_list_first_fit_skips_small_blocks() {
        let (mut arena, source) = tracked(ArenaParams::with_size(256));
        let mark = arena.position();
        let _ = arena.push(100, 8); // fits in the first block
        let _ = arena.push(100, 8); // small chained block
        let _ = arena.push(2000, 8); // oversized chained block
        arena.pop_to(mark);
        assert_eq!(arena.stats().free_blocks, 2);

        // The small block is at the head but cannot hold 200 bytes.
        let before = source.stats().allocations;
        let _ = arena.push(200, 8);
        assert_eq!(source.stats().allocations, before);
        assert_eq!(arena.stats().free_blocks, 1);
        assert_eq!(arena.stats().live_blocks, 2);
    }

    #[test]
    fn test_non_chaining_overflow_is_an_error() {
        let arena = Arena::new(ArenaParams::fixed(256));
        let before = arena.position();
        let err = arena.try_push(512, 8).unwrap_err();
        assert!(matches!(err, ArenaError::Overflow { .. }));
        assert_eq!(arena.position(), before);
    }

    #[test]
    #[should_panic(expected = "arena overflow")]
    fn test_non_chaining_overflow_is_fatal() {
        let arena = Arena::new(ArenaParams::fixed(256));
        let _ = arena.push(512, 8);
    }

    #[test]
    fn test_invalid_alignment() {
        let arena = Arena::default();
        assert_eq!(arena.try_push(8, 3), Err(ArenaError::InvalidAlignment(3)));
        assert_eq!(arena.try_push(8, 0), Err(ArenaError::InvalidAlignment(0)));
    }

    #[test]
    fn test_pop_saturates_at_start() {
        let mut arena = Arena::default();
        let _ = arena.push(100, 8);
        arena.pop(1_000_000);
        assert_eq!(arena.position(), ARENA_HEADER_SIZE);
    }

    #[test]
    fn test_pop_relative() {
        let mut arena = Arena::default();
        let _ = arena.push(100, 1);
        let before = arena.position();
        arena.pop(30);
        assert_eq!(arena.position(), before - 30);
    }

    #[test]
    fn test_clear_retires_chained_blocks() {
        let mut arena = Arena::new(ArenaParams::with_size(512));
        for _ in 0..10 {
            let _ = arena.push(300, 8);
        }
        arena.clear();
        let stats = arena.stats();
        assert_eq!(stats.live_blocks, 1);
        assert_eq!(stats.free_blocks, 9);
        assert_eq!(stats.position, ARENA_HEADER_SIZE);
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.free_block_count(), 9);
        assert_eq!(arena.committed_bytes(), 10 * 512);
    }

    #[test]
    fn test_pop_into_abandoned_tail_is_an_error() {
        let (mut arena, source) = tracked(ArenaParams::with_size(1024));
        let _ = arena.push(600, 8);
        let first_end = arena.position();
        let _ = arena.push(600, 8); // chains, leaving the first block's tail unused
        let position = arena.position();

        let err = arena.try_pop_to(first_end + 100).unwrap_err();
        assert_eq!(
            err,
            ArenaError::InvalidRollback {
                target: first_end + 100,
                position
            }
        );
        // Nothing was retired by the failed call.
        assert_eq!(arena.position(), position);
        assert_eq!(arena.block_count(), 2);
        assert_eq!(arena.free_block_count(), 0);

        // The end of the used part of the first block is still a valid target.
        arena.pop_to(first_end);
        assert_eq!(arena.position(), first_end);
        assert_eq!(arena.block_count(), 1);
        assert_eq!(source.stats().allocations, 2);
    }

    #[test]
    #[should_panic(expected = "invalid rollback")]
    fn test_pop_into_abandoned_tail_is_fatal() {
        let mut arena = Arena::new(ArenaParams::with_size(1024));
        let _ = arena.push(600, 8);
        let first_end = arena.position();
        let _ = arena.push(600, 8);
        arena.pop_to(first_end + 100);
    }

    #[test]
    fn test_pop_to_block_boundary_retires_later_blocks() {
        let mut arena = Arena::new(ArenaParams::with_size(1024));
        let _ = arena.push(600, 8);
        let _ = arena.push(600, 8);
        let second_start = arena.position() - 600;
        let _ = arena.push(600, 8);
        assert_eq!(arena.block_count(), 3);

        // A target at the start of the second block's data keeps that block.
        arena.pop_to(second_start);
        assert_eq!(arena.position(), second_start);
        assert_eq!(arena.block_count(), 2);
        assert_eq!(arena.free_block_count(), 1);
    }

    #[test]
    fn test_pop_to_forward_is_an_error() {
        let mut arena = Arena::default();
        let position = arena.position();
        let err = arena.try_pop_to(position + 8).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidRollback { .. }));
    }

    #[test]
    #[should_panic(expected = "invalid rollback")]
    fn test_pop_to_forward_is_fatal() {
        let mut arena = Arena::default();
        let position = arena.position();
        arena.pop_to(position + 8);
    }

    #[test]
    fn test_release_returns_every_block() {
        let (mut arena, source) = tracked(ArenaParams::with_size(256));
        let mark = arena.position();
        for _ in 0..5 {
            let _ = arena.push(200, 8);
        }
        arena.pop_to(mark);
        let _ = arena.push(200, 8);
        arena.release();

        let stats = source.stats();
        assert_eq!(stats.live_blocks(), 0);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    fn test_backing_buffer_never_chains() {
        let buffer = leaked_buffer(512);
        let arena = Arena::with_backing_buffer(buffer);
        assert!(!arena.is_chaining());
        assert!(arena.has_backing_buffer());

        let ptr = arena.push(300, 8);
        assert!(arena.contains_ptr(ptr.as_ptr()));
        assert!(matches!(arena.try_push(300, 8), Err(ArenaError::Overflow { .. })));
        arena.release();
    }

    #[test]
    fn test_raw_buffer_from_vec() {
        let mut storage = vec![0u8; 2048];
        {
            let base = NonNull::new(storage.as_mut_ptr()).unwrap();
            // SAFETY: `storage` outlives the arena and is not touched while
            // the arena is alive.
            let arena = unsafe { Arena::from_raw_buffer(base, storage.len()) }.unwrap();
            assert!(arena.has_backing_buffer());
            assert!(!arena.is_chaining());

            let copy = arena.push_slice_copy(&[7u8; 16]);
            assert!(arena.contains_ptr(copy.as_ptr()));
            assert!(matches!(arena.try_push(4096, 8), Err(ArenaError::Overflow { .. })));
        }
        // The arena never released the buffer; the Vec still owns it.
        assert_eq!(storage.len(), 2048);
        assert!(storage[ARENA_HEADER_SIZE..].contains(&7));
    }

    #[test]
    fn test_raw_buffer_too_small() {
        let mut storage = [0u8; 64];
        let base = NonNull::new(storage.as_mut_ptr()).unwrap();
        // SAFETY: the buffer is rejected before the arena could use it.
        let err = unsafe { Arena::from_raw_buffer(base, storage.len()) }.unwrap_err();
        assert!(matches!(err, ArenaError::BackingBufferTooSmall { size: 64, .. }));
    }

    #[test]
    fn test_backing_buffer_too_small() {
        let err = Arena::try_with_backing_buffer(leaked_buffer(16)).unwrap_err();
        assert_eq!(
            err,
            ArenaError::BackingBufferTooSmall {
                size: 16,
                required: ARENA_HEADER_SIZE
            }
        );
    }

    #[test]
    fn test_tiny_size_is_rounded_up() {
        let arena = Arena::new(ArenaParams::with_size(1));
        assert_eq!(arena.stats().committed_bytes, ARENA_HEADER_SIZE);
        let _ = arena.push(8, 8);
        assert_eq!(arena.stats().live_blocks, 2);
    }

    #[test]
    fn test_push_array_is_zeroed() {
        let mut arena = Arena::default();
        let mark = arena.position();
        arena.push_array::<u64>(16).fill(u64::MAX);
        arena.pop_to(mark);

        let again = arena.push_array::<u64>(16);
        assert!(again.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_push_value_and_slice_copy() {
        let arena = Arena::default();
        let value = arena.push_value((1u8, 2u32, "kept"));
        assert_eq!(value.2, "kept");

        let copy = arena.push_slice_copy(&[1u16, 2, 3]);
        copy[1] = 20;
        assert_eq!(copy, &[1, 20, 3]);
        assert_eq!(copy.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_push_struct() {
        #[derive(Clone, Copy, Zeroable)]
        #[repr(C)]
        struct Frame {
            x: f32,
            y: f32,
            index: u32,
        }

        let arena = Arena::default();
        let frame = arena.push_struct::<Frame>();
        assert_eq!(frame.index, 0);
        frame.x = 1.5;
        frame.y = -1.0;
        assert!((frame.x + frame.y - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_sized_pushes() {
        let arena = Arena::default();
        let before = arena.position();
        let empty = arena.push_array::<u32>(0);
        assert!(empty.is_empty());
        let units = arena.push_array_no_zero::<()>(10);
        assert_eq!(units.len(), 10);
        assert!(arena.position() - before < 16);
    }

    #[test]
    fn test_arena_ids_are_unique() {
        let a = Arena::default();
        let b = Arena::default();
        assert_ne!(a.id(), b.id());
    }
}
