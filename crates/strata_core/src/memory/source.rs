//! # Block Sources
//!
//! The boundary between arenas and the operating system: one call to get a
//! block, one call to give it back.

// SAFETY: This module talks to the global allocator directly.
// Every unsafe block states the layout invariant it relies on.
#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

/// Alignment of every block handed out by a [`BlockSource`].
pub const BLOCK_ALIGN: usize = 16;

/// Where arenas get their blocks from.
///
/// # Safety
///
/// `allocate` must return memory that is valid for reads and writes of
/// `size` bytes, aligned to [`BLOCK_ALIGN`], and not aliased by anything
/// else until it is passed back to `release` with the same `size`.
pub unsafe trait BlockSource {
    /// Allocates a block of `size` bytes, or `None` if memory is exhausted.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block to the source.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this source with the same `size`
    /// and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

/// Block source backed by the global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemSource;

// SAFETY: memory comes from `alloc` with a BLOCK_ALIGN layout of `size` bytes.
unsafe impl BlockSource for SystemSource {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size.max(1), BLOCK_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the same layout was accepted by `allocate`.
        let layout = Layout::from_size_align_unchecked(size.max(1), BLOCK_ALIGN);
        dealloc(ptr.as_ptr(), layout);
    }
}

/// Counters kept by a [`TrackingSource`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Successful `allocate` calls.
    pub allocations: usize,
    /// `release` calls.
    pub releases: usize,
    /// Bytes currently held by arenas.
    pub live_bytes: usize,
    /// Largest `live_bytes` observed.
    pub peak_bytes: usize,
}

impl SourceStats {
    /// Blocks allocated but not yet released.
    #[must_use]
    pub const fn live_blocks(&self) -> usize {
        self.allocations - self.releases
    }
}

/// Block source that counts every call before forwarding to [`SystemSource`].
///
/// Clones share the same counters, so a test can keep one clone and hand the
/// other to an arena.
///
/// ```rust,ignore
/// let source = TrackingSource::new();
/// let arena = Arena::with_source(ArenaParams::default(), Box::new(source.clone()));
/// let before = source.stats().allocations;
/// ```
#[derive(Clone, Debug, Default)]
pub struct TrackingSource {
    stats: Arc<Mutex<SourceStats>>,
}

impl TrackingSource {
    /// Creates a source with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SourceStats {
        *self.stats.lock()
    }
}

// SAFETY: forwards to SystemSource unchanged.
unsafe impl BlockSource for TrackingSource {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let ptr = SystemSource.allocate(size)?;
        let mut stats = self.stats.lock();
        stats.allocations += 1;
        stats.live_bytes += size;
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        Some(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        SystemSource.release(ptr, size);
        let mut stats = self.stats.lock();
        stats.releases += 1;
        stats.live_bytes -= size;
    }
}
