//! # Arena Arrays
//!
//! Growable arrays whose storage lives in an [`Arena`].
//!
//! Growing pushes a new, larger buffer and copies the live elements over; the
//! old buffer is simply abandoned to the arena and comes back on the next
//! rollback. Elements are `Copy` because arena memory never runs destructors.
//!
//! ```rust,ignore
//! let arena = Arena::default();
//! let mut ids = Array::<u32>::new_in(&arena);
//! for id in 0..1000 {
//!     ids.push(id);
//! }
//! let frozen: &[u32] = ids.into_slice();
//! ```

// SAFETY: Arrays manage typed views over untyped arena bytes.
// The header only ever exposes the initialized prefix `[0, count)`.
#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use bytemuck::Pod;

use crate::error::{fatal, ArenaError};
use crate::memory::{default_align, Arena};

/// Capacity of an array created with [`Array::new_in`].
pub const ARRAY_DEFAULT_CAP: usize = 64;

/// Storage record shared by every `Array<T>`, independent of the element type.
///
/// All growth logic lives here so it is compiled once rather than once per
/// element type.
pub struct ArrayHeader<'a> {
    data: NonNull<u8>,
    count: usize,
    capacity: usize,
    arena: &'a Arena,
}

impl<'a> ArrayHeader<'a> {
    fn new(arena: &'a Arena, stride: usize, align: usize, capacity: usize) -> Self {
        let bytes = stride
            .checked_mul(capacity)
            .unwrap_or_else(|| fatal(ArenaError::SizeOverflow));
        Self {
            data: arena.push(bytes, align),
            count: 0,
            capacity,
            arena,
        }
    }

    /// Reserves `n` slots at the end and returns the index of the first.
    ///
    /// The new slots are uninitialized.
    fn grow_by(&mut self, stride: usize, align: usize, n: usize) -> usize {
        let needed = self
            .count
            .checked_add(n)
            .unwrap_or_else(|| fatal(ArenaError::SizeOverflow));

        if needed >= self.capacity {
            let mut new_capacity = self.capacity.max(1) << 1;
            while new_capacity < needed {
                new_capacity <<= 1;
            }
            let bytes = stride
                .checked_mul(new_capacity)
                .unwrap_or_else(|| fatal(ArenaError::SizeOverflow));
            let data = self.arena.push(bytes, align);
            // SAFETY: the old buffer holds `count` initialized elements and
            // the fresh buffer is larger; arena pushes never overlap.
            unsafe {
                ptr::copy_nonoverlapping(self.data.as_ptr(), data.as_ptr(), stride * self.count);
            }
            tracing::trace!(from = self.capacity, to = new_capacity, "array grew");
            self.data = data;
            self.capacity = new_capacity;
        }

        let index = self.count;
        self.count = needed;
        index
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the array holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slots available before the next growth.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The arena the storage comes from.
    #[inline]
    #[must_use]
    pub const fn arena(&self) -> &'a Arena {
        self.arena
    }
}

/// A growable array backed by an arena.
pub struct Array<'a, T: Copy> {
    header: ArrayHeader<'a>,
    _marker: PhantomData<&'a mut [T]>,
}

impl<'a, T: Copy> Array<'a, T> {
    const STRIDE: usize = size_of::<T>();
    const ALIGN: usize = default_align::<T>();

    /// Creates an empty array with [`ARRAY_DEFAULT_CAP`] slots.
    #[must_use]
    pub fn new_in(arena: &'a Arena) -> Self {
        Self::with_capacity_in(arena, ARRAY_DEFAULT_CAP)
    }

    /// Creates an empty array with room for `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if the storage cannot be pushed.
    #[must_use]
    pub fn with_capacity_in(arena: &'a Arena, capacity: usize) -> Self {
        Self {
            header: ArrayHeader::new(arena, Self::STRIDE, Self::ALIGN, capacity),
            _marker: PhantomData,
        }
    }

    /// The type-independent part of the array.
    #[inline]
    #[must_use]
    pub const fn header(&self) -> &ArrayHeader<'a> {
        &self.header
    }

    /// Slots available before the next growth.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.header.capacity
    }

    /// The arena the storage comes from.
    #[inline]
    #[must_use]
    pub const fn arena(&self) -> &'a Arena {
        self.header.arena
    }

    #[inline]
    fn data(&self) -> *mut T {
        self.header.data.as_ptr().cast::<T>()
    }

    /// Appends `value` and returns its index.
    pub fn push(&mut self, value: T) -> usize {
        let index = self.header.grow_by(Self::STRIDE, Self::ALIGN, 1);
        // SAFETY: `grow_by` made `index` a slot inside the buffer.
        unsafe { self.data().add(index).write(value) };
        index
    }

    /// Appends `n` copies of `fill` and returns the new elements.
    pub fn push_n(&mut self, n: usize, fill: T) -> &mut [T] {
        let index = self.header.grow_by(Self::STRIDE, Self::ALIGN, n);
        // SAFETY: slots `[index, index + n)` are inside the buffer and are
        // written before the slice is formed.
        unsafe {
            let first = self.data().add(index);
            for i in 0..n {
                first.add(i).write(fill);
            }
            slice::from_raw_parts_mut(first, n)
        }
    }

    /// Appends a copy of `values` and returns the index of the first.
    pub fn extend_from_slice(&mut self, values: &[T]) -> usize {
        let index = self.header.grow_by(Self::STRIDE, Self::ALIGN, values.len());
        // SAFETY: the destination slots are reserved and unshared; `values`
        // is borrowed from outside `self`.
        unsafe {
            ptr::copy_nonoverlapping(values.as_ptr(), self.data().add(index), values.len());
        }
        index
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.header.count == 0 {
            return None;
        }
        self.header.count -= 1;
        // SAFETY: the slot was initialized and is still inside the buffer.
        Some(unsafe { self.data().add(self.header.count).read() })
    }

    /// Removes every element. Capacity is kept.
    pub fn clear(&mut self) {
        self.header.count = 0;
    }

    /// Shortens the array to `len` elements. No-op if it is already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.header.count = self.header.count.min(len);
    }

    /// Inserts `value` at `index`, shifting later elements right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.header.count;
        assert!(index <= len, "insertion index {index} out of bounds (len {len})");
        self.header.grow_by(Self::STRIDE, Self::ALIGN, 1);
        // SAFETY: after growth the buffer holds len + 1 slots; the shifted
        // range `[index, len)` moves to `[index + 1, len + 1)`.
        unsafe {
            let at = self.data().add(index);
            ptr::copy(at, at.add(1), len - index);
            at.write(value);
        }
    }

    /// Removes the element at `index`, shifting later elements left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.header.count;
        assert!(index < len, "removal index {index} out of bounds (len {len})");
        // SAFETY: `index < len`, and the tail `[index + 1, len)` is initialized.
        unsafe {
            let at = self.data().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, len - index - 1);
            self.header.count -= 1;
            value
        }
    }

    /// Removes the element at `index` and moves the last element into its
    /// place.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.header.count;
        assert!(index < len, "swap_remove index {index} out of bounds (len {len})");
        let slice = self.as_mut_slice();
        let value = slice[index];
        slice[index] = slice[len - 1];
        self.header.count -= 1;
        value
    }

    /// The elements as a slice.
    #[inline]
    #[must_use]
    pub fn to_slice(&self) -> &[T] {
        // SAFETY: `[0, count)` is initialized and the buffer is aligned for T.
        unsafe { slice::from_raw_parts(self.data(), self.header.count) }
    }

    /// The elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as `to_slice`, with exclusivity from `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.data(), self.header.count) }
    }

    /// Gives up the ability to grow and returns the elements for the rest of
    /// the arena borrow.
    #[must_use]
    pub fn into_slice(self) -> &'a mut [T] {
        // SAFETY: the buffer stays valid until the arena is rewound, which
        // needs a `&mut Arena` that cannot coexist with `'a`. The array is
        // consumed, so the returned slice is the only handle.
        unsafe { slice::from_raw_parts_mut(self.data(), self.header.count) }
    }
}

impl<T: Pod> Array<'_, T> {
    /// The elements as raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.to_slice())
    }
}

impl<T: Copy> Deref for Array<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.to_slice()
    }
}

impl<T: Copy> DerefMut for Array<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Copy> Extend<T> for Array<'_, T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<'b, T: Copy + 'b> Extend<&'b T> for Array<'_, T> {
    fn extend<I: IntoIterator<Item = &'b T>>(&mut self, iter: I) {
        for value in iter {
            self.push(*value);
        }
    }
}

impl<'s, T: Copy> IntoIterator for &'s Array<'_, T> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.to_slice().iter()
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Array<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_slice()).finish()
    }
}
