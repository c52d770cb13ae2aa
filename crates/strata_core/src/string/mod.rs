//! # Byte Strings
//!
//! `Str8` is a borrowed run of bytes with no encoding contract. Copies made
//! through an [`Arena`](crate::Arena) carry a trailing NUL that is not
//! counted in the length, so they can be handed to C APIs unchanged.
//!
//! ## Submodules
//!
//! - `alloc` - copying, formatting and case mapping into an arena
//! - `list` - `Str8List` and splitting

mod alloc;
mod list;

pub use list::{Str8List, Str8ListIter, Str8Node};

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::str::Utf8Error;

/// A non-owning byte string.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Str8<'a> {
    bytes: &'a [u8],
}

impl<'a> Str8<'a> {
    /// The empty string.
    pub const EMPTY: Str8<'static> = Str8 { bytes: &[] };

    /// Wraps a string literal.
    #[inline]
    #[must_use]
    pub const fn lit(s: &'a str) -> Self {
        Self { bytes: s.as_bytes() }
    }

    /// Wraps raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the string has no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The underlying bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The string as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error if the bytes are not valid UTF-8.
    pub fn to_str(&self) -> Result<&'a str, Utf8Error> {
        std::str::from_utf8(self.bytes)
    }

    /// Byte-wise equality.
    #[inline]
    #[must_use]
    pub fn matches(&self, other: Str8<'_>) -> bool {
        self.bytes == other.bytes
    }

    /// Whether the string begins with `prefix`.
    #[inline]
    #[must_use]
    pub fn starts_with(&self, prefix: Str8<'_>) -> bool {
        self.bytes.starts_with(prefix.bytes)
    }

    /// Whether the string ends with `suffix`.
    #[inline]
    #[must_use]
    pub fn ends_with(&self, suffix: Str8<'_>) -> bool {
        self.bytes.ends_with(suffix.bytes)
    }

    /// Offset of the first occurrence of `needle`. An empty needle is found
    /// at 0.
    #[must_use]
    pub fn find(&self, needle: Str8<'_>) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.bytes
            .windows(needle.len())
            .position(|window| window == needle.bytes)
    }

    /// Whether `needle` occurs anywhere in the string.
    #[inline]
    #[must_use]
    pub fn contains(&self, needle: Str8<'_>) -> bool {
        self.find(needle).is_some()
    }

    /// Whether the string is a C identifier: a letter or `_`, then letters,
    /// digits and `_`.
    #[must_use]
    pub fn is_cident(&self) -> bool {
        match self.bytes.split_first() {
            Some((&head, tail)) => {
                (head.is_ascii_alphabetic() || head == b'_')
                    && tail.iter().all(|&c| c.is_ascii_alphanumeric() || c == b'_')
            }
            None => false,
        }
    }

    /// Whether the string is non-empty and all ASCII letters.
    #[must_use]
    pub fn is_alpha(&self) -> bool {
        !self.is_empty() && self.bytes.iter().all(u8::is_ascii_alphabetic)
    }

    /// Whether the string is non-empty and all decimal digits.
    #[must_use]
    pub fn is_decimal(&self) -> bool {
        !self.is_empty() && self.bytes.iter().all(u8::is_ascii_digit)
    }

    /// Whether the string is non-empty and every byte is a digit in `base`.
    ///
    /// Letters stand for digits above 9 in either case. Bases outside
    /// `2..=36` match nothing.
    #[must_use]
    pub fn is_numeric(&self, base: u32) -> bool {
        if !(2..=36).contains(&base) || self.is_empty() {
            return false;
        }
        self.bytes.iter().all(|&c| char::from(c).is_digit(base))
    }

    /// A sub-view by byte range.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Str8<'a> {
        let bounds: (Bound<usize>, Bound<usize>) =
            (range.start_bound().cloned(), range.end_bound().cloned());
        Self {
            bytes: &self.bytes[bounds],
        }
    }
}

impl<'a> From<&'a str> for Str8<'a> {
    fn from(s: &'a str) -> Self {
        Self::lit(s)
    }
}

impl<'a> From<&'a [u8]> for Str8<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Str8<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

impl PartialEq<str> for Str8<'_> {
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for Str8<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl fmt::Display for Str8<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.bytes))
    }
}

impl fmt::Debug for Str8<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.bytes.escape_ascii())
    }
}
