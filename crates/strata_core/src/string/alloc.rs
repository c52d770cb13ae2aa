//! Arena-backed string construction.
//!
//! Every string produced here is followed by a NUL byte in the arena.

use std::ffi::CStr;
use std::fmt::{self, Write};

use super::Str8;
use crate::error::{fatal, ArenaError};
use crate::memory::Arena;

/// Counts the bytes a format would produce.
struct Measure(usize);

impl Write for Measure {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Writes into a fixed buffer, refusing to go past its end.
struct Fill<'b> {
    buffer: &'b mut [u8],
    written: usize,
}

impl Write for Fill<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.written + s.len();
        let dst = self.buffer.get_mut(self.written..end).ok_or(fmt::Error)?;
        dst.copy_from_slice(s.as_bytes());
        self.written = end;
        Ok(())
    }
}

impl Arena {
    /// Pushes `len` bytes plus a NUL terminator, all zeroed.
    #[allow(clippy::mut_from_ref)]
    fn push_nul_terminated(&self, len: usize) -> &mut [u8] {
        let size = len.checked_add(1).unwrap_or_else(|| fatal(ArenaError::SizeOverflow));
        self.push_array_aligned::<u8>(size, 1)
    }

    #[allow(clippy::mut_from_ref)]
    fn push_copy_with_nul(&self, bytes: &[u8]) -> &mut [u8] {
        let buffer = self.push_nul_terminated(bytes.len());
        buffer[..bytes.len()].copy_from_slice(bytes);
        buffer
    }

    /// Copies `string` into the arena.
    pub fn push_str8_copy(&self, string: Str8<'_>) -> Str8<'_> {
        let buffer: &[u8] = self.push_copy_with_nul(string.as_bytes());
        Str8::from_bytes(&buffer[..string.len()])
    }

    /// Copies a C string into the arena, without its terminator in the length.
    pub fn push_str8_copy_cstr(&self, cstr: &CStr) -> Str8<'_> {
        self.push_str8_copy(Str8::from_bytes(cstr.to_bytes()))
    }

    /// Copies `string` into the arena as a C string.
    ///
    /// A C reader stops at the first NUL, so a string with interior NULs is
    /// cut there.
    pub fn push_cstr_copy_str8(&self, string: Str8<'_>) -> &CStr {
        let buffer: &[u8] = self.push_copy_with_nul(string.as_bytes());
        CStr::from_bytes_until_nul(buffer).unwrap_or_default()
    }

    /// Formats into a buffer of exactly `len + 1` bytes.
    fn push_formatted(&self, args: fmt::Arguments<'_>) -> (&mut [u8], usize) {
        let mut measure = Measure(0);
        let measured = match fmt::write(&mut measure, args) {
            Ok(()) => measure.0,
            Err(_) => fatal(ArenaError::FormatMismatch {
                measured: measure.0,
                written: 0,
            }),
        };

        let buffer = self.push_nul_terminated(measured);
        let mut fill = Fill {
            buffer: &mut buffer[..measured],
            written: 0,
        };
        let result = fmt::write(&mut fill, args);
        let written = fill.written;
        if result.is_err() || written != measured {
            fatal(ArenaError::FormatMismatch { measured, written });
        }
        (buffer, measured)
    }

    /// Formats `args` into the arena.
    ///
    /// The output is measured first and written second, so exactly
    /// `len + 1` bytes are pushed. Use [`str8f!`](crate::str8f) for
    /// `format!`-style calls.
    ///
    /// # Panics
    ///
    /// Panics if a `Display` impl fails or writes different output on the
    /// two passes.
    pub fn push_str8f(&self, args: fmt::Arguments<'_>) -> Str8<'_> {
        let (buffer, len) = self.push_formatted(args);
        let buffer: &[u8] = buffer;
        Str8::from_bytes(&buffer[..len])
    }

    /// Formats `args` into the arena as a C string.
    ///
    /// # Panics
    ///
    /// As [`Arena::push_str8f`].
    pub fn push_cstrf(&self, args: fmt::Arguments<'_>) -> &CStr {
        let (buffer, _) = self.push_formatted(args);
        let buffer: &[u8] = buffer;
        CStr::from_bytes_until_nul(buffer).unwrap_or_default()
    }

    /// Copies `string` with ASCII letters upper-cased.
    pub fn str8_to_upper(&self, string: Str8<'_>) -> Str8<'_> {
        let buffer = self.push_copy_with_nul(string.as_bytes());
        buffer.make_ascii_uppercase();
        let buffer: &[u8] = buffer;
        Str8::from_bytes(&buffer[..string.len()])
    }

    /// Copies `string` with ASCII letters lower-cased.
    pub fn str8_to_lower(&self, string: Str8<'_>) -> Str8<'_> {
        let buffer = self.push_copy_with_nul(string.as_bytes());
        buffer.make_ascii_lowercase();
        let buffer: &[u8] = buffer;
        Str8::from_bytes(&buffer[..string.len()])
    }
}

/// Formats into an arena: `str8f!(arena, "{}x{}", w, h)`.
#[macro_export]
macro_rules! str8f {
    ($arena:expr, $($arg:tt)*) => {
        $arena.push_str8f(::core::format_args!($($arg)*))
    };
}
