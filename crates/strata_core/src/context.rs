//! # Scratch Context
//!
//! A per-thread arena for short-lived allocations.
//!
//! [`Context`] owns a scratch arena and can be passed around explicitly.
//! Each thread can also hold one implicitly, with an explicit lifecycle:
//!
//! ```rust,ignore
//! strata_core::context_init();
//!
//! let len = strata_core::scratch_scope(|scratch| {
//!     let name = str8f!(scratch, "frame_{:04}", 12);
//!     name.len()
//! });
//!
//! strata_core::context_close();
//! ```
//!
//! Threads never share a scratch arena. Using the thread's scratch before
//! `context_init` or after `context_close` is fatal.
//!
//! Scratch is the implicit allocator for code that has no arena of its own,
//! so scopes nest: a helper called inside [`scratch_scope`] may use
//! [`with_scratch`] or open a scope of its own. Each nesting level has its
//! own arena, so an inner scope rewinds only what was pushed at its level.

use std::cell::{Cell, OnceCell, Ref, RefCell, RefMut};
use std::ffi::CStr;
use std::fmt;
use std::mem::MaybeUninit;

use bytemuck::Zeroable;

use crate::array::Array;
use crate::config::ContextConfig;
use crate::error::{fatal, ArenaError, ArenaResult};
use crate::memory::{Arena, Scope, TempScope};
use crate::string::Str8;

/// Owner of a scratch arena.
#[derive(Debug)]
pub struct Context {
    scratch: Arena,
}

impl Context {
    /// Creates a context with a fresh scratch arena.
    ///
    /// # Panics
    ///
    /// Panics if the first scratch block cannot be allocated.
    #[must_use]
    pub fn new(config: &ContextConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|err| fatal(err))
    }

    /// Fallible form of [`Context::new`].
    ///
    /// # Errors
    ///
    /// Returns the arena's creation error.
    pub fn try_new(config: &ContextConfig) -> ArenaResult<Self> {
        Ok(Self {
            scratch: Arena::try_new(config.scratch)?,
        })
    }

    /// The scratch arena.
    #[inline]
    #[must_use]
    pub const fn scratch(&self) -> &Arena {
        &self.scratch
    }

    /// The scratch arena, for rollback.
    #[inline]
    pub fn scratch_mut(&mut self) -> &mut Arena {
        &mut self.scratch
    }

    /// Pushes one zeroed value.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn push_struct<T: Zeroable>(&self) -> &mut T {
        self.scratch.push_struct()
    }

    /// Pushes `count` zeroed elements.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn push_array<T: Zeroable>(&self, count: usize) -> &mut [T] {
        self.scratch.push_array(count)
    }

    /// Pushes `count` uninitialized elements.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn push_array_no_zero<T>(&self, count: usize) -> &mut [MaybeUninit<T>] {
        self.scratch.push_array_no_zero(count)
    }

    /// Copies `string` into scratch.
    #[inline]
    pub fn push_str8_copy(&self, string: Str8<'_>) -> Str8<'_> {
        self.scratch.push_str8_copy(string)
    }

    /// Copies a C string into scratch.
    #[inline]
    pub fn push_str8_copy_cstr(&self, cstr: &CStr) -> Str8<'_> {
        self.scratch.push_str8_copy_cstr(cstr)
    }

    /// Copies `string` into scratch as a C string.
    #[inline]
    pub fn push_cstr_copy_str8(&self, string: Str8<'_>) -> &CStr {
        self.scratch.push_cstr_copy_str8(string)
    }

    /// Formats into scratch. See [`Arena::push_str8f`].
    #[inline]
    pub fn push_str8f(&self, args: fmt::Arguments<'_>) -> Str8<'_> {
        self.scratch.push_str8f(args)
    }

    /// Formats into scratch as a C string.
    #[inline]
    pub fn push_cstrf(&self, args: fmt::Arguments<'_>) -> &CStr {
        self.scratch.push_cstrf(args)
    }

    /// An empty array in scratch.
    #[must_use]
    pub fn arr_init<T: Copy>(&self) -> Array<'_, T> {
        Array::new_in(&self.scratch)
    }

    /// Begins an explicit scratch scope.
    pub fn scope_begin(&self) -> Scope {
        self.scratch.scope_begin()
    }

    /// Ends an explicit scratch scope.
    pub fn scope_end(&mut self, scope: Scope) {
        self.scratch.scope_end(scope);
    }

    /// Runs `f` and rewinds scratch afterwards.
    pub fn scope<R>(&mut self, f: impl FnOnce(&Arena) -> R) -> R {
        self.scratch.scope(f)
    }

    /// A guard that rewinds scratch when dropped.
    pub fn temp_scope(&mut self) -> TempScope<'_> {
        self.scratch.temp_scope()
    }

    /// Current scratch position.
    #[inline]
    #[must_use]
    pub fn pos(&self) -> usize {
        self.scratch.position()
    }

    /// Rewinds scratch to `target`.
    pub fn pop_to(&mut self, target: usize) {
        self.scratch.pop_to(target);
    }

    /// Rewinds scratch by `amount` bytes.
    pub fn pop(&mut self, amount: usize) {
        self.scratch.pop(amount);
    }

    /// Rewinds scratch to its start.
    pub fn clear(&mut self) {
        self.scratch.clear();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}

/// Deepest nesting of [`scratch_scope`] calls on one thread.
pub const SCRATCH_MAX_DEPTH: usize = 16;

/// The thread's scratch: one context per [`scratch_scope`] nesting level.
///
/// Level 0 is created by `context_init`; deeper levels are created the first
/// time a scope reaches them and kept for reuse. A scope only ever rewinds
/// its own level, so arenas handed to enclosing closures are never touched.
struct ThreadScratch {
    config: ContextConfig,
    levels: Box<[OnceCell<RefCell<Context>>]>,
    depth: Cell<usize>,
}

impl ThreadScratch {
    fn new(config: &ContextConfig) -> Self {
        let levels = (0..=SCRATCH_MAX_DEPTH)
            .map(|depth| {
                if depth == 0 {
                    OnceCell::from(RefCell::new(Context::new(config)))
                } else {
                    OnceCell::new()
                }
            })
            .collect();
        Self {
            config: *config,
            levels,
            depth: Cell::new(0),
        }
    }

    fn level(&self, depth: usize) -> &RefCell<Context> {
        let Some(slot) = self.levels.get(depth) else {
            fatal(ArenaError::ScratchDepth {
                max: SCRATCH_MAX_DEPTH,
            })
        };
        slot.get_or_init(|| {
            tracing::debug!(depth, "scratch level created");
            RefCell::new(Context::new(&self.config))
        })
    }

    fn current(&self) -> &RefCell<Context> {
        self.level(self.depth.get())
    }
}

/// Restores the nesting depth when a scope closure returns or unwinds.
struct DepthGuard<'s> {
    depth: &'s Cell<usize>,
    outer: usize,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.outer);
    }
}

thread_local! {
    static SCRATCH: RefCell<Option<ThreadScratch>> = const { RefCell::new(None) };
}

fn with_thread_scratch<R>(f: impl FnOnce(&ThreadScratch) -> R) -> R {
    SCRATCH.with(|cell| {
        let Ok(slot) = cell.try_borrow() else {
            fatal(ArenaError::ContextBorrowed)
        };
        match slot.as_ref() {
            Some(scratch) => f(scratch),
            None => fatal(ArenaError::ContextUninitialized),
        }
    })
}

fn replace_thread_scratch(scratch: Option<ThreadScratch>) -> Option<ThreadScratch> {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut slot) => std::mem::replace(&mut *slot, scratch),
        Err(_) => fatal(ArenaError::ContextBorrowed),
    })
}

fn borrow_level(level: &RefCell<Context>) -> Ref<'_, Context> {
    level
        .try_borrow()
        .unwrap_or_else(|_| fatal(ArenaError::ContextBorrowed))
}

fn borrow_level_mut(level: &RefCell<Context>) -> RefMut<'_, Context> {
    level
        .try_borrow_mut()
        .unwrap_or_else(|_| fatal(ArenaError::ContextBorrowed))
}

/// Initializes this thread's scratch context with default settings.
///
/// # Panics
///
/// Panics if the scratch arena cannot be allocated.
pub fn context_init() {
    context_init_with(&ContextConfig::default());
}

/// Initializes this thread's scratch context.
///
/// An existing context is released and replaced.
///
/// # Panics
///
/// Panics if the scratch arena cannot be allocated, or when called from
/// inside a closure that is using the context.
pub fn context_init_with(config: &ContextConfig) {
    let scratch = ThreadScratch::new(config);
    tracing::debug!(size = config.scratch.size, "scratch context initialized");
    if replace_thread_scratch(Some(scratch)).is_some() {
        tracing::warn!("scratch context re-initialized; previous scratch released");
    }
}

/// Releases this thread's scratch context. A no-op if none is active.
///
/// # Panics
///
/// Panics when called from inside a closure that is using the context.
pub fn context_close() {
    if replace_thread_scratch(None).is_some() {
        tracing::debug!("scratch context closed");
    }
}

/// Whether this thread has an active scratch context.
#[must_use]
pub fn is_initialized() -> bool {
    SCRATCH.with(|cell| cell.try_borrow().is_ok_and(|slot| slot.is_some()))
}

/// Runs `f` with the context of the innermost active scratch scope.
///
/// # Panics
///
/// Panics if the context is not initialized, or if `f` runs inside
/// [`with_context_mut`] on the same level.
pub fn with_context<R>(f: impl FnOnce(&Context) -> R) -> R {
    with_thread_scratch(|scratch| f(&*borrow_level(scratch.current())))
}

/// Runs `f` with exclusive access to the innermost scope's context.
///
/// # Panics
///
/// Panics if the context is not initialized, or if another closure is
/// using the same level.
pub fn with_context_mut<R>(f: impl FnOnce(&mut Context) -> R) -> R {
    with_thread_scratch(|scratch| f(&mut *borrow_level_mut(scratch.current())))
}

/// Runs `f` with the innermost scope's scratch arena. Nothing is rewound.
pub fn with_scratch<R>(f: impl FnOnce(&Arena) -> R) -> R {
    with_context(|context| f(context.scratch()))
}

/// Runs `f` inside a new scratch scope and rewinds everything pushed to
/// scratch during it, including pushes made by callees through
/// [`with_scratch`] or a nested `scratch_scope`.
///
/// Scopes nest freely up to [`SCRATCH_MAX_DEPTH`] levels. Arenas handed to
/// enclosing closures are left untouched.
///
/// # Panics
///
/// Panics if the context is not initialized or the nesting is too deep.
pub fn scratch_scope<R>(f: impl FnOnce(&Arena) -> R) -> R {
    with_thread_scratch(|scratch| {
        let outer = scratch.depth.get();
        let depth = outer + 1;
        let level = scratch.level(depth);
        let mark = borrow_level(level).pos();

        let result = {
            scratch.depth.set(depth);
            let _restore = DepthGuard {
                depth: &scratch.depth,
                outer,
            };
            let context = borrow_level(level);
            f(context.scratch())
        };

        borrow_level_mut(level).pop_to(mark);
        result
    })
}

/// Rewinds the innermost scope's scratch arena to its start.
pub fn scratch_clear() {
    with_context_mut(Context::clear);
}

/// Current position of the innermost scope's scratch arena.
#[must_use]
pub fn scratch_pos() -> usize {
    with_context(Context::pos)
}

/// Rewinds the innermost scope's scratch arena by `amount` bytes.
pub fn scratch_pop(amount: usize) {
    with_context_mut(|context| context.pop(amount));
}

/// Rewinds the innermost scope's scratch arena to `target`.
pub fn scratch_pop_to(target: usize) {
    with_context_mut(|context| context.pop_to(target));
}

/// Formats into a context's scratch: `scratch_str8f!(ctx, "{}", x)`.
#[macro_export]
macro_rules! scratch_str8f {
    ($context:expr, $($arg:tt)*) => {
        $context.push_str8f(::core::format_args!($($arg)*))
    };
}
