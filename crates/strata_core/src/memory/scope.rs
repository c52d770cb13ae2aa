//! # Scopes
//!
//! Transactional rollback of everything pushed after a point in time.
//!
//! Three forms, from most to least checked by the compiler:
//!
//! - [`Arena::scope`] runs a closure; nothing it returns can borrow the arena.
//! - [`Arena::temp_scope`] returns a [`TempScope`] guard that rewinds on drop.
//!   Nested guards borrow the outer guard mutably, so they close in LIFO
//!   order by construction.
//! - [`Arena::scope_begin`] / [`Arena::scope_end`] work with a plain
//!   [`Scope`] value. LIFO order is checked at runtime and violations are
//!   fatal.

use std::ops::{Deref, DerefMut};

use super::arena::Arena;
use crate::error::{fatal, ArenaError, ArenaResult};

/// A saved arena position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "a scope only rolls back when it is ended"]
pub struct Scope {
    arena: u64,
    position: usize,
    depth: usize,
}

impl Scope {
    /// Position the arena returns to when the scope ends.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Nesting depth among explicitly begun scopes, outermost is 0.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

impl Arena {
    /// Begins a scope at the current position.
    pub fn scope_begin(&self) -> Scope {
        let position = self.position();
        let depth = self.open_scope(position);
        Scope {
            arena: self.id(),
            position,
            depth,
        }
    }

    /// Ends a scope, rewinding to where it began.
    ///
    /// # Panics
    ///
    /// Panics if the scope came from another arena or a more recent scope
    /// is still open.
    pub fn scope_end(&mut self, scope: Scope) {
        self.try_scope_end(scope).unwrap_or_else(|err| fatal(err));
    }

    /// Fallible form of [`Arena::scope_end`].
    ///
    /// # Errors
    ///
    /// [`ArenaError::ForeignScope`], [`ArenaError::ScopeOrder`], or
    /// [`ArenaError::InvalidRollback`] if the arena was already rewound past
    /// the scope. On error the scope stays open and the arena is unchanged.
    pub fn try_scope_end(&mut self, scope: Scope) -> ArenaResult<()> {
        if scope.arena != self.id() {
            return Err(ArenaError::ForeignScope {
                scope_arena: scope.arena,
                arena: self.id(),
            });
        }
        let open = self.open_scope_count();
        if open == 0 || scope.depth != open - 1 {
            return Err(ArenaError::ScopeOrder {
                depth: scope.depth,
                open,
            });
        }
        self.try_pop_to(scope.position)?;
        self.close_scope(scope.depth)
    }

    /// Runs `f` and then rewinds everything it pushed.
    pub fn scope<R>(&mut self, f: impl FnOnce(&Self) -> R) -> R {
        let guard = self.temp_scope();
        f(&*guard)
    }

    /// Returns a guard that rewinds to the current position when dropped.
    pub fn temp_scope(&mut self) -> TempScope<'_> {
        let mark = self.position();
        TempScope { arena: self, mark }
    }
}

/// Guard that rolls its arena back on drop.
///
/// Derefs to the arena, so pushes go through the guard and cannot outlive
/// it.
///
/// ```rust,ignore
/// let mut frame = arena.temp_scope();
/// let verts = frame.push_array::<[f32; 3]>(1024);
/// {
///     let inner = frame.temp_scope();
///     let _tmp = inner.push_array::<u8>(64);
/// } // inner rewinds here
/// ```
pub struct TempScope<'a> {
    arena: &'a mut Arena,
    mark: usize,
}

impl TempScope<'_> {
    /// Position restored on drop.
    #[inline]
    #[must_use]
    pub const fn mark(&self) -> usize {
        self.mark
    }
}

impl Deref for TempScope<'_> {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        self.arena
    }
}

impl DerefMut for TempScope<'_> {
    fn deref_mut(&mut self) -> &mut Arena {
        self.arena
    }
}

impl Drop for TempScope<'_> {
    fn drop(&mut self) {
        // Already rewound further through the guard.
        if self.arena.position() >= self.mark {
            self.arena.pop_to(self.mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaParams;

    #[test]
    fn test_empty_scope_is_a_no_op() {
        let mut arena = Arena::default();
        let _ = arena.push(24, 8);
        let before = arena.position();
        let scope = arena.scope_begin();
        arena.scope_end(scope);
        assert_eq!(arena.position(), before);
        assert_eq!(arena.open_scope_count(), 0);
    }

    #[test]
    fn test_scope_rolls_back_chained_blocks() {
        let mut arena = Arena::new(ArenaParams::with_size(512));
        let scope = arena.scope_begin();
        for _ in 0..8 {
            let _ = arena.push(300, 8);
        }
        assert!(arena.stats().live_blocks > 1);
        arena.scope_end(scope);
        assert_eq!(arena.position(), scope.position());
        assert_eq!(arena.stats().live_blocks, 1);
    }

    #[test]
    fn test_nested_scopes_in_order() {
        let mut arena = Arena::default();
        let outer = arena.scope_begin();
        let _ = arena.push(10, 1);
        let inner = arena.scope_begin();
        assert_eq!(inner.depth(), 1);
        let _ = arena.push(10, 1);

        arena.scope_end(inner);
        assert_eq!(arena.position(), inner.position());
        arena.scope_end(outer);
        assert_eq!(arena.position(), outer.position());
    }

    #[test]
    fn test_out_of_order_end_is_an_error() {
        let mut arena = Arena::default();
        let outer = arena.scope_begin();
        let _inner = arena.scope_begin();
        let err = arena.try_scope_end(outer).unwrap_err();
        assert_eq!(err, ArenaError::ScopeOrder { depth: 0, open: 2 });
    }

    #[test]
    #[should_panic(expected = "scope ended out of order")]
    fn test_out_of_order_end_is_fatal() {
        let mut arena = Arena::default();
        let outer = arena.scope_begin();
        let _inner = arena.scope_begin();
        arena.scope_end(outer);
    }

    #[test]
    fn test_double_end_is_an_error() {
        let mut arena = Arena::default();
        let scope = arena.scope_begin();
        arena.scope_end(scope);
        assert!(matches!(arena.try_scope_end(scope), Err(ArenaError::ScopeOrder { .. })));
    }

    #[test]
    fn test_failed_end_leaves_scope_open() {
        let mut arena = Arena::default();
        let _ = arena.push(64, 8);
        let scope = arena.scope_begin();
        arena.pop(32); // rewound past the scope behind its back

        let position = arena.position();
        let err = arena.try_scope_end(scope).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidRollback { .. }));
        assert_eq!(arena.open_scope_count(), 1);
        assert_eq!(arena.position(), position);

        // Once the arena has moved past the scope again it can be ended.
        let _ = arena.push(64, 1);
        arena.scope_end(scope);
        assert_eq!(arena.position(), scope.position());
        assert_eq!(arena.open_scope_count(), 0);
    }

    #[test]
    fn test_foreign_scope_is_an_error() {
        let a = Arena::default();
        let mut b = Arena::default();
        let scope = a.scope_begin();
        assert!(matches!(b.try_scope_end(scope), Err(ArenaError::ForeignScope { .. })));
    }

    #[test]
    fn test_closure_scope() {
        let mut arena = Arena::default();
        let before = arena.position();
        let sum: u32 = arena.scope(|a| {
            let values = a.push_slice_copy(&[1u32, 2, 3, 4]);
            values.iter().sum()
        });
        assert_eq!(sum, 10);
        assert_eq!(arena.position(), before);
    }

    #[test]
    fn test_temp_scope_nesting() {
        let mut arena = Arena::default();
        let before = arena.position();
        {
            let mut outer = arena.temp_scope();
            let _ = outer.push(100, 8);
            let outer_pos = outer.position();
            {
                let inner = outer.temp_scope();
                let _ = inner.push(100, 8);
                assert!(inner.position() > outer_pos);
            }
            assert_eq!(outer.position(), outer_pos);
        }
        assert_eq!(arena.position(), before);
    }

    #[test]
    fn test_temp_scope_after_clear_through_guard() {
        let mut arena = Arena::default();
        let _ = arena.push(64, 8);
        {
            let mut guard = arena.temp_scope();
            let _ = guard.push(64, 8);
            guard.clear();
        }
        assert_eq!(arena.position(), crate::memory::ARENA_HEADER_SIZE);
    }
}
