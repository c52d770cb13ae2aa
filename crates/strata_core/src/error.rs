//! # Error Types
//!
//! Everything that can go wrong inside the allocator.
//!
//! The default API treats these as fatal: [`fatal`] logs the error and
//! panics, and the release profile turns that panic into an abort. The
//! `try_*` entry points hand the same errors back as values instead.

use thiserror::Error;

/// Errors raised by arenas, scopes and the scratch context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// The block source could not provide memory.
    #[error("out of memory: block source refused {size} bytes")]
    OutOfMemory {
        /// Size of the refused block.
        size: usize,
    },

    /// A push did not fit and the arena is not allowed to chain a new block.
    #[error(
        "arena overflow: requested {requested} bytes, {available} available in a non-chaining arena"
    )]
    Overflow {
        /// Bytes requested, including alignment padding.
        requested: usize,
        /// Bytes left in the only block.
        available: usize,
    },

    /// Alignment was zero or not a power of two.
    #[error("invalid alignment: {0} is not a power of two")]
    InvalidAlignment(usize),

    /// Size arithmetic overflowed `usize`.
    #[error("allocation size overflow")]
    SizeOverflow,

    /// Rollback target lies ahead of the current write cursor.
    #[error("invalid rollback: target {target} is past position {position}")]
    InvalidRollback {
        /// Requested logical position.
        target: usize,
        /// Logical position at the time of the call.
        position: usize,
    },

    /// A scope was ended while a more recent one was still open.
    #[error("scope ended out of order: depth {depth} ended with {open} scopes open")]
    ScopeOrder {
        /// Depth of the scope being ended.
        depth: usize,
        /// Number of scopes open on the arena.
        open: usize,
    },

    /// A scope was ended on an arena other than the one that began it.
    #[error("scope belongs to arena {scope_arena}, ended on arena {arena}")]
    ForeignScope {
        /// Arena that began the scope.
        scope_arena: u64,
        /// Arena the scope was ended on.
        arena: u64,
    },

    /// A backing buffer cannot even hold the block prologue.
    #[error("backing buffer of {size} bytes is smaller than the {required}-byte block prologue")]
    BackingBufferTooSmall {
        /// Size of the supplied buffer.
        size: usize,
        /// Minimum size.
        required: usize,
    },

    /// The two formatting passes disagreed on the output length.
    #[error("formatting produced {written} bytes after measuring {measured}")]
    FormatMismatch {
        /// Length from the measuring pass.
        measured: usize,
        /// Length from the writing pass.
        written: usize,
    },

    /// The thread's scratch context was used before `context_init` or after
    /// `context_close`.
    #[error("scratch context is not initialized on this thread")]
    ContextUninitialized,

    /// The thread's scratch context was needed exclusively while a closure
    /// was still using it.
    #[error("scratch context is already borrowed on this thread")]
    ContextBorrowed,

    /// Scratch scopes were nested deeper than the thread keeps arenas for.
    #[error("scratch scopes nested deeper than {max} levels")]
    ScratchDepth {
        /// Deepest supported nesting.
        max: usize,
    },
}

/// Result type for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds unusable values.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Stops the program on an unrecoverable allocator error.
///
/// Continuing with a corrupted allocator is worse than crashing, so this
/// never returns.
#[cold]
#[track_caller]
pub fn fatal(err: ArenaError) -> ! {
    tracing::error!(error = %err, "fatal arena error");
    panic!("{err}")
}
