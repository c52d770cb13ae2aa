//! # STRATA Core
//!
//! Region allocation for programs that never free individual objects:
//! - Chained bump arenas with free-list block recycling
//! - Positional rollback and LIFO scopes
//! - Arena-backed arrays, byte strings and string lists
//! - A per-thread scratch arena
//!
//! ## Architecture Rules
//!
//! 1. **Allocate, never free** - memory comes back only by rewinding an arena
//! 2. **Borrows bound lifetimes** - anything pushed is tied to the arena
//!    borrow, so rollback cannot leave a dangling view
//! 3. **Errors are fatal by default** - `try_*` variants exist where a caller
//!    can do something useful with the error
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{Arena, ArenaParams, Array, Str8};
//!
//! let mut arena = Arena::new(ArenaParams::default());
//!
//! arena.scope(|a| {
//!     let mut names = Array::new_in(a);
//!     for part in Str8::lit("hero,slime,bat").split_by_char(a, b',').iter() {
//!         names.push(a.str8_to_upper(part));
//!     }
//! });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod array;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod string;

pub use array::{Array, ArrayHeader, ARRAY_DEFAULT_CAP};
pub use config::{ArenaParams, ContextConfig, ARENA_DEFAULT_SIZE};
pub use context::{
    context_close, context_init, context_init_with, is_initialized, scratch_clear, scratch_pop,
    scratch_pop_to, scratch_pos, scratch_scope, with_context, with_context_mut, with_scratch,
    Context, SCRATCH_MAX_DEPTH,
};
pub use error::{fatal, ArenaError, ArenaResult, ConfigError};
pub use memory::{
    Arena, ArenaStats, BlockSource, Scope, SourceStats, SystemSource, TempScope, TrackingSource,
    ARENA_HEADER_SIZE, BLOCK_ALIGN,
};
pub use string::{Str8, Str8List, Str8ListIter, Str8Node};
