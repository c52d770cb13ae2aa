//! # Memory Management
//!
//! Chained arenas with stack-discipline rollback.
//!
//! ## Design Philosophy
//!
//! Memory is requested from the operating system in large blocks and handed
//! out by bumping a cursor. Nothing is freed individually:
//! - A position can be saved and restored later
//! - Blocks emptied by a rollback are kept for reuse
//! - Warm frames never touch the system allocator

mod arena;
mod scope;
mod source;

pub use arena::{Arena, ArenaStats, ARENA_HEADER_SIZE};
pub(crate) use arena::default_align;
pub use scope::{Scope, TempScope};
pub use source::{BlockSource, SourceStats, SystemSource, TrackingSource, BLOCK_ALIGN};
