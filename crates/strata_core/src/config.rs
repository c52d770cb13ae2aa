//! # Configuration
//!
//! Arena parameters and the scratch context configuration.
//!
//! Both are plain data with defaults and can be read from TOML once at
//! startup:
//!
//! ```toml
//! [scratch]
//! size = 65536
//! allow_chaining = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default block size for a new arena (64 KiB).
pub const ARENA_DEFAULT_SIZE: usize = 64 * 1024;

/// Parameters for creating an [`Arena`](crate::Arena).
///
/// A backing buffer is not part of this struct; it is passed to
/// [`Arena::with_backing_buffer`](crate::Arena::with_backing_buffer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaParams {
    /// Size in bytes of the first block, including the block prologue.
    pub size: usize,
    /// Whether the arena may chain new blocks when the current one is full.
    pub allow_chaining: bool,
}

impl Default for ArenaParams {
    fn default() -> Self {
        Self {
            size: ARENA_DEFAULT_SIZE,
            allow_chaining: true,
        }
    }
}

impl ArenaParams {
    /// Parameters for a chaining arena whose first block is `size` bytes.
    #[must_use]
    pub const fn with_size(size: usize) -> Self {
        Self {
            size,
            allow_chaining: true,
        }
    }

    /// Parameters for a fixed-capacity arena that never chains.
    #[must_use]
    pub const fn fixed(size: usize) -> Self {
        Self {
            size,
            allow_chaining: false,
        }
    }
}

/// Configuration for a [`Context`](crate::Context).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Parameters for the scratch arena.
    pub scratch: ArenaParams,
}

impl ContextConfig {
    /// Parses a configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for a zero scratch size.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`ContextConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scratch.size == 0 {
            return Err(ConfigError::Invalid("scratch.size must be non-zero".to_string()));
        }
        Ok(())
    }
}
