//! Logical address to shard file mapping.
//!
//! The logical address space is cut into fixed-size shards. Shard `n` covers
//! bytes `[n * shard_size, (n + 1) * shard_size)` and lives at
//!
//! ```text
//! <outer>/<inner>/<start>
//!   outer = n / 10000        (at least 2 digits)
//!   inner = (n / 100) % 100  (2 digits)
//!   start = n * shard_size   (at least 10 digits)
//! ```
//!
//! so no directory holds more than 100 shard files or 100 subdirectories.
//! Resolution is pure arithmetic: no I/O, no state, no failure mode.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bytes per shard used when nothing else is configured (100 MB).
pub const DEFAULT_SHARD_SIZE: u64 = 100_000_000;

/// Where a logical range lands on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardAddress {
    /// Shard path relative to the store's base directory, `/`-separated.
    pub path: String,
    /// Offset of the first requested byte inside the shard file.
    pub in_file_offset: u64,
    /// Requested size clipped so the range never crosses the shard's end.
    pub clipped_size: u64,
}

/// Fixed shard geometry of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardLayout {
    shard_size: u64,
}

impl Default for ShardLayout {
    fn default() -> Self {
        Self {
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

impl ShardLayout {
    /// Create a layout with the given shard size.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroShardSize`] if `shard_size` is zero.
    pub const fn new(shard_size: u64) -> Result<Self, ConfigError> {
        if shard_size == 0 {
            return Err(ConfigError::ZeroShardSize);
        }
        Ok(Self { shard_size })
    }

    /// Bytes per shard.
    #[must_use]
    pub const fn shard_size(&self) -> u64 {
        self.shard_size
    }

    /// Index of the shard containing `offset`.
    #[must_use]
    pub const fn shard_index(&self, offset: u64) -> u64 {
        offset / self.shard_size
    }

    /// Absolute logical offset of the first byte of shard `index`.
    ///
    /// Saturates for indices beyond the addressable range.
    #[must_use]
    pub const fn shard_start(&self, index: u64) -> u64 {
        index.saturating_mul(self.shard_size)
    }

    /// Relative path of shard `index`.
    #[must_use]
    pub fn relative_path(&self, index: u64) -> String {
        let outer = index / 10_000;
        let inner = (index / 100) % 100;
        let start = self.shard_start(index);
        format!("{outer:02}/{inner:02}/{start:010}")
    }

    /// Map a logical `(offset, size)` range onto its shard.
    ///
    /// The returned size never reaches past the end of the shard; callers
    /// that need more re-issue the request at `offset + clipped_size`.
    #[must_use]
    pub fn resolve(&self, offset: u64, size: u64) -> ShardAddress {
        let in_file_offset = offset % self.shard_size;
        let clipped_size = (self.shard_size - in_file_offset).min(size);
        ShardAddress {
            path: self.relative_path(self.shard_index(offset)),
            in_file_offset,
            clipped_size,
        }
    }
}

/// Resolve against the default 100 MB layout.
#[must_use]
pub fn resolve(offset: u64, size: u64) -> ShardAddress {
    ShardLayout::default().resolve(offset, size)
}
