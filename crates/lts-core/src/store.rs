//! Read-only view of a shard tree.
//!
//! [`ShardStore`] is the entry point for callers: it resolves a logical
//! range to its shard and reads it through a shared [`HandleCache`].
//!
//! A single call never crosses a shard boundary. To read a longer range,
//! loop and advance the offset by the length of each returned buffer:
//!
//! ```rust,no_run
//! use lts_core::config::StoreConfig;
//! use lts_core::store::ShardStore;
//!
//! let store = ShardStore::open("/srv/lts", &StoreConfig::default()).unwrap();
//! let (mut offset, mut remaining) = (99_999_990_u64, 20_u64);
//! let mut out = Vec::new();
//! while remaining > 0 {
//!     let chunk = store.read(offset, remaining).unwrap();
//!     if chunk.is_empty() {
//!         break;
//!     }
//!     offset += chunk.len() as u64;
//!     remaining -= chunk.len() as u64;
//!     out.extend_from_slice(&chunk);
//! }
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::address::{ShardAddress, ShardLayout};
use crate::cache::{CacheConfig, CacheStats, HandleCache};
use crate::config::StoreConfig;
use crate::error::{ConfigError, ReadError};
use crate::timing::{TimingReport, Timings};

/// Shard tree rooted at a base directory, read through a bounded handle cache.
#[derive(Debug)]
pub struct ShardStore {
    base_path: PathBuf,
    layout: ShardLayout,
    cache: HandleCache,
    timings: Timings,
}

impl ShardStore {
    /// Build a store from explicit layout and cache settings.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, layout: ShardLayout, cache: CacheConfig) -> Self {
        Self {
            base_path: base_path.into(),
            layout,
            cache: HandleCache::new(cache),
            timings: Timings::new(false),
        }
    }

    /// Build a store from a loaded config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config has a zero shard size or a
    /// zero handle budget.
    pub fn open(base_path: impl Into<PathBuf>, config: &StoreConfig) -> Result<Self, ConfigError> {
        let store = Self::new(base_path, config.layout()?, config.cache_config()?);
        debug!(
            base = %store.base_path.display(),
            shard_size = store.layout.shard_size(),
            max_open_handles = store.cache.capacity(),
            "opened shard store"
        );
        Ok(store)
    }

    /// Directory the shard tree lives under.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub const fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Map a logical range onto its shard without touching the filesystem.
    #[must_use]
    pub fn resolve(&self, logical_offset: u64, size: u64) -> ShardAddress {
        self.layout.resolve(logical_offset, size)
    }

    /// Read up to `size` bytes starting at `logical_offset`.
    ///
    /// The result holds at most the bytes left in the containing shard, and
    /// fewer if the shard file is shorter than expected. Callers detect both
    /// by comparing the returned length with what they asked for.
    ///
    /// # Errors
    ///
    /// Propagates [`ReadError`] from the handle cache.
    pub fn read(&self, logical_offset: u64, size: u64) -> Result<Vec<u8>, ReadError> {
        let address = self.resolve(logical_offset, size);
        self.timings.timed("read", || {
            self.cache.read_range(
                &self.base_path,
                &address.path,
                address.in_file_offset,
                address.clipped_size,
            )
        })
    }

    /// The underlying handle cache.
    #[must_use]
    pub const fn cache(&self) -> &HandleCache {
        &self.cache
    }

    /// Snapshot of the handle cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Latency recorder for this store's reads.
    #[must_use]
    pub const fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Latency percentiles for the reads recorded since the last report.
    /// Timing is off until enabled through [`ShardStore::timings`].
    #[must_use]
    pub fn timing_report(&self) -> TimingReport {
        self.timings.report()
    }
}
