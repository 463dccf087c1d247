//! Bounded cache of open shard handles.
//!
//! [`HandleCache`] keeps at most `max_open_handles` shard files open and
//! lends each one to a single reader at a time.
//!
//! # Structure
//!
//! - The **directory** maps a shard path to its [`HandleSlot`]. It sits
//!   behind one mutex; inserts, evictions and removals happen only while
//!   holding it, so at most one caller mutates it at a time.
//! - Each **slot** owns one handle and hands it out exclusively (see
//!   [`crate::slot`]). Readers of different shards never touch each other's
//!   slots, so they only meet on the short directory critical section.
//!
//! # Read protocol
//!
//! Lookup and use are not atomic: the directory lock is released before a
//! reader waits on a slot or does any seek/read. The target can therefore be
//! evicted between the two steps. Eviction tombstones the slot, and a reader
//! that finds a tombstone simply restarts from the lookup. Every restart goes
//! through one loop in [`HandleCache::read_range`], bounded by
//! `max_retries`.
//!
//! # Eviction
//!
//! A miss on a full cache first scans for an idle handle (non-blocking). If
//! every handle is checked out, it falls back to waiting on one of them
//! while still holding the directory lock. That stalls other directory
//! mutations but not readers of other shards. The fallback is logged at
//! `warn` and counted in [`CacheStats::blocking_evictions`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{ConfigError, ReadError};
use crate::slot::{HandleSlot, SlotError};

/// Default handle budget.
pub const DEFAULT_MAX_OPEN_HANDLES: usize = 64;

/// Default number of restarts a single read may take before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 1024;

/// Restarts that run back to back before the loop starts yielding.
const SPIN_RETRIES: u32 = 4;

/// Restarts that yield before the loop starts sleeping.
const YIELD_RETRIES: u32 = 16;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime settings of a [`HandleCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    max_open_handles: usize,
    eviction_wait: Option<Duration>,
    max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_open_handles: DEFAULT_MAX_OPEN_HANDLES,
            eviction_wait: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CacheConfig {
    /// Settings with the given handle budget and default retry behavior.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if `max_open_handles` is zero.
    pub fn new(max_open_handles: usize) -> Result<Self, ConfigError> {
        if max_open_handles == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            max_open_handles,
            ..Self::default()
        })
    }

    /// Bound the blocking-eviction wait. `None` waits indefinitely.
    #[must_use]
    pub const fn with_eviction_wait(mut self, wait: Option<Duration>) -> Self {
        self.eviction_wait = wait;
        self
    }

    /// Cap the number of restarts per read.
    ///
    /// At least one restart is always allowed: a miss on a full cache
    /// evicts and then restarts once to open the shard.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = if max_retries == 0 { 1 } else { max_retries };
        self
    }

    /// Maximum number of handles open at any quiescent point.
    #[must_use]
    pub const fn max_open_handles(&self) -> usize {
        self.max_open_handles
    }

    /// Bound on the blocking-eviction wait, if any.
    #[must_use]
    pub const fn eviction_wait(&self) -> Option<Duration> {
        self.eviction_wait
    }

    /// Restarts allowed per read.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of cache counters.
///
/// Counters are monotonic since construction. At any quiescent point
/// `opens == closes + open_handles`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry and took its handle.
    pub hits: u64,
    /// Lookups that found no entry.
    pub misses: u64,
    /// Shard files opened.
    pub opens: u64,
    /// Shard opens that failed (no entry was created).
    pub open_failures: u64,
    /// Handles closed by the cache.
    pub closes: u64,
    /// Entries evicted, blocking or not.
    pub evictions: u64,
    /// Evictions that had to wait for a checked-out handle.
    pub blocking_evictions: u64,
    /// Restarts caused by observing a tombstone.
    pub stale_retries: u64,
    /// Reads that hit end-of-file before the requested size.
    pub short_reads: u64,
    /// Entries currently in the directory.
    pub open_handles: usize,
    /// Largest directory size observed.
    pub peak_open_handles: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    opens: AtomicU64,
    open_failures: AtomicU64,
    closes: AtomicU64,
    evictions: AtomicU64,
    blocking_evictions: AtomicU64,
    stale_retries: AtomicU64,
    short_reads: AtomicU64,
    peak_open_handles: AtomicUsize,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// HandleCache
// ---------------------------------------------------------------------------

type Directory = HashMap<PathBuf, Arc<HandleSlot>>;

/// What one pass of the lookup step produced.
enum Lookup {
    /// The caller now exclusively holds this entry's handle.
    Ready(Arc<HandleSlot>, File),
    /// The directory changed under us; look the path up again.
    Restart,
}

/// Bounded, thread-safe cache of read-only shard handles.
///
/// Share it by reference or behind an [`Arc`]; every method takes `&self`.
#[derive(Debug)]
pub struct HandleCache {
    config: CacheConfig,
    directory: Mutex<Directory>,
    counters: Counters,
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl HandleCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            directory: Mutex::new(HashMap::with_capacity(config.max_open_handles)),
            counters: Counters::default(),
        }
    }

    /// The settings this cache was built with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.max_open_handles
    }

    /// Number of entries currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.lock().len()
    }

    /// Whether no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory.lock().is_empty()
    }

    /// Whether the shard at `path` (base path already joined) has an entry.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.directory.lock().contains_key(path)
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let open_handles = self.len();
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            opens: c.opens.load(Ordering::Relaxed),
            open_failures: c.open_failures.load(Ordering::Relaxed),
            closes: c.closes.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            blocking_evictions: c.blocking_evictions.load(Ordering::Relaxed),
            stale_retries: c.stale_retries.load(Ordering::Relaxed),
            short_reads: c.short_reads.load(Ordering::Relaxed),
            open_handles,
            peak_open_handles: c.peak_open_handles.load(Ordering::Relaxed),
        }
    }

    /// Read `size` bytes at `in_file_offset` from `base_path/relative_path`.
    ///
    /// Opens the shard on first use and keeps it cached. If the file ends
    /// before `size` bytes, the returned buffer is shorter; this is logged
    /// but not an error.
    ///
    /// # Errors
    ///
    /// - [`ReadError::ShardNotFound`] / [`ReadError::Open`] if the shard
    ///   cannot be opened. No entry is created.
    /// - [`ReadError::Seek`] / [`ReadError::Read`] on I/O failure. The
    ///   handle stays cached.
    /// - [`ReadError::EvictionTimeout`] if a blocking eviction exceeds the
    ///   configured wait.
    /// - [`ReadError::RetriesExhausted`] if the read restarted more than
    ///   `max_retries` times.
    pub fn read_range(
        &self,
        base_path: &Path,
        relative_path: &str,
        in_file_offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, ReadError> {
        let path = base_path.join(relative_path);
        let mut attempt: u32 = 0;

        loop {
            if attempt > self.config.max_retries {
                return Err(ReadError::RetriesExhausted {
                    path,
                    attempts: attempt,
                });
            }
            backoff(attempt);
            attempt += 1;

            match self.lookup_or_open(&path)? {
                Lookup::Ready(slot, file) => {
                    return self.read_checked_out(&slot, file, &path, in_file_offset, size);
                }
                Lookup::Restart => {}
            }
        }
    }

    /// Evict every entry, waiting for checked-out handles to come back.
    pub fn clear(&self) {
        let mut directory = self.directory.lock();
        for (path, slot) in directory.drain() {
            match slot.checkout() {
                Ok(file) => {
                    slot.tombstone();
                    self.close(file);
                    bump(&self.counters.evictions);
                    debug!(path = %path.display(), "evicted shard handle on clear");
                }
                Err(err) => {
                    debug_assert!(false, "directory held a dead slot: {err:?}");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lookup-or-create
    // -----------------------------------------------------------------------

    fn lookup_or_open(&self, path: &Path) -> Result<Lookup, ReadError> {
        let mut directory = self.directory.lock();

        if let Some(slot) = directory.get(path).map(Arc::clone) {
            drop(directory);
            return Ok(match slot.checkout() {
                Ok(file) => {
                    bump(&self.counters.hits);
                    Lookup::Ready(slot, file)
                }
                Err(_) => {
                    bump(&self.counters.stale_retries);
                    trace!(path = %path.display(), "entry evicted while waiting, retrying");
                    Lookup::Restart
                }
            });
        }

        bump(&self.counters.misses);

        if directory.len() >= self.config.max_open_handles {
            self.evict_one(&mut directory, path)?;
            return Ok(Lookup::Restart);
        }

        let file = File::open(path).map_err(|err| {
            bump(&self.counters.open_failures);
            ReadError::from_open(path.to_path_buf(), err)
        })?;
        bump(&self.counters.opens);

        let slot = Arc::new(HandleSlot::checked_out());
        directory.insert(path.to_path_buf(), Arc::clone(&slot));
        self.counters
            .peak_open_handles
            .fetch_max(directory.len(), Ordering::Relaxed);
        debug!(path = %path.display(), open = directory.len(), "opened shard handle");

        Ok(Lookup::Ready(slot, file))
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Remove one entry to make room for `wanted`. Caller holds the lock.
    fn evict_one(&self, directory: &mut Directory, wanted: &Path) -> Result<(), ReadError> {
        let idle = directory.iter().find_map(|(path, slot)| {
            slot.try_checkout()
                .ok()
                .map(|file| (path.clone(), Arc::clone(slot), file))
        });

        let (victim, slot, file) = match idle {
            Some(found) => found,
            None => self.wait_for_victim(directory, wanted)?,
        };

        slot.tombstone();
        directory.remove(&victim);
        self.close(file);
        bump(&self.counters.evictions);
        debug!(
            evicted = %victim.display(),
            wanted = %wanted.display(),
            "evicted shard handle"
        );
        Ok(())
    }

    /// Degraded path: every handle is checked out, so wait on one of them.
    ///
    /// Runs with the directory lock held. Readers of other shards keep
    /// going; only lookups and other evictions queue behind us.
    fn wait_for_victim(
        &self,
        directory: &Directory,
        wanted: &Path,
    ) -> Result<(PathBuf, Arc<HandleSlot>, File), ReadError> {
        let Some((victim, slot)) = directory.iter().next() else {
            return Err(ReadError::Internal {
                path: wanted.to_path_buf(),
                detail: "eviction requested on an empty directory".to_string(),
            });
        };

        bump(&self.counters.blocking_evictions);
        warn!(
            victim = %victim.display(),
            wanted = %wanted.display(),
            capacity = self.config.max_open_handles,
            "all shard handles busy, waiting to evict"
        );

        let started = Instant::now();
        let taken = match self.config.eviction_wait {
            Some(wait) => slot.checkout_timeout(wait),
            None => slot.checkout(),
        };

        match taken {
            Ok(file) => Ok((victim.clone(), Arc::clone(slot), file)),
            Err(SlotError::TimedOut) => Err(ReadError::EvictionTimeout {
                path: wanted.to_path_buf(),
                waited: started.elapsed(),
            }),
            Err(err) => Err(ReadError::Internal {
                path: wanted.to_path_buf(),
                detail: format!("eviction victim {} reported {err:?}", victim.display()),
            }),
        }
    }

    fn close(&self, file: File) {
        drop(file);
        bump(&self.counters.closes);
    }

    // -----------------------------------------------------------------------
    // Use
    // -----------------------------------------------------------------------

    fn read_checked_out(
        &self,
        slot: &HandleSlot,
        mut file: File,
        path: &Path,
        in_file_offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, ReadError> {
        let result = self.seek_and_read(&mut file, path, in_file_offset, size);
        if let Some(orphan) = slot.checkin(file) {
            self.close(orphan);
        }
        result
    }

    fn seek_and_read(
        &self,
        file: &mut File,
        path: &Path,
        in_file_offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, ReadError> {
        file.seek(SeekFrom::Start(in_file_offset))
            .map_err(|source| ReadError::Seek {
                path: path.to_path_buf(),
                offset: in_file_offset,
                source,
            })?;

        // Reserve no more than the file holds past the offset.
        let available = file
            .metadata()
            .map_or(0, |meta| meta.len().saturating_sub(in_file_offset));
        let mut buffer = Vec::with_capacity(usize::try_from(size.min(available)).unwrap_or(0));
        file.by_ref()
            .take(size)
            .read_to_end(&mut buffer)
            .map_err(|source| ReadError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if (buffer.len() as u64) < size {
            bump(&self.counters.short_reads);
            warn!(
                path = %path.display(),
                offset = in_file_offset,
                requested = size,
                read = buffer.len(),
                "short read from shard"
            );
        }

        Ok(buffer)
    }
}

/// Pause between restarts: none at first, then yield, then short sleeps.
fn backoff(attempt: u32) {
    if attempt < SPIN_RETRIES {
        return;
    }
    if attempt < YIELD_RETRIES {
        thread::yield_now();
        return;
    }
    let step = u64::from((attempt - YIELD_RETRIES).min(20) + 1);
    thread::sleep(Duration::from_micros(50 * step));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
