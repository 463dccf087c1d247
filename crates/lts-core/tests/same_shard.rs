//! Concurrent readers sharing one shard handle.

use std::sync::{Arc, Barrier};
use std::thread;

use lts_core::{CacheConfig, ShardLayout, ShardStore};
use tempfile::TempDir;

use fixtures::{expected, write_shard};

#[test]
fn fifty_concurrent_reads_of_one_shard_are_not_interleaved() {
    const READERS: u64 = 50;

    let tmp = TempDir::new().expect("tempdir");
    let layout = ShardLayout::new(64 * 1024).expect("layout");
    write_shard(tmp.path(), &layout, 0);
    let store = Arc::new(ShardStore::new(
        tmp.path(),
        layout,
        CacheConfig::new(2).expect("cache config"),
    ));
    let start = Arc::new(Barrier::new(READERS as usize));

    let readers: Vec<_> = (0..READERS)
        .map(|n| {
            let store = Arc::clone(&store);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let offset = n * 1237;
                let bytes = store.read(offset, 512).expect("read");
                (offset, bytes)
            })
        })
        .collect();

    for reader in readers {
        let (offset, bytes) = reader.join().expect("reader thread");
        assert_eq!(bytes, expected(offset, 512), "corrupt buffer at {offset}");
    }

    let stats = store.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.hits + stats.opens, READERS);
    assert_eq!(stats.open_handles, 1);
}

#[test]
fn repeated_reads_from_one_thread_reuse_the_handle() {
    let tmp = TempDir::new().expect("tempdir");
    let layout = ShardLayout::new(4096).expect("layout");
    write_shard(tmp.path(), &layout, 0);
    let store = ShardStore::new(tmp.path(), layout, CacheConfig::new(1).expect("cache"));

    for offset in (0..4096).step_by(256).collect::<Vec<u64>>().into_iter().rev() {
        assert_eq!(store.read(offset, 256).expect("read"), expected(offset, 256));
    }

    let stats = store.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.hits, 15);
}

#[test]
fn truncated_shard_yields_short_buffer() {
    let tmp = TempDir::new().expect("tempdir");
    let layout = ShardLayout::new(1000).expect("layout");
    let path = tmp.path().join(layout.relative_path(0));
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, expected(0, 600)).expect("write truncated shard");
    let store = ShardStore::new(tmp.path(), layout, CacheConfig::new(1).expect("cache"));

    let bytes = store.read(500, 400).expect("short read is not an error");
    assert_eq!(bytes, expected(500, 100));
    assert_eq!(store.stats().short_reads, 1);

    // The handle is still usable afterwards.
    assert_eq!(store.read(0, 10).expect("read"), expected(0, 10));
}
