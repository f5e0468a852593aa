//! Cache behavior observable through the engine: coherence after mutations,
//! TTL boundaries, and invalidation scope.

mod common;

use std::time::Duration;

use common::{read, seed, two_layers_cached, write};
use strata::testing::MemBackend;
use strata::{CacheConfig, UnionFs};

const LONG_TTL: Duration = Duration::from_secs(60);

/// A stat cached before a write must not survive the write.
#[test]
fn test_stat_coherent_after_write() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "12345");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    assert_eq!(fs.stat("/f.txt").unwrap().size, 5);
    write(&fs, "/f.txt", "123456789");
    assert_eq!(fs.stat("/f.txt").unwrap().size, 9);
}

/// A negative entry cached before a create must not survive the create.
#[test]
fn test_negative_entry_cleared_by_create() {
    let (fs, _) = two_layers_cached(MemBackend::new(), LONG_TTL);

    assert!(fs.stat("/new.txt").unwrap_err().is_not_found());
    write(&fs, "/new.txt", "here now");
    assert_eq!(read(&fs, "/new.txt"), "here now");
}

#[test]
fn test_stat_coherent_after_remove() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "x");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    assert!(fs.stat("/f.txt").is_ok());
    fs.remove("/f.txt").unwrap();
    assert!(fs.stat("/f.txt").unwrap_err().is_not_found());
}

#[test]
fn test_stat_coherent_after_rename() {
    let ro = MemBackend::new();
    seed(&ro, "/a.txt", "x");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    assert!(fs.stat("/a.txt").is_ok());
    assert!(fs.stat("/b.txt").unwrap_err().is_not_found());

    fs.rename("/a.txt", "/b.txt").unwrap();

    assert!(fs.stat("/a.txt").unwrap_err().is_not_found());
    assert!(fs.stat("/b.txt").is_ok());
}

/// Descendant entries cached before a subtree removal must not survive it.
#[test]
fn test_tree_coherent_after_remove_all() {
    let ro = MemBackend::new();
    seed(&ro, "/dir/a.txt", "a");
    seed(&ro, "/dir/sub/b.txt", "b");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    assert!(fs.stat("/dir/a.txt").is_ok());
    assert!(fs.stat("/dir/sub/b.txt").is_ok());

    fs.remove_all("/dir").unwrap();

    assert!(fs.stat("/dir/a.txt").unwrap_err().is_not_found());
    assert!(fs.stat("/dir/sub/b.txt").unwrap_err().is_not_found());
}

#[test]
fn test_chmod_invalidates_stat() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "x");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    let before = fs.stat("/f.txt").unwrap().mode;
    fs.chmod("/f.txt", 0o711).unwrap();
    assert_eq!(fs.stat("/f.txt").unwrap().mode, 0o711);
    assert_ne!(before, 0o711);
}

/// With a zero TTL every positive entry is born expired.
#[test]
fn test_zero_ttl_never_serves_hits() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "v1");
    let wl = MemBackend::new();
    let fs = UnionFs::builder()
        .writable_layer(wl)
        .readonly_layer(ro.clone())
        .cache_config(CacheConfig {
            enabled: true,
            stat_ttl: Duration::ZERO,
            negative_ttl: Duration::ZERO,
            max_entries: 100,
        })
        .build()
        .unwrap();

    assert_eq!(fs.stat("/f.txt").unwrap().size, 2);
    // Change the backing layer directly; a zero-TTL cache must not mask it.
    ro.write_file("/f.txt", b"longer").unwrap();
    assert_eq!(fs.stat("/f.txt").unwrap().size, 6);
}

/// An expired positive entry falls back to the backends.
#[test]
fn test_entries_expire() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "v1");
    let (fs, _) = two_layers_cached(ro.clone(), Duration::from_millis(10));

    assert_eq!(fs.stat("/f.txt").unwrap().size, 2);
    ro.write_file("/f.txt", b"longer").unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(fs.stat("/f.txt").unwrap().size, 6);
}

/// While an entry is fresh the engine serves it without consulting backends.
#[test]
fn test_fresh_entry_masks_backend_change() {
    let ro = MemBackend::new();
    seed(&ro, "/f.txt", "v1");
    let (fs, _) = two_layers_cached(ro.clone(), LONG_TTL);

    assert_eq!(fs.stat("/f.txt").unwrap().size, 2);
    ro.write_file("/f.txt", b"longer").unwrap();
    // Out-of-band backend changes are invisible until TTL or invalidation.
    assert_eq!(fs.stat("/f.txt").unwrap().size, 2);

    fs.invalidate("/f.txt");
    assert_eq!(fs.stat("/f.txt").unwrap().size, 6);
}

#[test]
fn test_invalidate_tree_is_segment_aligned() {
    let ro = MemBackend::new();
    seed(&ro, "/dir/a.txt", "a");
    seed(&ro, "/dir2", "not a dir child");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    fs.stat("/dir/a.txt").unwrap();
    fs.stat("/dir2").unwrap();
    let before = fs.cache_stats().stat_entries;

    fs.invalidate_tree("/dir");

    let after = fs.cache_stats().stat_entries;
    assert!(after < before, "entries under /dir must be dropped");
    // /dir2 shares a byte prefix but is not a descendant; it stays cached.
    assert!(after >= 1);
}

#[test]
fn test_clear_cache() {
    let ro = MemBackend::new();
    seed(&ro, "/a", "1");
    seed(&ro, "/b", "2");
    let (fs, _) = two_layers_cached(ro, LONG_TTL);

    fs.stat("/a").unwrap();
    fs.stat("/b").unwrap();
    let _ = fs.stat("/missing");
    assert!(fs.cache_stats().stat_entries >= 2);
    assert!(fs.cache_stats().negative_entries >= 1);

    fs.clear_cache();

    let stats = fs.cache_stats();
    assert_eq!(stats.stat_entries, 0);
    assert_eq!(stats.negative_entries, 0);
}

/// `stat_cache` derives the negative TTL and default capacity.
#[test]
fn test_stat_cache_defaults() {
    let fs = UnionFs::builder()
        .writable_layer(MemBackend::new())
        .stat_cache(true, Duration::from_secs(10))
        .build()
        .unwrap();

    let stats = fs.cache_stats();
    assert!(stats.enabled);
    assert_eq!(stats.stat_ttl, Duration::from_secs(10));
    assert_eq!(stats.negative_ttl, Duration::from_secs(5));
    assert_eq!(stats.max_entries, 1000);
}

#[test]
fn test_disabled_cache_reports_disabled() {
    let fs = UnionFs::builder()
        .writable_layer(MemBackend::new())
        .build()
        .unwrap();
    assert!(!fs.cache_stats().enabled);
}

/// The capacity bound holds no matter how many paths get statted.
#[test]
fn test_capacity_bound_holds() {
    let ro = MemBackend::new();
    for i in 0..20 {
        seed(&ro, &format!("/f{}.txt", i), "x");
    }
    let wl = MemBackend::new();
    let fs = UnionFs::builder()
        .writable_layer(wl)
        .readonly_layer(ro)
        .cache_config(CacheConfig {
            enabled: true,
            stat_ttl: LONG_TTL,
            negative_ttl: LONG_TTL,
            max_entries: 5,
        })
        .build()
        .unwrap();

    for i in 0..20 {
        fs.stat(&format!("/f{}.txt", i)).unwrap();
        let _ = fs.stat(&format!("/missing{}.txt", i));
    }

    let stats = fs.cache_stats();
    assert!(stats.stat_entries <= 5);
    assert!(stats.negative_entries <= 5);
}
