//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::io::Write;
use std::time::{Duration, SystemTime};

use strata::testing::MemBackend;
use strata::{FileInfo, UnionFs};

/// Seed a file into a backend, creating parents as needed.
pub fn seed(backend: &MemBackend, path: &str, content: &str) {
    backend.write_file(path, content.as_bytes()).unwrap();
}

/// A writable layer plus one read-only layer, no cache.
pub fn two_layers(ro: MemBackend) -> (UnionFs, MemBackend) {
    let wl = MemBackend::new();
    let fs = UnionFs::builder()
        .writable_layer(wl.clone())
        .readonly_layer(ro)
        .build()
        .unwrap();
    (fs, wl)
}

/// Same as [`two_layers`] with stat caching enabled.
pub fn two_layers_cached(ro: MemBackend, ttl: Duration) -> (UnionFs, MemBackend) {
    let wl = MemBackend::new();
    let fs = UnionFs::builder()
        .writable_layer(wl.clone())
        .readonly_layer(ro)
        .stat_cache(true, ttl)
        .build()
        .unwrap();
    (fs, wl)
}

/// Write a whole file through the engine.
pub fn write(fs: &UnionFs, path: &str, content: &str) {
    let mut file = fs.create(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

/// Read a whole file through the engine as UTF-8.
pub fn read(fs: &UnionFs, path: &str) -> String {
    String::from_utf8(fs.read_file(path).unwrap()).unwrap()
}

pub fn names(entries: &[FileInfo]) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

/// A fixed timestamp for metadata-preservation assertions.
pub fn fixed_mtime() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
}
