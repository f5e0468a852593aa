//! Bounded TTL cache for stat results and negative lookups.
//!
//! Two maps, both keyed by cleaned virtual path: positive entries remember
//! which layer owns a path together with its `FileInfo`, negative entries
//! remember that no layer owns it. Each map is bounded by `max_entries`;
//! inserting at capacity evicts the entry closest to expiry. Expiry uses the
//! monotonic clock, and an entry whose TTL is zero is already expired when
//! inserted, so a zero TTL never produces a hit.

use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::backend::FileInfo;

/// Cache tuning knobs, set through the engine builder.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of positive stat entries.
    pub stat_ttl: Duration,
    /// Lifetime of negative (known-missing) entries.
    pub negative_ttl: Duration,
    /// Capacity bound, applied to each map separately.
    pub max_entries: usize,
}

impl CacheConfig {
    /// A configuration with caching switched off entirely.
    pub fn disabled() -> Self {
        CacheConfig {
            enabled: false,
            stat_ttl: Duration::ZERO,
            negative_ttl: Duration::ZERO,
            max_entries: 0,
        }
    }
}

/// Point-in-time cache counters and configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub enabled: bool,
    pub stat_entries: usize,
    pub negative_entries: usize,
    pub max_entries: usize,
    pub stat_ttl: Duration,
    pub negative_ttl: Duration,
}

#[derive(Debug)]
struct StatEntry {
    info: FileInfo,
    layer: usize,
    expires: Instant,
}

#[derive(Debug)]
struct NegativeEntry {
    expires: Instant,
}

#[derive(Default)]
struct CacheMaps {
    stats: FxHashMap<String, StatEntry>,
    negatives: FxHashMap<String, NegativeEntry>,
}

pub(crate) struct MetaCache {
    config: CacheConfig,
    maps: RwLock<CacheMaps>,
}

impl MetaCache {
    pub fn new(config: CacheConfig) -> Self {
        MetaCache {
            config,
            maps: RwLock::new(CacheMaps::default()),
        }
    }

    pub fn get_stat(&self, path: &str) -> Option<(FileInfo, usize)> {
        if !self.config.enabled {
            return None;
        }
        let maps = self.maps.read();
        let entry = maps.stats.get(path)?;
        if Instant::now() >= entry.expires {
            return None;
        }
        Some((entry.info.clone(), entry.layer))
    }

    pub fn put_stat(&self, path: &str, info: FileInfo, layer: usize) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }
        let mut maps = self.maps.write();
        if maps.stats.len() >= self.config.max_entries && !maps.stats.contains_key(path) {
            evict_earliest(&mut maps.stats, |e| e.expires);
        }
        maps.stats.insert(
            path.to_string(),
            StatEntry {
                info,
                layer,
                expires: Instant::now() + self.config.stat_ttl,
            },
        );
    }

    pub fn is_negative(&self, path: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let maps = self.maps.read();
        match maps.negatives.get(path) {
            Some(entry) => Instant::now() < entry.expires,
            None => false,
        }
    }

    pub fn put_negative(&self, path: &str) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }
        let mut maps = self.maps.write();
        if maps.negatives.len() >= self.config.max_entries && !maps.negatives.contains_key(path) {
            evict_earliest(&mut maps.negatives, |e| e.expires);
        }
        maps.negatives.insert(
            path.to_string(),
            NegativeEntry {
                expires: Instant::now() + self.config.negative_ttl,
            },
        );
    }

    /// Drop both entries for exactly `path`.
    pub fn invalidate(&self, path: &str) {
        if !self.config.enabled {
            return;
        }
        let mut maps = self.maps.write();
        maps.stats.remove(path);
        maps.negatives.remove(path);
    }

    /// Drop every entry at or under `prefix`.
    ///
    /// Matching is segment-aligned: `/dir` covers `/dir` and `/dir/...` but
    /// not `/dir2`. The root prefix covers everything.
    pub fn invalidate_tree(&self, prefix: &str) {
        if !self.config.enabled {
            return;
        }
        let mut maps = self.maps.write();
        maps.stats.retain(|path, _| !tree_matches(path, prefix));
        maps.negatives.retain(|path, _| !tree_matches(path, prefix));
    }

    pub fn clear(&self) {
        if !self.config.enabled {
            return;
        }
        let mut maps = self.maps.write();
        maps.stats.clear();
        maps.negatives.clear();
    }

    pub fn stats(&self) -> CacheStats {
        if !self.config.enabled {
            return CacheStats {
                enabled: false,
                stat_entries: 0,
                negative_entries: 0,
                max_entries: 0,
                stat_ttl: Duration::ZERO,
                negative_ttl: Duration::ZERO,
            };
        }
        let maps = self.maps.read();
        CacheStats {
            enabled: true,
            stat_entries: maps.stats.len(),
            negative_entries: maps.negatives.len(),
            max_entries: self.config.max_entries,
            stat_ttl: self.config.stat_ttl,
            negative_ttl: self.config.negative_ttl,
        }
    }
}

fn tree_matches(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

fn evict_earliest<V>(map: &mut FxHashMap<String, V>, expires: impl Fn(&V) -> Instant) {
    let earliest = map
        .iter()
        .min_by_key(|(_, entry)| expires(entry))
        .map(|(path, _)| path.clone());
    if let Some(path) = earliest {
        map.remove(&path);
    }
}
