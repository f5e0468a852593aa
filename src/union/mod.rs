//! The union engine: an ordered layer stack behind one filesystem surface.
//!
//! Layer index 0 has the highest precedence; when a writable layer is
//! configured it is always index 0 and absorbs every mutation. Reads resolve
//! top-to-bottom honoring whiteouts and opaque markers, writes copy lower
//! content up first, and a bounded TTL cache short-circuits repeated stats.

mod copyup;
mod dir;
mod file_ops;
mod resolver;
mod symlink;

pub use dir::UnionDir;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::backend::Backend;
use crate::cache::{CacheConfig, CacheStats, MetaCache};
use crate::error::{Result, StrataError};
use crate::path;

pub(crate) const DEFAULT_COPY_BUFFER_SIZE: usize = 32 * 1024;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// One backing filesystem participating in the union.
#[derive(Clone)]
pub(crate) struct Layer {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) read_only: bool,
}

struct LayerStack {
    layers: Vec<Layer>,
    writable: Option<usize>,
}

/// A union filesystem over an ordered stack of backends.
///
/// Safe to share across threads: readers proceed concurrently, the layer
/// stack is structurally immutable after [`build`](UnionFsBuilder::build),
/// and the cache serializes internally.
pub struct UnionFs {
    stack: RwLock<LayerStack>,
    cache: MetaCache,
    copy_buffer_size: usize,
}

impl UnionFs {
    pub fn builder() -> UnionFsBuilder {
        UnionFsBuilder::default()
    }

    /// Stable engine name.
    pub fn name(&self) -> &'static str {
        "UnionFS"
    }

    /// The writable layer, or `NoWritableLayer` when none is configured.
    ///
    /// Returns a clone (backend `Arc` included) so callers do I/O without
    /// holding the stack lock.
    pub(crate) fn writable_layer(&self) -> Result<Layer> {
        let stack = self.stack.read();
        stack
            .writable
            .map(|idx| stack.layers[idx].clone())
            .filter(|layer| !layer.read_only)
            .ok_or(StrataError::NoWritableLayer)
    }

    pub(crate) fn layer(&self, idx: usize) -> Layer {
        self.stack.read().layers[idx].clone()
    }

    /// Clone the layer stack out of the lock for a scan or merge.
    pub(crate) fn layer_snapshot(&self) -> Vec<Layer> {
        self.stack.read().layers.clone()
    }

    pub(crate) fn copy_buffer_size(&self) -> usize {
        self.copy_buffer_size
    }

    pub(crate) fn cache(&self) -> &MetaCache {
        &self.cache
    }

    /// Drop cache entries for exactly `path`.
    pub fn invalidate(&self, p: &str) {
        self.cache.invalidate(&path::clean(p));
    }

    /// Drop cache entries for `prefix` and everything under it
    /// (segment-aligned: `/dir` does not cover `/dir2`).
    pub fn invalidate_tree(&self, prefix: &str) {
        self.cache.invalidate_tree(&path::clean(prefix));
    }

    /// Drop every cache entry.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Builder for [`UnionFs`].
///
/// The writable layer, when present, sits at index 0; read-only layers
/// follow in insertion order.
pub struct UnionFsBuilder {
    writable: Option<Arc<dyn Backend>>,
    writable_count: usize,
    readonly: Vec<Arc<dyn Backend>>,
    cache_config: CacheConfig,
    copy_buffer_size: usize,
}

impl Default for UnionFsBuilder {
    fn default() -> Self {
        UnionFsBuilder {
            writable: None,
            writable_count: 0,
            readonly: Vec::new(),
            cache_config: CacheConfig::disabled(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }
}

impl UnionFsBuilder {
    /// Set the writable layer. At most one is allowed; a second call makes
    /// [`build`](Self::build) fail.
    pub fn writable_layer<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.writable = Some(Arc::new(backend));
        self.writable_count += 1;
        self
    }

    /// Append a read-only layer below any writable layer, in insertion order.
    pub fn readonly_layer<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.readonly.push(Arc::new(backend));
        self
    }

    /// Enable or disable stat caching with the given positive-entry TTL.
    /// The negative TTL is half the stat TTL and the capacity is 1000
    /// entries per map; use [`cache_config`](Self::cache_config) for
    /// fine-grained control.
    pub fn stat_cache(mut self, enabled: bool, stat_ttl: Duration) -> Self {
        self.cache_config = CacheConfig {
            enabled,
            stat_ttl,
            negative_ttl: stat_ttl / 2,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        };
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Buffer size for copy-up streaming. Defaults to 32 KiB.
    pub fn copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    pub fn build(self) -> Result<UnionFs> {
        if self.writable_count > 1 {
            return Err(StrataError::invalid("build", "writable layer set twice"));
        }

        let mut layers = Vec::with_capacity(self.readonly.len() + 1);
        let mut writable = None;
        if let Some(backend) = self.writable {
            writable = Some(layers.len());
            layers.push(Layer {
                backend,
                read_only: false,
            });
        }
        for backend in self.readonly {
            layers.push(Layer {
                backend,
                read_only: true,
            });
        }

        Ok(UnionFs {
            stack: RwLock::new(LayerStack { layers, writable }),
            cache: MetaCache::new(self.cache_config),
            copy_buffer_size: self.copy_buffer_size,
        })
    }
}
