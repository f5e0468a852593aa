//! Layer resolution: which layer owns a path, after whiteouts and opacity.

use tracing::trace;

use crate::backend::FileInfo;
use crate::error::{Result, StrataError};
use crate::path;

use super::{Layer, UnionFs};

impl UnionFs {
    /// Locate `p` across the layer stack, top to bottom.
    ///
    /// The first layer that both holds the path and is not masked from above
    /// wins. Positive and negative results populate the cache; any backend
    /// error other than not-found aborts the scan immediately and is never
    /// cached.
    pub(crate) fn find(&self, p: &str) -> Result<(FileInfo, usize)> {
        let p = path::clean(p);

        if let Some((info, layer_idx)) = self.cache().get_stat(&p) {
            trace!(path = %p, layer = layer_idx, "stat cache hit");
            return Ok((info, layer_idx));
        }
        if self.cache().is_negative(&p) {
            trace!(path = %p, "negative cache hit");
            return Err(StrataError::not_found("stat", &p));
        }

        let layers = self.layer_snapshot();
        for (idx, layer) in layers.iter().enumerate() {
            if hidden_by_upper(&layers, &p, idx) {
                continue;
            }
            match layer.backend.stat(&p) {
                Ok(info) => {
                    trace!(path = %p, layer = idx, "resolved");
                    self.cache().put_stat(&p, info.clone(), idx);
                    return Ok((info, idx));
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }

        self.cache().put_negative(&p);
        Err(StrataError::not_found("stat", &p))
    }
}

/// Whether `p` is masked at `layer_idx` by any layer strictly above it:
/// a whiteout for `p` itself, a whiteout for one of its ancestor
/// directories (a removed subtree is masked by the single whiteout at its
/// root), or an opaque marker inside an ancestor directory.
pub(crate) fn hidden_by_upper(layers: &[Layer], p: &str, layer_idx: usize) -> bool {
    let whiteout = path::whiteout_for(p);
    for layer in &layers[..layer_idx] {
        if layer.backend.stat(&whiteout).is_ok() {
            return true;
        }
        let mut dir = path::parent(p);
        while dir != "/" {
            let marker = path::join(&dir, path::OPAQUE_MARKER);
            if layer.backend.stat(&marker).is_ok() {
                return true;
            }
            if layer.backend.stat(&path::whiteout_for(&dir)).is_ok() {
                return true;
            }
            dir = path::parent(&dir);
        }
    }
    false
}
