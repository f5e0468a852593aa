//! Symlink operations across layers: readlink, creation, lstat, and bounded
//! recursive resolution with loop detection.
//!
//! Symlink support is an optional backend capability; every operation here
//! probes for it at call time and degrades the way each function documents.

use fxhash::FxHashSet;
use tracing::debug;

use crate::backend::FileInfo;
use crate::error::{Result, StrataError};
use crate::path;

use super::resolver::hidden_by_upper;
use super::UnionFs;

/// Maximum hops a single resolution will follow, matching the Linux
/// MAXSYMLINKS limit.
const MAX_SYMLINK_DEPTH: u32 = 40;

impl UnionFs {
    /// Read a symlink's target from the first layer that can answer,
    /// honoring whiteouts.
    pub fn readlink(&self, p: &str) -> Result<String> {
        let p = path::clean(p);
        let layers = self.layer_snapshot();
        for (idx, layer) in layers.iter().enumerate() {
            if hidden_by_upper(&layers, &p, idx) {
                continue;
            }
            match layer.backend.readlink(&p) {
                Some(Ok(target)) => return Ok(target),
                Some(Err(err)) if err.is_not_found() => continue,
                Some(Err(err)) => return Err(err),
                None => continue,
            }
        }
        Err(StrataError::not_found("readlink", &p))
    }

    /// Create a symlink at `link` pointing to `target` in the writable
    /// layer. Fails with an invalid-operation error when the writable
    /// backend has no symlink capability.
    pub fn symlink(&self, target: &str, link: &str) -> Result<()> {
        let writable = self.writable_layer()?;
        let link = path::clean(link);

        self.ensure_parent_dir(&link)?;
        let _ = writable.backend.remove(&path::whiteout_for(&link));

        match writable.backend.symlink(target, &link) {
            Some(result) => {
                result?;
                self.cache().invalidate(&link);
                Ok(())
            }
            None => Err(StrataError::invalid("symlink", &link)),
        }
    }

    /// Stat without following a final symlink, falling back to a plain stat
    /// on layers without the capability.
    pub fn lstat(&self, p: &str) -> Result<FileInfo> {
        self.lstat_if_possible(p).map(|(info, _)| info)
    }

    /// Like [`lstat`](Self::lstat), also reporting whether an lstat was
    /// actually used. `false` means the owning layer only supports `stat`,
    /// so a symlink would have been dereferenced.
    pub fn lstat_if_possible(&self, p: &str) -> Result<(FileInfo, bool)> {
        let p = path::clean(p);
        let layers = self.layer_snapshot();
        for (idx, layer) in layers.iter().enumerate() {
            if hidden_by_upper(&layers, &p, idx) {
                continue;
            }
            match layer.backend.lstat(&p) {
                Some(Ok(info)) => return Ok((info, true)),
                Some(Err(err)) if err.is_not_found() => continue,
                Some(Err(err)) => return Err(err),
                None => match layer.backend.stat(&p) {
                    Ok(info) => return Ok((info, false)),
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err),
                },
            }
        }
        Err(StrataError::not_found("lstat", &p))
    }

    /// Alias for [`readlink`](Self::readlink); the capability probe already
    /// happens per layer.
    pub fn readlink_if_possible(&self, p: &str) -> Result<String> {
        self.readlink(p)
    }

    /// Alias for [`symlink`](Self::symlink).
    pub fn symlink_if_possible(&self, target: &str, link: &str) -> Result<()> {
        self.symlink(target, link)
    }

    /// Change ownership of a symlink itself (or of the path, on backends
    /// without the lchown capability), copying up first when the owner is a
    /// lower layer.
    pub fn lchown(&self, p: &str, uid: u32, gid: u32) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);

        let info = self.lstat(&p)?;

        let layers = self.layer_snapshot();
        let mut owner = None;
        for idx in 0..layers.len() {
            if hidden_by_upper(&layers, &p, idx) {
                continue;
            }
            if layers[idx].backend.stat(&p).is_ok() {
                owner = Some(idx);
                break;
            }
        }
        if let Some(layer_idx) = owner {
            if layer_idx > 0 {
                self.copy_up(&p, &info)?;
            }
        }

        match writable.backend.lchown(&p, uid, gid) {
            Some(result) => result?,
            None => writable.backend.chown(&p, uid, gid)?,
        }
        self.cache().invalidate(&p);
        Ok(())
    }

    /// Follow symlinks starting at `p` until a non-link path is reached.
    ///
    /// Absolute targets replace the path, relative targets resolve against
    /// the parent of the link. Resolution fails with an invalid-operation
    /// error after 40 hops, or as soon as a target lands on (or under) a
    /// path already visited. The loop test is conservative: it can reject
    /// some legal chains, never accept a looping one.
    pub fn resolve(&self, p: &str) -> Result<String> {
        let mut visited = FxHashSet::default();
        self.resolve_depth(path::clean(p), MAX_SYMLINK_DEPTH, &mut visited)
    }

    fn resolve_depth(
        &self,
        p: String,
        depth: u32,
        visited: &mut FxHashSet<String>,
    ) -> Result<String> {
        if depth == 0 {
            debug!(path = %p, "symlink depth exhausted");
            return Err(StrataError::invalid("resolve", &p));
        }

        let (info, supported) = self.lstat_if_possible(&p)?;
        if !supported || !info.is_symlink {
            return Ok(p);
        }

        let target = self.readlink(&p)?;
        let resolved = if target.starts_with('/') {
            path::clean(&target)
        } else {
            path::join(&path::parent(&p), &target)
        };

        visited.insert(p);
        if ancestor_visited(&resolved, visited) {
            debug!(path = %resolved, "symlink loop detected");
            return Err(StrataError::invalid("resolve", &resolved));
        }

        self.resolve_depth(resolved, depth - 1, visited)
    }
}

/// Whether `p` or any of its ancestors has already been visited.
fn ancestor_visited(p: &str, visited: &FxHashSet<String>) -> bool {
    let mut current = String::new();
    for segment in path::split(p) {
        current.push('/');
        current.push_str(&segment);
        if visited.contains(&current) {
            return true;
        }
    }
    false
}
