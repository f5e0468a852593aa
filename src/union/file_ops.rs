//! The engine's public filesystem operations.
//!
//! Reads resolve through the layer stack; every mutation is confined to the
//! writable layer, copying lower content up first and laying whiteouts so
//! lower layers are never modified and never show through deletions.

use std::io::Read;

use tracing::debug;

use crate::backend::{File, FileInfo, OpenFlags};
use crate::error::{Result, StrataError};
use crate::path;

use super::dir::{merge_entries, UnionDir};
use super::resolver::hidden_by_upper;
use super::{Layer, UnionFs};

impl UnionFs {
    /// Stat a path through the layer stack.
    pub fn stat(&self, p: &str) -> Result<FileInfo> {
        self.find(p).map(|(info, _)| info)
    }

    /// Open for reading. Directories yield a merged directory handle.
    pub fn open(&self, p: &str) -> Result<Box<dyn File>> {
        self.open_file(p, OpenFlags::RDONLY, 0)
    }

    /// Create (or truncate) a file in the writable layer.
    pub fn create(&self, p: &str) -> Result<Box<dyn File>> {
        self.open_file(
            p,
            OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC,
            0o666,
        )
    }

    /// Open with explicit flags and creation mode.
    ///
    /// Write intent routes the open to the writable layer: parents are
    /// materialized, an existing lower-layer file is copied up first (unless
    /// `CREATE|EXCL` asks for a fresh file), and any whiteout for the path
    /// is cleared.
    pub fn open_file(&self, p: &str, flags: OpenFlags, mode: u32) -> Result<Box<dyn File>> {
        let p = path::clean(p);

        if flags.is_write() {
            let writable = self.writable_layer()?;
            self.ensure_parent_dir(&p)?;

            if !flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                match self.find(&p) {
                    Ok((info, layer_idx)) if layer_idx > 0 => self.copy_up(&p, &info)?,
                    Ok(_) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }

            let _ = writable.backend.remove(&path::whiteout_for(&p));
            self.cache().invalidate(&p);
            return writable.backend.open_file(&p, flags, mode);
        }

        let (info, layer_idx) = self.find(&p)?;
        if info.is_dir {
            return Ok(Box::new(UnionDir::new(self.layer_snapshot(), p, info)));
        }
        self.layer(layer_idx).backend.open(&p)
    }

    /// Create a directory in the writable layer.
    pub fn mkdir(&self, p: &str, perm: u32) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);
        self.ensure_parent_dir(&p)?;
        let _ = writable.backend.remove(&path::whiteout_for(&p));
        writable.backend.mkdir(&p, perm)?;
        self.cache().invalidate(&p);
        Ok(())
    }

    /// Create a directory chain in the writable layer, clearing whiteouts
    /// along the way.
    pub fn mkdir_all(&self, p: &str, perm: u32) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);
        let mut current = String::new();
        for segment in path::split(&p) {
            current.push('/');
            current.push_str(&segment);
            let _ = writable.backend.remove(&path::whiteout_for(&current));
        }
        writable.backend.mkdir_all(&p, perm)?;
        self.cache().invalidate_tree(&p);
        Ok(())
    }

    /// Remove a file or empty directory from the merged view.
    ///
    /// An entry owned by the writable layer is deleted there; a whiteout is
    /// then laid so lower-layer copies stay hidden. The whiteout is created
    /// even when the path only lived in the writable layer, which is
    /// harmless: creation clears it again.
    pub fn remove(&self, p: &str) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);
        let (_, layer_idx) = self.find(&p)?;

        if layer_idx == 0 {
            writable.backend.remove(&p)?;
        }

        let whiteout = path::whiteout_for(&p);
        self.ensure_parent_dir(&whiteout)?;
        writable.backend.create(&whiteout)?;

        self.cache().invalidate(&p);
        Ok(())
    }

    /// Remove a path and everything under it from the merged view.
    ///
    /// A single whiteout for the root of the subtree masks the entire
    /// lower-layer tree; no per-descendant whiteouts are laid.
    pub fn remove_all(&self, p: &str) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);
        let (_, layer_idx) = self.find(&p)?;

        if layer_idx == 0 {
            writable.backend.remove_all(&p)?;
        }

        let layers = self.layer_snapshot();
        let in_lower_layer = (1..layers.len()).any(|idx| {
            !hidden_by_upper(&layers, &p, idx) && layers[idx].backend.stat(&p).is_ok()
        });
        if in_lower_layer {
            let whiteout = path::whiteout_for(&p);
            self.ensure_parent_dir(&whiteout)?;
            writable.backend.create(&whiteout)?;
        }

        self.cache().invalidate_tree(&p);
        Ok(())
    }

    /// Rename within the merged view.
    ///
    /// A source owned by a lower layer is copied up first and hidden behind
    /// a whiteout afterwards; the rename itself happens entirely inside the
    /// writable layer.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let writable = self.writable_layer()?;
        let old = path::clean(old);
        let new = path::clean(new);

        let (info, layer_idx) = self.find(&old)?;
        if layer_idx > 0 {
            self.copy_up(&old, &info)?;
        }

        self.ensure_parent_dir(&new)?;
        let _ = writable.backend.remove(&path::whiteout_for(&new));

        writable.backend.rename(&old, &new)?;

        if layer_idx > 0 {
            let whiteout = path::whiteout_for(&old);
            self.ensure_parent_dir(&whiteout)?;
            writable.backend.create(&whiteout)?;
        }

        self.cache().invalidate(&old);
        self.cache().invalidate(&new);
        Ok(())
    }

    pub fn chmod(&self, p: &str, mode: u32) -> Result<()> {
        self.mutate_in_writable(p, |layer, p| layer.backend.chmod(p, mode))
    }

    pub fn chown(&self, p: &str, uid: u32, gid: u32) -> Result<()> {
        self.mutate_in_writable(p, |layer, p| layer.backend.chown(p, uid, gid))
    }

    pub fn chtimes(
        &self,
        p: &str,
        atime: std::time::SystemTime,
        mtime: std::time::SystemTime,
    ) -> Result<()> {
        self.mutate_in_writable(p, |layer, p| layer.backend.chtimes(p, atime, mtime))
    }

    /// Truncate a file to `size`. Fails with an invalid-operation error on
    /// directories.
    pub fn truncate(&self, p: &str, size: u64) -> Result<()> {
        let writable = self.writable_layer()?;
        let p = path::clean(p);

        let (info, layer_idx) = self.find(&p)?;
        if info.is_dir {
            return Err(StrataError::invalid("truncate", &p));
        }
        if layer_idx > 0 {
            self.copy_up(&p, &info)?;
        }

        let mut file = writable.backend.open_file(&p, OpenFlags::WRONLY, 0)?;
        file.truncate(size)?;

        self.cache().invalidate(&p);
        Ok(())
    }

    /// Merged, deduplicated directory listing, sorted ascending by
    /// lower-cased name.
    pub fn read_dir(&self, p: &str) -> Result<Vec<FileInfo>> {
        let p = path::clean(p);
        let (info, _) = self.find(&p)?;
        if !info.is_dir {
            return Err(StrataError::invalid("readdir", &p));
        }
        Ok(merge_entries(&self.layer_snapshot(), &p))
    }

    /// Read a whole file from its owning layer.
    pub fn read_file(&self, p: &str) -> Result<Vec<u8>> {
        let p = path::clean(p);
        let (info, layer_idx) = self.find(&p)?;
        if info.is_dir {
            return Err(StrataError::invalid("read", &p));
        }
        let mut file = self.layer(layer_idx).backend.open(&p)?;
        let mut buf = Vec::with_capacity(info.size as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| StrataError::io("read", &p, e))?;
        Ok(buf)
    }

    /// Resolve, copy up when owned below, apply a metadata mutation on the
    /// writable layer, invalidate.
    fn mutate_in_writable<F>(&self, p: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&Layer, &str) -> Result<()>,
    {
        let writable = self.writable_layer()?;
        let p = path::clean(p);

        let (info, layer_idx) = self.find(&p)?;
        if layer_idx > 0 {
            debug!(path = %p, layer = layer_idx, "copy-up for metadata change");
            self.copy_up(&p, &info)?;
        }

        apply(&writable, &p)?;
        self.cache().invalidate(&p);
        Ok(())
    }
}
