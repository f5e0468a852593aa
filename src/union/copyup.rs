//! Copy-up: promoting lower-layer entries into the writable layer.

use std::io::{Read, Write};

use tracing::debug;

use crate::backend::{FileInfo, OpenFlags};
use crate::error::{Result, StrataError};
use crate::path;

use super::UnionFs;

impl UnionFs {
    /// Promote `p` into the writable layer ahead of a mutation.
    ///
    /// Idempotent: if the writable layer already holds the path this is a
    /// no-op. Content is streamed with the configured copy buffer; mode bits
    /// are preserved, the modification time best-effort.
    pub(crate) fn copy_up(&self, p: &str, info: &FileInfo) -> Result<()> {
        let writable = self.writable_layer()?;
        if writable.backend.stat(p).is_ok() {
            return Ok(());
        }
        self.ensure_parent_dir(p)?;
        if info.is_dir {
            self.copy_up_dir(p, info)
        } else {
            self.copy_up_file(p, info)
        }
    }

    fn copy_up_dir(&self, p: &str, info: &FileInfo) -> Result<()> {
        let writable = self.writable_layer()?;
        writable.backend.mkdir_all(p, info.mode)?;
        writable.backend.chmod(p, info.mode)?;
        if let Err(err) = writable.backend.chtimes(p, info.modified, info.modified) {
            debug!(path = %p, %err, "copy-up chtimes failed");
        }
        Ok(())
    }

    fn copy_up_file(&self, p: &str, info: &FileInfo) -> Result<()> {
        let writable = self.writable_layer()?;
        let (_, layer_idx) = self.find(p)?;
        if layer_idx == 0 {
            return Ok(());
        }
        debug!(path = %p, from_layer = layer_idx, "copying up");

        let source_layer = self.layer(layer_idx);
        let mut src = source_layer.backend.open(p)?;
        let mut dst = writable.backend.open_file(
            p,
            OpenFlags::CREATE | OpenFlags::WRONLY | OpenFlags::TRUNC,
            info.mode,
        )?;

        let mut buf = vec![0u8; self.copy_buffer_size()];
        loop {
            let n = src
                .read(&mut buf)
                .map_err(|e| StrataError::io("copyup", p, e))?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n])
                .map_err(|e| StrataError::io("copyup", p, e))?;
        }
        drop(dst);

        writable.backend.chmod(p, info.mode)?;
        if let Err(err) = writable.backend.chtimes(p, info.modified, info.modified) {
            debug!(path = %p, %err, "copy-up chtimes failed");
        }
        Ok(())
    }

    /// Make sure the parent directory of `p` exists in the writable layer.
    ///
    /// When the parent only exists in a lower layer its mode and mtime are
    /// carried over; a parent that exists nowhere is created with `0o755`.
    pub(crate) fn ensure_parent_dir(&self, p: &str) -> Result<()> {
        let writable = self.writable_layer()?;
        let dir = path::parent(p);
        if dir == "/" {
            return Ok(());
        }
        if writable.backend.stat(&dir).is_ok() {
            return Ok(());
        }
        match self.find(&dir) {
            Ok((info, layer_idx)) if layer_idx > 0 && info.is_dir => self.copy_up_dir(&dir, &info),
            Ok(_) => writable.backend.mkdir_all(&dir, 0o755),
            Err(err) if err.is_not_found() => writable.backend.mkdir_all(&dir, 0o755),
            Err(err) => Err(err),
        }
    }
}
