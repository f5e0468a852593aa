//! Merged directory listings and the open-directory handle.

use std::io::{self, Read, Seek, SeekFrom, Write};

use fxhash::FxHashSet;

use crate::backend::{File, FileInfo};
use crate::error::{Result, StrataError};
use crate::path;

use super::resolver::hidden_by_upper;
use super::Layer;

/// Merge one directory's entries across the layer stack.
///
/// The walk runs top-down over layers `0..=O`, where `O` is the topmost
/// layer holding the opaque marker for this directory (the marker's own
/// layer stays visible as the merge root; everything below is hidden), or
/// the whole stack when no marker exists. Whiteout markers record the name
/// they hide and are never emitted; a name already emitted by an upper layer
/// shadows lower occurrences. Layers where the directory is missing or
/// unreadable contribute nothing.
///
/// The result is sorted ascending by lower-cased name. This ordering is part
/// of the engine's contract.
pub(crate) fn merge_entries(layers: &[Layer], dir_path: &str) -> Vec<FileInfo> {
    let marker = path::join(dir_path, path::OPAQUE_MARKER);
    let limit = layers
        .iter()
        .position(|layer| layer.backend.stat(&marker).is_ok())
        .map(|idx| idx + 1)
        .unwrap_or(layers.len());

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut whited_out: FxHashSet<String> = FxHashSet::default();
    let mut entries: Vec<FileInfo> = Vec::new();

    for (idx, layer) in layers[..limit].iter().enumerate() {
        if hidden_by_upper(layers, dir_path, idx) {
            continue;
        }
        let layer_entries = match layer.backend.read_dir(dir_path) {
            Ok(list) => list,
            Err(_) => continue,
        };
        for entry in layer_entries {
            if path::is_whiteout(&entry.name) {
                // The opaque marker decodes to nothing; plain whiteouts
                // record the base name they hide.
                if let Some(target) = path::decode_whiteout(&entry.name) {
                    whited_out.insert(path::base(&target));
                }
                continue;
            }
            if seen.contains(&entry.name) || whited_out.contains(&entry.name) {
                continue;
            }
            seen.insert(entry.name.clone());
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    entries
}

/// Handle over an open merged directory.
///
/// The merged listing is snapshotted on first read (or on a seek from the
/// end) and later reads and seeks operate on that snapshot; mutations made
/// after the snapshot are not reflected. Reads and writes of byte content
/// fail: this handle only lists.
pub struct UnionDir {
    layers: Vec<Layer>,
    dir_path: String,
    info: FileInfo,
    entries: Option<Vec<FileInfo>>,
    offset: i64,
}

impl UnionDir {
    pub(crate) fn new(layers: Vec<Layer>, dir_path: String, info: FileInfo) -> Self {
        UnionDir {
            layers,
            dir_path,
            info,
            entries: None,
            offset: 0,
        }
    }

    fn load(&mut self) -> &[FileInfo] {
        if self.entries.is_none() {
            self.entries = Some(merge_entries(&self.layers, &self.dir_path));
        }
        self.entries.as_deref().unwrap()
    }
}

impl Read for UnionDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(StrataError::invalid("read", &self.dir_path).into())
    }
}

impl Write for UnionDir {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(StrataError::invalid("write", &self.dir_path).into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for UnionDir {
    /// Seek over the entry listing. A resulting negative position clamps
    /// to 0 rather than failing.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(n) => self.offset = n as i64,
            SeekFrom::Current(delta) => self.offset += delta,
            SeekFrom::End(delta) => {
                let len = self.load().len() as i64;
                self.offset = len + delta;
            }
        }
        if self.offset < 0 {
            self.offset = 0;
        }
        Ok(self.offset as u64)
    }
}

impl File for UnionDir {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn stat(&self) -> Result<FileInfo> {
        Ok(self.info.clone())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, _size: u64) -> Result<()> {
        Err(StrataError::invalid("truncate", &self.dir_path))
    }

    fn read_dir(&mut self, count: i64) -> Result<Vec<FileInfo>> {
        let offset = self.offset.max(0) as usize;
        let entries = self.load();
        let start = offset.min(entries.len());
        let remaining = entries.len() - start;
        let take = if count <= 0 {
            remaining
        } else {
            remaining.min(count as usize)
        };
        let batch = entries[start..start + take].to_vec();
        self.offset = (start + take) as i64;
        Ok(batch)
    }
}
