//! The capability interface the engine consumes, one per layer.
//!
//! A [`Backend`] is a minimal filesystem: the required operations cover
//! everything the union engine needs for reads, mutations, and directory
//! walks. Symlink-related operations are optional capabilities, modeled as
//! default methods returning `None`; the engine probes them at call time and
//! degrades the way each operation documents.
//!
//! Backends always receive the cleaned virtual path (absolute, `/`-separated)
//! the engine normalized. Adapters for backends with other path conventions
//! convert at their own boundary.

use std::io::{Read, Seek, Write};
use std::time::SystemTime;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Open flags the engine's copy-on-write discipline keys on.
    ///
    /// `RDONLY` is the empty set, matching the POSIX encoding the source
    /// semantics come from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY = 1 << 0;
        const RDWR   = 1 << 1;
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        const TRUNC  = 1 << 4;
        const EXCL   = 1 << 5;
    }
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    /// Whether these flags carry write intent.
    pub fn is_write(self) -> bool {
        self.intersects(
            OpenFlags::WRONLY
                | OpenFlags::RDWR
                | OpenFlags::APPEND
                | OpenFlags::CREATE
                | OpenFlags::TRUNC,
        )
    }
}

/// Metadata for a single filesystem entry, as reported by a backend stat.
///
/// The engine never fabricates a `FileInfo`; every instance originates from
/// a backend and is passed through (or cached) unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name of the entry (no directory components).
    pub name: String,
    /// Size in bytes. Zero for directories.
    pub size: u64,
    /// Permission bits, e.g. `0o644`.
    pub mode: u32,
    /// Last modification time.
    pub modified: SystemTime,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// An open handle obtained from a backend or from the engine.
///
/// Regular file handles support the `std::io` traits plus [`File::truncate`];
/// directory handles support [`File::read_dir`] and seeking over the entry
/// list, and fail reads and writes with an invalid-operation error.
pub trait File: Read + Write + Seek + Send {
    /// Base name of the open entry.
    fn name(&self) -> &str;

    fn stat(&self) -> Result<FileInfo>;

    /// Flush buffered state to the backend. No-op for most backends.
    fn sync(&mut self) -> Result<()>;

    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Read directory entries from a directory handle.
    ///
    /// `count <= 0` returns every remaining entry; `count > 0` returns up to
    /// `count` entries, an empty vector once the listing is exhausted. File
    /// handles fail with an invalid-operation error.
    fn read_dir(&mut self, count: i64) -> Result<Vec<FileInfo>>;
}

/// The per-layer filesystem capability set the engine consumes.
///
/// Required operations must report missing paths as `StrataError::NotFound`
/// so the resolver can keep scanning lower layers; any other error aborts
/// the enclosing engine operation.
pub trait Backend: Send + Sync {
    fn stat(&self, path: &str) -> Result<FileInfo>;

    fn open(&self, path: &str) -> Result<Box<dyn File>>;

    fn create(&self, path: &str) -> Result<Box<dyn File>>;

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<Box<dyn File>>;

    fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    fn mkdir_all(&self, path: &str, mode: u32) -> Result<()>;

    fn remove(&self, path: &str) -> Result<()>;

    fn remove_all(&self, path: &str) -> Result<()>;

    fn rename(&self, old: &str, new: &str) -> Result<()>;

    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()>;

    fn chtimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()>;

    /// List a directory's entries. Order is backend-defined; the engine
    /// sorts after merging.
    fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// Stat without following a final symlink. `None` when the backend does
    /// not support symlinks.
    fn lstat(&self, _path: &str) -> Option<Result<FileInfo>> {
        None
    }

    /// Read a symlink's target. `None` when unsupported.
    fn readlink(&self, _path: &str) -> Option<Result<String>> {
        None
    }

    /// Create a symlink at `link` pointing to `target`. `None` when
    /// unsupported.
    fn symlink(&self, _target: &str, _link: &str) -> Option<Result<()>> {
        None
    }

    /// Change ownership of a symlink itself. `None` when unsupported; the
    /// engine falls back to `chown`.
    fn lchown(&self, _path: &str, _uid: u32, _gid: u32) -> Option<Result<()>> {
        None
    }
}
