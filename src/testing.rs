//! In-memory reference backend for tests.
//!
//! [`MemBackend`] implements every required and optional [`Backend`]
//! capability over plain maps behind a readers-writer lock. It exists so the
//! engine's unit and integration tests can run without touching a host
//! filesystem, and doubles as a reference for the trait contract (error
//! kinds, path handling, capability probing).
//!
//! One deliberate simplification: `stat` does not dereference symlinks, it
//! reports the link itself (`is_symlink` set). The engine's resolution layer
//! is what follows links, so the tests exercise that logic rather than the
//! backend's.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::backend::{Backend, File, FileInfo, OpenFlags};
use crate::error::{Result, StrataError};
use crate::path;

#[derive(Debug, Clone)]
struct Meta {
    mode: u32,
    mtime: SystemTime,
    uid: u32,
    gid: u32,
}

impl Meta {
    fn new(mode: u32) -> Self {
        Meta {
            mode,
            mtime: SystemTime::now(),
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct FileNode {
    data: Vec<u8>,
    meta: Meta,
}

#[derive(Debug, Clone)]
struct DirNode {
    meta: Meta,
}

#[derive(Debug, Clone)]
struct LinkNode {
    target: String,
    meta: Meta,
}

#[derive(Default)]
struct MemState {
    files: FxHashMap<String, FileNode>,
    dirs: FxHashMap<String, DirNode>,
    links: FxHashMap<String, LinkNode>,
}

impl MemState {
    fn info(&self, p: &str) -> Option<FileInfo> {
        if let Some(node) = self.files.get(p) {
            return Some(FileInfo {
                name: path::base(p),
                size: node.data.len() as u64,
                mode: node.meta.mode,
                modified: node.meta.mtime,
                is_dir: false,
                is_symlink: false,
            });
        }
        if let Some(node) = self.dirs.get(p) {
            return Some(FileInfo {
                name: path::base(p),
                size: 0,
                mode: node.meta.mode,
                modified: node.meta.mtime,
                is_dir: true,
                is_symlink: false,
            });
        }
        if let Some(node) = self.links.get(p) {
            return Some(FileInfo {
                name: path::base(p),
                size: node.target.len() as u64,
                mode: node.meta.mode,
                modified: node.meta.mtime,
                is_dir: false,
                is_symlink: true,
            });
        }
        None
    }

    fn exists(&self, p: &str) -> bool {
        self.files.contains_key(p) || self.dirs.contains_key(p) || self.links.contains_key(p)
    }

    fn meta_mut(&mut self, p: &str) -> Option<&mut Meta> {
        if let Some(node) = self.files.get_mut(p) {
            return Some(&mut node.meta);
        }
        if let Some(node) = self.dirs.get_mut(p) {
            return Some(&mut node.meta);
        }
        if let Some(node) = self.links.get_mut(p) {
            return Some(&mut node.meta);
        }
        None
    }

    fn has_children(&self, p: &str) -> bool {
        let is_child = |key: &str| key != p && path::parent(key) == p;
        self.files.keys().any(|k| is_child(k))
            || self.dirs.keys().any(|k| is_child(k))
            || self.links.keys().any(|k| is_child(k))
    }

    fn children(&self, p: &str) -> Vec<FileInfo> {
        let mut names: Vec<&String> = self
            .files
            .keys()
            .chain(self.dirs.keys())
            .chain(self.links.keys())
            .filter(|k| k.as_str() != p && path::parent(k.as_str()) == p)
            .collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|k| self.info(k))
            .collect()
    }
}

/// A complete in-memory [`Backend`] implementation.
///
/// Clones share the same underlying state, so a test can keep a handle to a
/// layer it handed to the engine and inspect it directly afterwards.
#[derive(Clone)]
pub struct MemBackend {
    state: Arc<RwLock<MemState>>,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBackend {
    pub fn new() -> Self {
        let mut state = MemState::default();
        state.dirs.insert("/".to_string(), DirNode { meta: Meta::new(0o755) });
        MemBackend {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Seed a file, creating parent directories as needed. Test convenience.
    pub fn write_file(&self, p: &str, data: &[u8]) -> Result<()> {
        let p = path::clean(p);
        self.mkdir_all(&path::parent(&p), 0o755)?;
        let mut file = self.open_file(
            &p,
            OpenFlags::CREATE | OpenFlags::WRONLY | OpenFlags::TRUNC,
            0o644,
        )?;
        file.write_all(data)
            .map_err(|e| StrataError::io("write", &p, e))?;
        Ok(())
    }

    /// Raw file contents, if the path is a regular file. Test convenience.
    pub fn read_file(&self, p: &str) -> Option<Vec<u8>> {
        let p = path::clean(p);
        self.state.read().files.get(&p).map(|n| n.data.clone())
    }

    /// Every path stored in this backend except the root, sorted. Lets tests
    /// assert the exact contents of a layer.
    pub fn paths(&self) -> Vec<String> {
        let state = self.state.read();
        let mut all: Vec<String> = state
            .files
            .keys()
            .chain(state.dirs.keys())
            .chain(state.links.keys())
            .filter(|k| k.as_str() != "/")
            .cloned()
            .collect();
        all.sort();
        all
    }

    pub fn contains(&self, p: &str) -> bool {
        self.state.read().exists(&path::clean(p))
    }
}

impl Backend for MemBackend {
    fn stat(&self, p: &str) -> Result<FileInfo> {
        let p = path::clean(p);
        self.state
            .read()
            .info(&p)
            .ok_or_else(|| StrataError::not_found("stat", &p))
    }

    fn open(&self, p: &str) -> Result<Box<dyn File>> {
        self.open_file(p, OpenFlags::RDONLY, 0)
    }

    fn create(&self, p: &str) -> Result<Box<dyn File>> {
        self.open_file(
            p,
            OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC,
            0o666,
        )
    }

    fn open_file(&self, p: &str, flags: OpenFlags, mode: u32) -> Result<Box<dyn File>> {
        let p = path::clean(p);
        let mut state = self.state.write();

        if state.dirs.contains_key(&p) {
            if flags.is_write() {
                return Err(StrataError::invalid("open", &p));
            }
            return Ok(Box::new(MemFile::directory(self.state.clone(), p)));
        }

        let exists = state.files.contains_key(&p);
        if exists && flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
            return Err(StrataError::already_exists("open", &p));
        }
        if !exists {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(StrataError::not_found("open", &p));
            }
            let dir = path::parent(&p);
            if !state.dirs.contains_key(&dir) {
                return Err(StrataError::not_found("open", &dir));
            }
            state.files.insert(
                p.clone(),
                FileNode {
                    data: Vec::new(),
                    meta: Meta::new(mode),
                },
            );
        } else if flags.contains(OpenFlags::TRUNC) {
            let node = state.files.get_mut(&p).unwrap();
            node.data.clear();
            node.meta.mtime = SystemTime::now();
        }

        let writable = flags.intersects(OpenFlags::WRONLY | OpenFlags::RDWR | OpenFlags::APPEND);
        Ok(Box::new(MemFile::regular(
            self.state.clone(),
            p,
            !flags.contains(OpenFlags::WRONLY),
            writable,
            flags.contains(OpenFlags::APPEND),
        )))
    }

    fn mkdir(&self, p: &str, mode: u32) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        if state.exists(&p) {
            return Err(StrataError::already_exists("mkdir", &p));
        }
        let dir = path::parent(&p);
        if !state.dirs.contains_key(&dir) {
            return Err(StrataError::not_found("mkdir", &dir));
        }
        state.dirs.insert(p, DirNode { meta: Meta::new(mode) });
        Ok(())
    }

    fn mkdir_all(&self, p: &str, mode: u32) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        let mut current = String::from("");
        for segment in path::split(&p) {
            current.push('/');
            current.push_str(&segment);
            if state.dirs.contains_key(&current) {
                continue;
            }
            if state.exists(&current) {
                return Err(StrataError::invalid("mkdir", &current));
            }
            state
                .dirs
                .insert(current.clone(), DirNode { meta: Meta::new(mode) });
        }
        Ok(())
    }

    fn remove(&self, p: &str) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        if state.files.remove(&p).is_some() || state.links.remove(&p).is_some() {
            return Ok(());
        }
        if state.dirs.contains_key(&p) {
            if state.has_children(&p) {
                return Err(StrataError::io(
                    "remove",
                    &p,
                    io::Error::new(io::ErrorKind::Other, "directory not empty"),
                ));
            }
            state.dirs.remove(&p);
            return Ok(());
        }
        Err(StrataError::not_found("remove", &p))
    }

    fn remove_all(&self, p: &str) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        let in_tree = |key: &str| {
            key == p
                || key
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        };
        state.files.retain(|k, _| !in_tree(k));
        state.links.retain(|k, _| !in_tree(k));
        state.dirs.retain(|k, _| k == "/" || !in_tree(k));
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = path::clean(old);
        let new = path::clean(new);
        let mut state = self.state.write();
        if !state.exists(&old) {
            return Err(StrataError::not_found("rename", &old));
        }
        let dir = path::parent(&new);
        if !state.dirs.contains_key(&dir) {
            return Err(StrataError::not_found("rename", &dir));
        }

        if let Some(node) = state.files.remove(&old) {
            state.files.insert(new, node);
            return Ok(());
        }
        if let Some(node) = state.links.remove(&old) {
            state.links.insert(new, node);
            return Ok(());
        }

        // Directory: move the node and rewrite every descendant key.
        let node = state.dirs.remove(&old).unwrap();
        state.dirs.insert(new.clone(), node);
        let rekey = |map_keys: Vec<String>| -> Vec<(String, String)> {
            map_keys
                .into_iter()
                .filter_map(|k| {
                    k.strip_prefix(old.as_str())
                        .filter(|rest| rest.starts_with('/'))
                        .map(|rest| (k.clone(), format!("{}{}", new, rest)))
                })
                .collect()
        };
        for (from, to) in rekey(state.files.keys().cloned().collect()) {
            let node = state.files.remove(&from).unwrap();
            state.files.insert(to, node);
        }
        for (from, to) in rekey(state.dirs.keys().cloned().collect()) {
            let node = state.dirs.remove(&from).unwrap();
            state.dirs.insert(to, node);
        }
        for (from, to) in rekey(state.links.keys().cloned().collect()) {
            let node = state.links.remove(&from).unwrap();
            state.links.insert(to, node);
        }
        Ok(())
    }

    fn chmod(&self, p: &str, mode: u32) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        match state.meta_mut(&p) {
            Some(meta) => {
                meta.mode = mode;
                Ok(())
            }
            None => Err(StrataError::not_found("chmod", &p)),
        }
    }

    fn chown(&self, p: &str, uid: u32, gid: u32) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        match state.meta_mut(&p) {
            Some(meta) => {
                meta.uid = uid;
                meta.gid = gid;
                Ok(())
            }
            None => Err(StrataError::not_found("chown", &p)),
        }
    }

    fn chtimes(&self, p: &str, _atime: SystemTime, mtime: SystemTime) -> Result<()> {
        let p = path::clean(p);
        let mut state = self.state.write();
        match state.meta_mut(&p) {
            Some(meta) => {
                meta.mtime = mtime;
                Ok(())
            }
            None => Err(StrataError::not_found("chtimes", &p)),
        }
    }

    fn read_dir(&self, p: &str) -> Result<Vec<FileInfo>> {
        let p = path::clean(p);
        let state = self.state.read();
        if state.dirs.contains_key(&p) {
            return Ok(state.children(&p));
        }
        if state.exists(&p) {
            return Err(StrataError::invalid("readdir", &p));
        }
        Err(StrataError::not_found("readdir", &p))
    }

    fn lstat(&self, p: &str) -> Option<Result<FileInfo>> {
        let p = path::clean(p);
        Some(
            self.state
                .read()
                .info(&p)
                .ok_or_else(|| StrataError::not_found("lstat", &p)),
        )
    }

    fn readlink(&self, p: &str) -> Option<Result<String>> {
        let p = path::clean(p);
        let state = self.state.read();
        Some(match state.links.get(&p) {
            Some(node) => Ok(node.target.clone()),
            None if state.exists(&p) => Err(StrataError::invalid("readlink", &p)),
            None => Err(StrataError::not_found("readlink", &p)),
        })
    }

    fn symlink(&self, target: &str, link: &str) -> Option<Result<()>> {
        let link = path::clean(link);
        let mut state = self.state.write();
        if state.exists(&link) {
            return Some(Err(StrataError::already_exists("symlink", &link)));
        }
        let dir = path::parent(&link);
        if !state.dirs.contains_key(&dir) {
            return Some(Err(StrataError::not_found("symlink", &dir)));
        }
        state.links.insert(
            link,
            LinkNode {
                target: target.to_string(),
                meta: Meta::new(0o777),
            },
        );
        Some(Ok(()))
    }

    fn lchown(&self, p: &str, uid: u32, gid: u32) -> Option<Result<()>> {
        let p = path::clean(p);
        let mut state = self.state.write();
        Some(match state.links.get_mut(&p) {
            Some(node) => {
                node.meta.uid = uid;
                node.meta.gid = gid;
                Ok(())
            }
            None => match state.meta_mut(&p) {
                Some(meta) => {
                    meta.uid = uid;
                    meta.gid = gid;
                    Ok(())
                }
                None => Err(StrataError::not_found("lchown", &p)),
            },
        })
    }
}

/// Handle over a file or directory stored in a [`MemBackend`].
struct MemFile {
    state: Arc<RwLock<MemState>>,
    path: String,
    name: String,
    cursor: u64,
    readable: bool,
    writable: bool,
    append: bool,
    is_dir: bool,
    dir_entries: Option<Vec<FileInfo>>,
    dir_offset: usize,
}

impl MemFile {
    fn regular(
        state: Arc<RwLock<MemState>>,
        path: String,
        readable: bool,
        writable: bool,
        append: bool,
    ) -> Self {
        MemFile {
            name: path::base(&path),
            state,
            path,
            cursor: 0,
            readable,
            writable,
            append,
            is_dir: false,
            dir_entries: None,
            dir_offset: 0,
        }
    }

    fn directory(state: Arc<RwLock<MemState>>, path: String) -> Self {
        MemFile {
            name: path::base(&path),
            state,
            path,
            cursor: 0,
            readable: true,
            writable: false,
            append: false,
            is_dir: true,
            dir_entries: None,
            dir_offset: 0,
        }
    }

    fn len(&self) -> io::Result<u64> {
        let state = self.state.read();
        state
            .files
            .get(&self.path)
            .map(|n| n.data.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.path.clone()))
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_dir || !self.readable {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not readable"));
        }
        let state = self.state.read();
        let node = state
            .files
            .get(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.path.clone()))?;
        let start = self.cursor.min(node.data.len() as u64) as usize;
        let n = (node.data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        drop(state);
        self.cursor += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_dir || !self.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not writable"));
        }
        let mut state = self.state.write();
        let node = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.path.clone()))?;
        let pos = if self.append {
            node.data.len()
        } else {
            self.cursor as usize
        };
        if pos + buf.len() > node.data.len() {
            node.data.resize(pos + buf.len(), 0);
        }
        node.data[pos..pos + buf.len()].copy_from_slice(buf);
        node.meta.mtime = SystemTime::now();
        drop(state);
        self.cursor = (pos + buf.len()) as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(d) => self.cursor as i64 + d,
            SeekFrom::End(d) => self.len()? as i64 + d,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative seek position",
            ));
        }
        self.cursor = next as u64;
        Ok(self.cursor)
    }
}

impl File for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> Result<FileInfo> {
        self.state
            .read()
            .info(&self.path)
            .ok_or_else(|| StrataError::not_found("stat", &self.path))
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if self.is_dir || !self.writable {
            return Err(StrataError::invalid("truncate", &self.path));
        }
        let mut state = self.state.write();
        let node = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| StrataError::not_found("truncate", &self.path))?;
        node.data.resize(size as usize, 0);
        node.meta.mtime = SystemTime::now();
        Ok(())
    }

    fn read_dir(&mut self, count: i64) -> Result<Vec<FileInfo>> {
        if !self.is_dir {
            return Err(StrataError::invalid("readdir", &self.path));
        }
        if self.dir_entries.is_none() {
            let state = self.state.read();
            self.dir_entries = Some(state.children(&self.path));
        }
        let entries = self.dir_entries.as_ref().unwrap();
        let remaining = entries.len().saturating_sub(self.dir_offset);
        let take = if count <= 0 {
            remaining
        } else {
            remaining.min(count as usize)
        };
        let batch = entries[self.dir_offset..self.dir_offset + take].to_vec();
        self.dir_offset += take;
        Ok(batch)
    }
}
