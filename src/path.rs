//! Virtual path handling and whiteout markers.
//!
//! Every path the engine touches is a virtual path: absolute, `/`-separated,
//! compared byte-for-byte. Whiteouts follow the AUFS/Docker convention: a
//! file named `foo` is hidden by an empty marker file `.wh.foo` in the same
//! directory, and a directory containing `.wh.__dir_opaque` hides all of its
//! lower-layer contents. This module is pure string manipulation; it never
//! touches a backend.

/// Prefix for whiteout marker files.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker file that makes a directory opaque (hides lower-layer contents).
pub const OPAQUE_MARKER: &str = ".wh.__dir_opaque";

/// Normalize a virtual path: absolute, forward slashes, no `.` or `..`
/// segments, no trailing slash except for the root itself.
///
/// `clean` is idempotent and purely syntactic; `..` at the root is dropped.
pub fn clean(p: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(p.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Split a path into its ordered segments. The root yields an empty list.
pub fn split(p: &str) -> Vec<String> {
    let cleaned = clean(p);
    if cleaned == "/" {
        return Vec::new();
    }
    cleaned[1..].split('/').map(str::to_string).collect()
}

/// The parent directory of a cleaned path. The root is its own parent.
pub fn parent(p: &str) -> String {
    let cleaned = clean(p);
    match cleaned.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
    }
}

/// The final segment of a cleaned path. The root's base name is `/`.
pub fn base(p: &str) -> String {
    let cleaned = clean(p);
    match cleaned.rfind('/') {
        Some(idx) if cleaned.len() > 1 => cleaned[idx + 1..].to_string(),
        _ => "/".to_string(),
    }
}

/// Join a directory and a child name, cleaning the result.
pub fn join(dir: &str, name: &str) -> String {
    clean(&format!("{}/{}", dir, name))
}

/// The whiteout marker path for `p`: `parent(p)/.wh.base(p)`.
pub fn whiteout_for(p: &str) -> String {
    let cleaned = clean(p);
    join(&parent(&cleaned), &format!("{}{}", WHITEOUT_PREFIX, base(&cleaned)))
}

/// Decode a whiteout marker path back to the path it hides.
///
/// Returns `None` when the base name is not a whiteout marker, and also for
/// the opaque marker: `.wh.__dir_opaque` never stands for a file named
/// `__dir_opaque`.
pub fn decode_whiteout(p: &str) -> Option<String> {
    let cleaned = clean(p);
    let name = base(&cleaned);
    let target = name.strip_prefix(WHITEOUT_PREFIX)?;
    if target == "__dir_opaque" || target.is_empty() {
        return None;
    }
    Some(join(&parent(&cleaned), target))
}

/// Whether a base name is a whiteout marker (including the opaque marker).
pub fn is_whiteout(name: &str) -> bool {
    base(name).starts_with(WHITEOUT_PREFIX)
}

/// Whether a base name is the opaque directory marker.
pub fn is_opaque(name: &str) -> bool {
    base(name) == OPAQUE_MARKER
}
