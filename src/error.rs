use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

/// Error surface for the union engine and its backends.
///
/// Every variant that originates from a concrete path carries the operation
/// label (`"stat"`, `"open"`, `"truncate"`, ...) and the virtual path for
/// diagnostics. Backends must produce `NotFound` for missing paths so the
/// resolver can distinguish "keep scanning lower layers" from a real fault.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("{op} {path}: no such file or directory")]
    NotFound { op: &'static str, path: String },

    #[error("no writable layer configured")]
    NoWritableLayer,

    #[error("{op} {path}: invalid operation")]
    Invalid { op: &'static str, path: String },

    #[error("{op} {path}: file exists")]
    AlreadyExists { op: &'static str, path: String },

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StrataError {
    pub fn not_found(op: &'static str, path: impl Into<String>) -> Self {
        StrataError::NotFound {
            op,
            path: path.into(),
        }
    }

    pub fn invalid(op: &'static str, path: impl Into<String>) -> Self {
        StrataError::Invalid {
            op,
            path: path.into(),
        }
    }

    pub fn already_exists(op: &'static str, path: impl Into<String>) -> Self {
        StrataError::AlreadyExists {
            op,
            path: path.into(),
        }
    }

    pub fn io(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        StrataError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::NotFound { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, StrataError::Invalid { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StrataError::AlreadyExists { .. })
    }

    /// The operation label attached to this error, if any.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            StrataError::NotFound { op, .. }
            | StrataError::Invalid { op, .. }
            | StrataError::AlreadyExists { op, .. }
            | StrataError::Io { op, .. } => Some(op),
            StrataError::NoWritableLayer => None,
        }
    }
}

impl From<StrataError> for io::Error {
    fn from(err: StrataError) -> io::Error {
        let kind = match &err {
            StrataError::NotFound { .. } => io::ErrorKind::NotFound,
            StrataError::NoWritableLayer => io::ErrorKind::PermissionDenied,
            StrataError::Invalid { .. } => io::ErrorKind::InvalidInput,
            StrataError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            StrataError::Io { source, .. } => source.kind(),
        };
        io::Error::new(kind, err)
    }
}
