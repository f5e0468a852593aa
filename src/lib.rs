//! Layered union filesystem engine with Docker/AUFS-style semantics.
//!
//! `strata` composes an ordered stack of filesystem backends into a single
//! logical view: the topmost layer wins on reads, deletions are recorded as
//! `.wh.` whiteout markers, a `.wh.__dir_opaque` marker makes a directory
//! fully override the layers below it, and the first write to lower-layer
//! content copies it up into the unique writable layer. Backends are
//! abstract ([`Backend`]); the engine itself never touches a host
//! filesystem.
//!
//! ```
//! use std::time::Duration;
//!
//! use strata::testing::MemBackend;
//! use strata::UnionFs;
//!
//! # fn main() -> strata::Result<()> {
//! let base = MemBackend::new();
//! base.write_file("/etc/config.yml", b"base: config")?;
//!
//! let fs = UnionFs::builder()
//!     .writable_layer(MemBackend::new())
//!     .readonly_layer(base.clone())
//!     .stat_cache(true, Duration::from_secs(5))
//!     .build()?;
//!
//! // Reads fall through to the base layer.
//! assert_eq!(fs.read_file("/etc/config.yml")?, b"base: config");
//!
//! // Deleting lays a whiteout; the base layer keeps its copy.
//! fs.remove("/etc/config.yml")?;
//! assert!(fs.stat("/etc/config.yml").unwrap_err().is_not_found());
//! assert_eq!(base.read_file("/etc/config.yml").unwrap(), b"base: config");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod path;
pub mod testing;
pub mod union;

pub use backend::{Backend, File, FileInfo, OpenFlags};
pub use cache::{CacheConfig, CacheStats};
pub use error::{Result, StrataError};
pub use union::{UnionDir, UnionFs, UnionFsBuilder};
