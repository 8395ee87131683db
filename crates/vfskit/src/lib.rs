//! vfskit - Layered virtual file system
//!
//! A uniform, synchronous file-system contract ([`FileSystem`]) with
//! interchangeable backends:
//!
//! - [`RealFileSystem`] - the host operating system
//! - [`InMemoryFileSystem`] - an immutable-file tree held in memory
//! - [`OverlayFileSystem`] - a stack of backends, top layer wins
//! - [`ProxyFileSystem`] - forwards to another backend, with optional hooks
//! - [`RedirectingFileSystem`] - virtual paths mapped to external files by a
//!   declarative document
//!
//! Composite backends hold other backends as `Arc<dyn FileSystem>`, so any
//! backend can be nested inside any other.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//! use vfskit::{FileSystem, InMemoryFileSystem, OverlayFileSystem, RecursiveDirIter};
//!
//! let base = Arc::new(InMemoryFileSystem::new());
//! base.add_file("/src/main.c", SystemTime::UNIX_EPOCH, b"int main;");
//!
//! let generated = Arc::new(InMemoryFileSystem::new());
//! generated.add_file("/src/config.h", SystemTime::UNIX_EPOCH, b"#define X 1");
//!
//! let fs = OverlayFileSystem::new(base);
//! fs.push_overlay(generated);
//!
//! let mut names: Vec<_> = RecursiveDirIter::new(&fs, Path::new("/"))
//!     .unwrap()
//!     .map(|entry| entry.unwrap().path)
//!     .collect();
//! names.sort();
//! assert_eq!(names.len(), 3);
//! ```

mod buffer;
mod dir_iter;
mod error;
mod memory;
mod overlay;
mod path;
mod proxy;
mod real;
mod redirecting;
mod status;
mod traits;

pub mod mapping;

pub use buffer::FileBuffer;
pub use dir_iter::{DirEntry, DirIter, DirIterImpl, ListDirIter, RecursiveDirIter};
pub use error::{Error, Result};
pub use mapping::{Diagnostic, MappingWriter};
pub use memory::{FileOptions, InMemoryFileSystem};
pub use overlay::OverlayFileSystem;
pub use path::remove_dots;
pub use proxy::{Intercept, PassThrough, ProxyFileSystem};
pub use real::{real_file_system, RealFileSystem};
pub use redirecting::{RedirectingBuilder, RedirectingFileSystem};
pub use status::{next_virtual_unique_id, FileType, Status, UniqueId, ALL_PERMS, OWNER_ALL};
pub use traits::{File, FileSystem};
