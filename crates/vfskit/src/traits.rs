//! Backend contract.

use std::path::{Path, PathBuf};

use crate::buffer::FileBuffer;
use crate::dir_iter::DirIter;
use crate::error::{Error, Result};
use crate::path::absolutize;
use crate::status::Status;

/// An open entry.
///
/// Created by [`FileSystem::open_file_for_read`]. Dropping the handle closes it;
/// [`File::close`] only makes the close explicit. A handle must not be shared
/// across threads without external synchronization.
pub trait File: Send {
    /// Status of the open entry, named the way the caller opened it.
    fn status(&self) -> Result<Status>;

    /// Display name, as reported by [`File::status`].
    fn name(&self) -> Result<PathBuf> {
        Ok(self.status()?.name().to_path_buf())
    }

    /// Read the whole file.
    ///
    /// `size_hint` pre-sizes the read when known. `is_volatile` marks files
    /// that may change while read; contents are always copied so it is only
    /// advisory.
    fn buffer(
        &mut self,
        name: &Path,
        size_hint: Option<u64>,
        requires_null_terminator: bool,
        is_volatile: bool,
    ) -> Result<FileBuffer>;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()>;

    /// Name the OS resolved when opening, if it differs from the requested one.
    fn real_name(&self) -> Option<&Path> {
        None
    }
}

/// File-system backend.
///
/// Implemented by every backend: real, in-memory, overlay, proxy and
/// redirecting. Composite backends hold other backends as
/// `Arc<dyn FileSystem>`, so any backend can be nested inside any other.
///
/// # Thread Safety
///
/// Reads (`status`, `open_file_for_read`, `dir_begin`) may run concurrently.
/// Mutation goes through interior locks, but callers that interleave mutation
/// with reads and need a consistent view must serialize them.
pub trait FileSystem: Send + Sync {
    /// Metadata for `path`, without opening it.
    fn status(&self, path: &Path) -> Result<Status>;

    /// Open `path` for reading.
    ///
    /// # Errors
    /// - `NotFound` if nothing is at `path`
    /// - `NotAFile` if `path` is a directory
    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>>;

    /// Begin a single-level enumeration of `dir`.
    ///
    /// # Errors
    /// - `NotFound` if nothing is at `dir`
    /// - `NotADirectory` if `dir` is not a directory
    fn dir_begin(&self, dir: &Path) -> Result<DirIter>;

    fn current_working_directory(&self) -> Result<PathBuf>;

    fn set_current_working_directory(&self, path: &Path) -> Result<()>;

    /// Resolve `path` against the working directory if it is relative.
    fn make_absolute(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        Ok(absolutize(&self.current_working_directory()?, path))
    }

    /// Canonical path with symlinks resolved.
    ///
    /// Unsupported unless the backend overrides it.
    fn real_path(&self, path: &Path) -> Result<PathBuf> {
        let _ = path;
        Err(Error::NotPermitted)
    }

    /// Whether `path` is on local (non-network) storage.
    ///
    /// Unsupported unless the backend overrides it.
    fn is_local(&self, path: &Path) -> Result<bool> {
        let _ = path;
        Err(Error::NotPermitted)
    }

    /// True if `path` has a known, existing status.
    fn exists(&self, path: &Path) -> bool {
        self.status(path).map(|s| s.exists()).unwrap_or(false)
    }

    /// Open, read fully, and close `path`.
    fn buffer_for_file(
        &self,
        path: &Path,
        size_hint: Option<u64>,
        requires_null_terminator: bool,
        is_volatile: bool,
    ) -> Result<FileBuffer> {
        let mut file = self.open_file_for_read(path)?;
        file.buffer(path, size_hint, requires_null_terminator, is_volatile)
    }
}
