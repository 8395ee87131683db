//! Forwarding backend.
//!
//! [`ProxyFileSystem`] wraps another backend and forwards every operation to
//! it. An [`Intercept`] implementation can replace any subset of operations;
//! the rest keep forwarding.
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use vfskit::{Error, FileSystem, InMemoryFileSystem, Intercept, ProxyFileSystem, Result, Status};
//!
//! struct Hidden;
//!
//! impl Intercept for Hidden {
//!     fn status(&self, inner: &dyn FileSystem, path: &Path) -> Result<Status> {
//!         if path.starts_with("/secret") {
//!             return Err(Error::NotFound(path.to_path_buf()));
//!         }
//!         inner.status(path)
//!     }
//! }
//!
//! let proxy = ProxyFileSystem::with_intercept(Arc::new(InMemoryFileSystem::new()), Hidden);
//! assert!(!proxy.exists(Path::new("/secret")));
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dir_iter::DirIter;
use crate::error::Result;
use crate::status::Status;
use crate::traits::{File, FileSystem};

/// Hooks for [`ProxyFileSystem`].
///
/// Every method receives the wrapped backend and forwards to it by default.
pub trait Intercept: Send + Sync {
    fn status(&self, inner: &dyn FileSystem, path: &Path) -> Result<Status> {
        inner.status(path)
    }

    fn open_file_for_read(&self, inner: &dyn FileSystem, path: &Path) -> Result<Box<dyn File>> {
        inner.open_file_for_read(path)
    }

    fn dir_begin(&self, inner: &dyn FileSystem, dir: &Path) -> Result<DirIter> {
        inner.dir_begin(dir)
    }

    fn current_working_directory(&self, inner: &dyn FileSystem) -> Result<PathBuf> {
        inner.current_working_directory()
    }

    fn set_current_working_directory(&self, inner: &dyn FileSystem, path: &Path) -> Result<()> {
        inner.set_current_working_directory(path)
    }

    fn real_path(&self, inner: &dyn FileSystem, path: &Path) -> Result<PathBuf> {
        inner.real_path(path)
    }

    fn is_local(&self, inner: &dyn FileSystem, path: &Path) -> Result<bool> {
        inner.is_local(path)
    }
}

/// Forwards everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Intercept for PassThrough {}

/// Backend that delegates to another, optionally through an [`Intercept`].
pub struct ProxyFileSystem<I = PassThrough> {
    inner: Arc<dyn FileSystem>,
    intercept: I,
}

impl ProxyFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self::with_intercept(inner, PassThrough)
    }
}

impl<I: Intercept> ProxyFileSystem<I> {
    pub fn with_intercept(inner: Arc<dyn FileSystem>, intercept: I) -> Self {
        Self { inner, intercept }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &Arc<dyn FileSystem> {
        &self.inner
    }

    pub fn intercept(&self) -> &I {
        &self.intercept
    }
}

impl<I: Intercept> FileSystem for ProxyFileSystem<I> {
    fn status(&self, path: &Path) -> Result<Status> {
        self.intercept.status(self.inner.as_ref(), path)
    }

    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>> {
        self.intercept.open_file_for_read(self.inner.as_ref(), path)
    }

    fn dir_begin(&self, dir: &Path) -> Result<DirIter> {
        self.intercept.dir_begin(self.inner.as_ref(), dir)
    }

    fn current_working_directory(&self) -> Result<PathBuf> {
        self.intercept.current_working_directory(self.inner.as_ref())
    }

    fn set_current_working_directory(&self, path: &Path) -> Result<()> {
        self.intercept
            .set_current_working_directory(self.inner.as_ref(), path)
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf> {
        self.intercept.real_path(self.inner.as_ref(), path)
    }

    fn is_local(&self, path: &Path) -> Result<bool> {
        self.intercept.is_local(self.inner.as_ref(), path)
    }
}
