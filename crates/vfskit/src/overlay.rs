//! Overlay filesystem implementation.
//!
//! [`OverlayFileSystem`] stacks backends. Lookups try the most recently
//! pushed layer first and fall through to lower layers only when a layer
//! reports that the path does not exist. Any other error stops the lookup.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//! use vfskit::{FileSystem, InMemoryFileSystem, OverlayFileSystem};
//!
//! let lower = Arc::new(InMemoryFileSystem::new());
//! lower.add_file("/etc/config", SystemTime::UNIX_EPOCH, b"lower");
//!
//! let upper = Arc::new(InMemoryFileSystem::new());
//! upper.add_file("/etc/config", SystemTime::UNIX_EPOCH, b"upper");
//!
//! let overlay = OverlayFileSystem::new(lower);
//! overlay.push_overlay(upper);
//!
//! let buf = overlay.buffer_for_file(Path::new("/etc/config"), None, false, false).unwrap();
//! assert_eq!(buf.as_bytes(), b"upper");
//! ```

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::dir_iter::{CombiningDirIter, DirIter};
use crate::error::{Error, Result};
use crate::status::Status;
use crate::traits::{File, FileSystem};

/// Stack of file systems, top layer first for lookups.
///
/// The base layer is given at construction and can never be removed.
pub struct OverlayFileSystem {
    /// Base first; lookups walk this in reverse.
    layers: RwLock<Vec<Arc<dyn FileSystem>>>,
}

impl OverlayFileSystem {
    pub fn new(base: Arc<dyn FileSystem>) -> Self {
        Self {
            layers: RwLock::new(vec![base]),
        }
    }

    /// Push `fs` on top of the stack.
    ///
    /// The new layer inherits the base layer's working directory. Failing to
    /// transfer it is logged and otherwise ignored.
    pub fn push_overlay(&self, fs: Arc<dyn FileSystem>) {
        let mut layers = self.layers.write().unwrap();
        match layers[0].current_working_directory() {
            Ok(cwd) => {
                if let Err(err) = fs.set_current_working_directory(&cwd) {
                    tracing::warn!(cwd = %cwd.display(), error = %err, "overlay: could not set working directory on new layer");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "overlay: base layer has no working directory");
            }
        }
        layers.push(fs);
    }

    /// All layers, base first.
    pub fn layers(&self) -> Vec<Arc<dyn FileSystem>> {
        self.layers.read().unwrap().clone()
    }

    /// Layers in lookup order (top first). Snapshot so callbacks run unlocked.
    fn top_down(&self) -> Vec<Arc<dyn FileSystem>> {
        let mut layers = self.layers();
        layers.reverse();
        layers
    }

    /// Run `op` on each layer until one succeeds or fails with something
    /// other than not-found.
    fn first_hit<T>(&self, path: &Path, mut op: impl FnMut(&dyn FileSystem) -> Result<T>) -> Result<T> {
        for (depth, layer) in self.top_down().iter().enumerate() {
            match op(layer.as_ref()) {
                Err(err) if err.is_not_found() => {
                    tracing::debug!(path = %path.display(), depth, "overlay: fall through");
                }
                result => return result,
            }
        }
        Err(Error::NotFound(path.to_path_buf()))
    }

    /// Top-most layer where `path` exists.
    fn owning_layer(&self, path: &Path) -> Result<Arc<dyn FileSystem>> {
        self.top_down()
            .into_iter()
            .find(|layer| layer.exists(path))
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }
}

impl FileSystem for OverlayFileSystem {
    fn status(&self, path: &Path) -> Result<Status> {
        self.first_hit(path, |fs| fs.status(path))
    }

    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>> {
        self.first_hit(path, |fs| fs.open_file_for_read(path))
    }

    /// Merged listing of `dir` across layers.
    ///
    /// Upper layers shadow lower entries with the same name. Lower layers are
    /// only opened once the upper ones are exhausted.
    fn dir_begin(&self, dir: &Path) -> Result<DirIter> {
        let layers = self.top_down();
        for (index, layer) in layers.iter().enumerate() {
            match layer.dir_begin(dir) {
                Ok(first) => {
                    let rest = layers[index + 1..].iter().cloned();
                    return Ok(DirIter::new(CombiningDirIter::new(dir, first, rest)?));
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::NotFound(dir.to_path_buf()))
    }

    fn current_working_directory(&self) -> Result<PathBuf> {
        self.layers.read().unwrap()[0].current_working_directory()
    }

    /// Set the working directory on every layer, base first.
    ///
    /// Stops at the first failure; layers above it keep their old directory.
    fn set_current_working_directory(&self, path: &Path) -> Result<()> {
        for layer in self.layers() {
            layer.set_current_working_directory(path)?;
        }
        Ok(())
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf> {
        self.owning_layer(path)?.real_path(path)
    }

    fn is_local(&self, path: &Path) -> Result<bool> {
        self.owning_layer(path)?.is_local(path)
    }
}
