//! Error types for vfskit
//!
//! Every backend reports failures through one [`Error`] enum so composite
//! backends can inspect the *kind* of a failure. Only "not found" means
//! "try the next layer"; every other kind is returned to the caller as-is.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using vfskit's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// vfskit error types.
#[derive(Error, Debug)]
pub enum Error {
    /// No entry exists at the path.
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    /// A directory operation was attempted on something that is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A file operation was attempted on a directory.
    #[error("invalid argument: not a file: {}", .0.display())]
    NotAFile(PathBuf),

    /// The request itself is malformed for this backend.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend does not support this capability.
    #[error("operation not permitted")]
    NotPermitted,

    /// I/O error from the host operating system.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A mapping document was rejected. Details went to the diagnostic handler.
    #[error("invalid mapping document: {errors} error(s)")]
    Mapping {
        /// Number of diagnostics reported while parsing.
        errors: usize,
    },
}

impl Error {
    /// Map a host I/O error onto the shared taxonomy.
    ///
    /// Kinds with a dedicated variant are translated and tagged with `path`;
    /// everything else is kept as [`Error::Io`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.to_path_buf()),
            io::ErrorKind::IsADirectory => Self::NotAFile(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// True if this error means the entry does not exist.
    ///
    /// Composite backends fall through to the next layer on this, and only this.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
