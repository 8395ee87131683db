//! Whole-file buffers returned by [`File::buffer`](crate::File::buffer).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable contents of a file.
///
/// In-memory backends hand out their stored bytes without copying. When a
/// NUL terminator is requested the bytes are copied once with a trailing `\0`,
/// which [`FileBuffer::as_bytes`] hides.
#[derive(Clone)]
pub struct FileBuffer {
    identifier: PathBuf,
    data: Arc<[u8]>,
    null_terminated: bool,
}

impl FileBuffer {
    /// Wrap shared bytes.
    pub fn new(identifier: impl Into<PathBuf>, data: Arc<[u8]>) -> Self {
        Self {
            identifier: identifier.into(),
            data,
            null_terminated: false,
        }
    }

    /// Build a buffer from owned bytes, appending a NUL if asked to.
    pub fn from_vec(
        identifier: impl Into<PathBuf>,
        mut data: Vec<u8>,
        requires_null_terminator: bool,
    ) -> Self {
        if requires_null_terminator {
            data.push(0);
        }
        Self {
            identifier: identifier.into(),
            data: data.into(),
            null_terminated: requires_null_terminator,
        }
    }

    /// Share `data`, copying only when a NUL terminator must be appended.
    pub fn from_shared(
        identifier: impl Into<PathBuf>,
        data: &Arc<[u8]>,
        requires_null_terminator: bool,
    ) -> Self {
        if requires_null_terminator {
            Self::from_vec(identifier, data.to_vec(), true)
        } else {
            Self::new(identifier, Arc::clone(data))
        }
    }

    /// Name the buffer was opened under.
    pub fn identifier(&self) -> &Path {
        &self.identifier
    }

    /// File contents, without any terminator.
    pub fn as_bytes(&self) -> &[u8] {
        if self.null_terminated {
            &self.data[..self.data.len() - 1]
        } else {
            &self.data
        }
    }

    /// File contents including the NUL terminator, if one was requested.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    pub fn is_null_terminated(&self) -> bool {
        self.null_terminated
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsRef<[u8]> for FileBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBuffer")
            .field("identifier", &self.identifier)
            .field("len", &self.len())
            .field("null_terminated", &self.null_terminated)
            .finish()
    }
}
