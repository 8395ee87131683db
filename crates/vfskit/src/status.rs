//! Entry metadata.
//!
//! [`Status`] is an immutable description of one file-system entry. The same
//! underlying file may be reached through several paths (hard links, redirect
//! mappings, overlay layers); [`Status::equivalent`] compares the
//! [`UniqueId`] so callers can tell when two paths denote the same storage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Permission bits granting everything to everyone.
pub const ALL_PERMS: u32 = 0o777;

/// Owner read, write and execute.
pub const OWNER_ALL: u32 = 0o700;

/// Device+inode style identifier.
///
/// Only used to test whether two entries are the same object. Synthetic
/// backends mint identifiers with [`next_virtual_unique_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniqueId {
    /// Device number.
    pub device: u64,
    /// File number within the device.
    pub file: u64,
}

impl UniqueId {
    /// Create an identifier from its parts.
    pub const fn new(device: u64, file: u64) -> Self {
        Self { device, file }
    }
}

/// Device number reserved for synthetic entries.
const VIRTUAL_DEVICE: u64 = u64::MAX;

static NEXT_VIRTUAL_ID: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh identifier for an entry that has no OS identity.
///
/// Process-wide and thread-safe. Identifiers are never reused.
pub fn next_virtual_unique_id() -> UniqueId {
    let file = NEXT_VIRTUAL_ID.fetch_add(1, Ordering::Relaxed);
    UniqueId::new(VIRTUAL_DEVICE, file)
}

/// Entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Block device
    Block,
    /// Character device
    Character,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Exists, but the type could not be determined
    Unknown,
    /// Definitely does not exist
    NotFound,
    /// Status could not be obtained
    #[default]
    StatusError,
}

impl FileType {
    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::Regular)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Metadata for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    name: PathBuf,
    uid: UniqueId,
    modified: SystemTime,
    user: u32,
    group: u32,
    size: u64,
    file_type: FileType,
    permissions: u32,
    /// Set when the entry was reached through a redirect mapping.
    pub is_vfs_mapped: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            name: PathBuf::new(),
            uid: UniqueId::default(),
            modified: SystemTime::UNIX_EPOCH,
            user: 0,
            group: 0,
            size: 0,
            file_type: FileType::StatusError,
            permissions: 0,
            is_vfs_mapped: false,
        }
    }
}

impl Status {
    /// Create a status with every field given.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<PathBuf>,
        uid: UniqueId,
        modified: SystemTime,
        user: u32,
        group: u32,
        size: u64,
        file_type: FileType,
        permissions: u32,
    ) -> Self {
        Self {
            name: name.into(),
            uid,
            modified,
            user,
            group,
            size,
            file_type,
            permissions,
            is_vfs_mapped: false,
        }
    }

    /// Synthesized status for a virtual directory with a fresh identifier.
    pub fn virtual_directory(name: impl Into<PathBuf>) -> Self {
        Self::new(
            name,
            next_virtual_unique_id(),
            SystemTime::UNIX_EPOCH,
            0,
            0,
            0,
            FileType::Directory,
            ALL_PERMS,
        )
    }

    /// Same status reported under a different display name.
    pub fn copy_with_new_name(&self, name: impl AsRef<Path>) -> Self {
        let mut status = self.clone();
        status.name = name.as_ref().to_path_buf();
        status
    }

    /// Display name: the path the caller used, or the external path for redirects.
    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn unique_id(&self) -> UniqueId {
        self.uid
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn user(&self) -> u32 {
        self.user
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn is_directory(&self) -> bool {
        self.file_type.is_dir()
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type.is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type.is_symlink()
    }

    /// Exists, but is neither a regular file, a directory nor a symlink.
    pub fn is_other(&self) -> bool {
        self.exists() && !self.is_regular_file() && !self.is_directory() && !self.is_symlink()
    }

    pub fn is_status_known(&self) -> bool {
        self.file_type != FileType::StatusError
    }

    pub fn exists(&self) -> bool {
        self.is_status_known() && self.file_type != FileType::NotFound
    }

    /// True if both statuses describe the same underlying object.
    ///
    /// # Panics
    ///
    /// Panics if either status is not known.
    pub fn equivalent(&self, other: &Status) -> bool {
        assert!(
            self.is_status_known() && other.is_status_known(),
            "equivalent() requires two known statuses"
        );
        self.uid == other.uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(name: &str, uid: UniqueId) -> Status {
        Status::new(name, uid, SystemTime::UNIX_EPOCH, 0, 0, 3, FileType::Regular, 0o644)
    }

    #[test]
    fn default_status_is_unknown() {
        let status = Status::default();
        assert!(!status.is_status_known());
        assert!(!status.exists());
    }

    #[test]
    fn not_found_is_known_but_absent() {
        let mut status = regular("/a", UniqueId::new(1, 1));
        status.file_type = FileType::NotFound;
        assert!(status.is_status_known());
        assert!(!status.exists());
        assert!(!status.is_other());
    }

    #[test]
    fn type_predicates() {
        let file = regular("/a", UniqueId::new(1, 1));
        assert!(file.is_regular_file());
        assert!(!file.is_directory());
        assert!(!file.is_other());

        let dir = Status::virtual_directory("/d");
        assert!(dir.is_directory());

        let mut fifo = file.clone();
        fifo.file_type = FileType::Fifo;
        assert!(fifo.is_other());
    }

    #[test]
    fn rename_keeps_identity() {
        let status = regular("/a", UniqueId::new(7, 9));
        let renamed = status.copy_with_new_name("/b");
        assert_eq!(renamed.name(), Path::new("/b"));
        assert_eq!(renamed.size(), 3);
        assert!(renamed.equivalent(&status));
    }

    #[test]
    fn equivalence_uses_unique_id_only() {
        let a = regular("/a", UniqueId::new(1, 2));
        let b = regular("/a", UniqueId::new(1, 3));
        assert!(!a.equivalent(&b));
    }

    #[test]
    #[should_panic(expected = "known statuses")]
    fn equivalence_requires_known_status() {
        let a = regular("/a", UniqueId::new(1, 2));
        a.equivalent(&Status::default());
    }

    #[test]
    fn virtual_ids_are_unique() {
        let a = next_virtual_unique_id();
        let b = next_virtual_unique_id();
        assert_ne!(a, b);
        assert_eq!(a.device, b.device);
    }
}
