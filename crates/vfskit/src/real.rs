//! Host operating system backend.
//!
//! [`RealFileSystem`] forwards every operation to `std::fs`. By default the
//! working directory is the process's own, cached behind a mutex so repeated
//! lookups do not hit the OS. [`RealFileSystem::isolated`] instead keeps a
//! private working directory and resolves relative paths against it.

// Mutex/RwLock unwrap only panics on lock poisoning (prior panic while
// holding the lock). Corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::buffer::FileBuffer;
use crate::dir_iter::{DirEntry, DirIter, DirIterImpl};
use crate::error::{Error, Result};
use crate::path::absolutize;
use crate::status::{FileType, Status, UniqueId};
use crate::traits::{File, FileSystem};

enum WorkingDir {
    /// The process working directory; `None` until first queried.
    Process(Mutex<Option<PathBuf>>),
    /// A working directory private to this instance.
    Isolated(RwLock<PathBuf>),
}

/// Backend over the host file system.
pub struct RealFileSystem {
    working_dir: WorkingDir,
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RealFileSystem {
    /// Backend sharing the process working directory.
    ///
    /// `set_current_working_directory` changes the process working directory.
    pub fn new() -> Self {
        Self {
            working_dir: WorkingDir::Process(Mutex::new(None)),
        }
    }

    /// Backend with its own working directory, initialized from the process.
    pub fn isolated() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self {
            working_dir: WorkingDir::Isolated(RwLock::new(cwd)),
        })
    }

    /// Path handed to the OS: relative paths are anchored for isolated instances.
    fn adjust_path(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            WorkingDir::Process(_) => path.to_path_buf(),
            WorkingDir::Isolated(cwd) => absolutize(&cwd.read().unwrap(), path),
        }
    }
}

/// Global instance sharing the process working directory.
pub fn real_file_system() -> Arc<dyn FileSystem> {
    static REAL: OnceLock<Arc<RealFileSystem>> = OnceLock::new();
    let fs = REAL.get_or_init(|| Arc::new(RealFileSystem::new()));
    Arc::clone(fs) as Arc<dyn FileSystem>
}

fn file_type_of(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        return FileType::Directory;
    }
    if ft.is_file() {
        return FileType::Regular;
    }
    if ft.is_symlink() {
        return FileType::Symlink;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if ft.is_block_device() {
            return FileType::Block;
        }
        if ft.is_char_device() {
            return FileType::Character;
        }
        if ft.is_fifo() {
            return FileType::Fifo;
        }
        if ft.is_socket() {
            return FileType::Socket;
        }
    }
    FileType::Unknown
}

fn status_from_metadata(name: &Path, meta: &fs::Metadata) -> Status {
    let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);

    #[cfg(unix)]
    let (uid, user, group, perms) = {
        use std::os::unix::fs::MetadataExt;
        (
            UniqueId::new(meta.dev(), meta.ino()),
            meta.uid(),
            meta.gid(),
            meta.mode() & 0o7777,
        )
    };
    #[cfg(not(unix))]
    let (uid, user, group, perms) = {
        let perms = if meta.permissions().readonly() { 0o555 } else { 0o777 };
        (UniqueId::default(), 0, 0, perms)
    };

    Status::new(
        name,
        uid,
        modified,
        user,
        group,
        meta.len(),
        file_type_of(meta.file_type()),
        perms,
    )
}

impl FileSystem for RealFileSystem {
    fn status(&self, path: &Path) -> Result<Status> {
        let meta = fs::metadata(self.adjust_path(path)).map_err(|e| Error::from_io(e, path))?;
        Ok(status_from_metadata(path, &meta))
    }

    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>> {
        let os_path = self.adjust_path(path);
        let file = fs::File::open(&os_path).map_err(|e| Error::from_io(e, path))?;
        let meta = file.metadata().map_err(|e| Error::from_io(e, path))?;
        if meta.is_dir() {
            return Err(Error::NotAFile(path.to_path_buf()));
        }
        let real_name = resolved_name(&os_path);
        Ok(Box::new(RealFile {
            file: Some(file),
            status: status_from_metadata(path, &meta),
            real_name,
        }))
    }

    fn dir_begin(&self, dir: &Path) -> Result<DirIter> {
        let read_dir = fs::read_dir(self.adjust_path(dir)).map_err(|e| Error::from_io(e, dir))?;
        let iter = RealDirIter::new(dir, read_dir)?;
        Ok(DirIter::new(iter))
    }

    fn current_working_directory(&self) -> Result<PathBuf> {
        match &self.working_dir {
            WorkingDir::Process(cache) => {
                let mut cache = cache.lock().unwrap();
                if let Some(cwd) = cache.as_ref() {
                    return Ok(cwd.clone());
                }
                let cwd = std::env::current_dir()?;
                *cache = Some(cwd.clone());
                Ok(cwd)
            }
            WorkingDir::Isolated(cwd) => Ok(cwd.read().unwrap().clone()),
        }
    }

    fn set_current_working_directory(&self, path: &Path) -> Result<()> {
        match &self.working_dir {
            WorkingDir::Process(cache) => {
                let mut cache = cache.lock().unwrap();
                std::env::set_current_dir(path).map_err(|e| Error::from_io(e, path))?;
                *cache = None;
                Ok(())
            }
            WorkingDir::Isolated(cwd) => {
                let absolute = absolutize(&cwd.read().unwrap(), path);
                let meta = fs::metadata(&absolute).map_err(|e| Error::from_io(e, path))?;
                if !meta.is_dir() {
                    return Err(Error::NotADirectory(path.to_path_buf()));
                }
                *cwd.write().unwrap() = absolute;
                Ok(())
            }
        }
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(self.adjust_path(path)).map_err(|e| Error::from_io(e, path))
    }

    fn is_local(&self, path: &Path) -> Result<bool> {
        is_local_path(&self.adjust_path(path), path)
    }
}

#[cfg(target_os = "linux")]
fn is_local_path(os_path: &Path, path: &Path) -> Result<bool> {
    // NFS, SMB and CIFS superblock magic numbers.
    const REMOTE_MAGIC: [u32; 3] = [0x6969, 0x517B, 0xFF53_4D42];

    let stat = nix::sys::statfs::statfs(os_path)
        .map_err(|errno| Error::from_io(std::io::Error::from(errno), path))?;
    let magic = stat.filesystem_type().0 as u32;
    Ok(!REMOTE_MAGIC.contains(&magic))
}

#[cfg(not(target_os = "linux"))]
fn is_local_path(os_path: &Path, path: &Path) -> Result<bool> {
    fs::metadata(os_path).map_err(|e| Error::from_io(e, path))?;
    Ok(true)
}

/// OS-resolved name of an opened file, if the OS can produce one.
fn resolved_name(os_path: &Path) -> Option<PathBuf> {
    match fs::canonicalize(os_path) {
        Ok(resolved) => Some(resolved),
        Err(err) => {
            tracing::debug!(path = %os_path.display(), error = %err, "real: no resolved name");
            None
        }
    }
}

/// Open host file.
struct RealFile {
    file: Option<fs::File>,
    status: Status,
    real_name: Option<PathBuf>,
}

impl File for RealFile {
    fn status(&self) -> Result<Status> {
        Ok(self.status.clone())
    }

    fn buffer(
        &mut self,
        name: &Path,
        size_hint: Option<u64>,
        requires_null_terminator: bool,
        _is_volatile: bool,
    ) -> Result<FileBuffer> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("file is closed".to_string()))?;
        // the hint is advisory; never reserve past the size seen at open
        let size = self.status.size();
        let capacity = usize::try_from(size_hint.unwrap_or(size).min(size)).unwrap_or(0);
        let mut data = Vec::with_capacity(capacity.saturating_add(usize::from(requires_null_terminator)));
        file.read_to_end(&mut data)
            .map_err(|e| Error::from_io(e, name))?;
        Ok(FileBuffer::from_vec(name, data, requires_null_terminator))
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn real_name(&self) -> Option<&Path> {
        self.real_name.as_deref()
    }
}

/// Lazy iterator over `std::fs::ReadDir`.
struct RealDirIter {
    dir: PathBuf,
    read_dir: fs::ReadDir,
    current: DirEntry,
}

impl RealDirIter {
    fn new(dir: &Path, read_dir: fs::ReadDir) -> Result<Self> {
        let mut iter = Self {
            dir: dir.to_path_buf(),
            read_dir,
            current: DirEntry::end(),
        };
        iter.increment()?;
        Ok(iter)
    }
}

impl DirIterImpl for RealDirIter {
    fn current(&self) -> &DirEntry {
        &self.current
    }

    fn increment(&mut self) -> Result<()> {
        self.current = match self.read_dir.next() {
            Some(entry) => {
                let entry = entry.map_err(|e| Error::from_io(e, &self.dir))?;
                let file_type = entry
                    .file_type()
                    .map(file_type_of)
                    .unwrap_or(FileType::Unknown);
                DirEntry::new(self.dir.join(entry.file_name()), file_type)
            }
            None => DirEntry::end(),
        };
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn status_of_file_and_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"hello").unwrap();

        let fs = RealFileSystem::new();
        let status = fs.status(&file).unwrap();
        assert!(status.is_regular_file());
        assert_eq!(status.size(), 5);
        assert_eq!(status.name(), file.as_path());
        assert!(!status.is_vfs_mapped);

        assert!(fs.status(dir.path()).unwrap().is_directory());
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let fs = RealFileSystem::new();
        let err = fs.status(&dir.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn open_reads_buffer_and_records_real_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"abc").unwrap();

        let fs = RealFileSystem::new();
        let mut handle = fs.open_file_for_read(&file).unwrap();
        assert_eq!(handle.real_name(), Some(fs::canonicalize(&file).unwrap().as_path()));
        let buf = handle.buffer(&file, None, true, false).unwrap();
        assert_eq!(buf.as_bytes(), b"abc");
        assert_eq!(buf.as_bytes_with_nul(), b"abc\0");
        handle.close().unwrap();
        assert!(handle.buffer(&file, None, false, false).is_err());
    }

    #[test]
    fn oversized_size_hint_is_capped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"abc").unwrap();

        let fs = RealFileSystem::new();
        let buf = fs
            .buffer_for_file(&file, Some(u64::MAX), true, false)
            .unwrap();
        assert_eq!(buf.as_bytes_with_nul(), b"abc\0");

        let buf = fs.buffer_for_file(&file, Some(1), false, false).unwrap();
        assert_eq!(buf.as_bytes(), b"abc");
    }

    #[test]
    fn unresolvable_name_is_absent() {
        let dir = tempdir().unwrap();
        assert_eq!(resolved_name(&dir.path().join("gone")), None);
        assert_eq!(
            resolved_name(dir.path()),
            Some(fs::canonicalize(dir.path()).unwrap())
        );
    }

    #[test]
    fn opening_a_directory_fails() {
        let dir = tempdir().unwrap();
        let fs = RealFileSystem::new();
        let err = fs.open_file_for_read(dir.path()).err().unwrap();
        assert!(matches!(err, Error::NotAFile(_)));
    }

    #[test]
    fn dir_begin_lists_children() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = RealFileSystem::new();
        let mut entries: Vec<_> = fs
            .dir_begin(dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_type, FileType::Regular);
        assert_eq!(entries[1].file_type, FileType::Directory);
        assert_eq!(entries[1].path, dir.path().join("sub"));
    }

    #[test]
    fn dir_begin_on_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, b"1").unwrap();
        let fs = RealFileSystem::new();
        let err = fs.dir_begin(&file).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn isolated_working_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("rel.txt"), b"r").unwrap();

        let fs = RealFileSystem::isolated().unwrap();
        let before = std::env::current_dir().unwrap();
        fs.set_current_working_directory(dir.path()).unwrap();
        assert_eq!(std::env::current_dir().unwrap(), before);
        assert_eq!(fs.current_working_directory().unwrap(), dir.path());

        assert!(fs.status(Path::new("rel.txt")).unwrap().is_regular_file());
        assert_eq!(
            fs.make_absolute(Path::new("rel.txt")).unwrap(),
            dir.path().join("rel.txt")
        );
    }

    #[test]
    fn isolated_rejects_file_as_working_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"").unwrap();
        let fs = RealFileSystem::isolated().unwrap();
        assert!(matches!(
            fs.set_current_working_directory(&file),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn real_path_and_is_local() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"").unwrap();
        let fs = RealFileSystem::new();
        assert_eq!(fs.real_path(&file).unwrap(), fs::canonicalize(&file).unwrap());
        assert!(fs.is_local(&file).is_ok());
        assert!(fs.is_local(&dir.path().join("missing")).unwrap_err().is_not_found());
    }

    #[test]
    fn singleton_is_shared() {
        let a = real_file_system();
        let b = real_file_system();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&a), Arc::as_ptr(&b)));
    }
}
