//! Directory iteration.
//!
//! Backends implement [`DirIterImpl`] for single-level enumeration and hand it
//! out wrapped in a [`DirIter`]. [`RecursiveDirIter`] walks a whole subtree on
//! top of single-level iterators, keeping an explicit stack instead of
//! recursing so directory depth cannot exhaust the call stack.
//!
//! Both iterators can be driven manually (`entry` / `increment`) or through
//! [`Iterator`], which yields the current entry and advances lazily on the
//! following call. That keeps [`RecursiveDirIter::no_push`] meaningful for the
//! entry just yielded.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::status::FileType;
use crate::traits::FileSystem;

/// One directory entry: full path and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Directory path joined with the entry name.
    pub path: PathBuf,
    /// Entry type, as far as the backend knows it without a full stat.
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
        }
    }

    /// The end-of-iteration sentinel (empty path).
    pub fn end() -> Self {
        Self::new(PathBuf::new(), FileType::StatusError)
    }

    pub fn is_end(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Final path component.
    pub fn name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// Single-level iteration implemented by a backend.
///
/// `current` returns the entry the iterator points at; an entry with an
/// empty path marks the end.
pub trait DirIterImpl: Send {
    fn current(&self) -> &DirEntry;

    /// Move to the next entry, or to the end sentinel.
    fn increment(&mut self) -> Result<()>;
}

/// Handle over a single-level iterator.
///
/// Two iterators compare equal when both are at the end, or both point at the
/// same path.
pub struct DirIter {
    inner: Option<Box<dyn DirIterImpl>>,
    needs_increment: bool,
}

impl DirIter {
    /// Wrap a backend iterator. An iterator already at its end becomes [`DirIter::end`].
    pub fn new(imp: impl DirIterImpl + 'static) -> Self {
        let inner: Option<Box<dyn DirIterImpl>> = if imp.current().is_end() {
            None
        } else {
            Some(Box::new(imp))
        };
        Self {
            inner,
            needs_increment: false,
        }
    }

    /// An exhausted iterator.
    pub fn end() -> Self {
        Self {
            inner: None,
            needs_increment: false,
        }
    }

    pub fn is_end(&self) -> bool {
        self.inner.is_none()
    }

    /// Current entry, or `None` at the end.
    pub fn entry(&self) -> Option<&DirEntry> {
        self.inner.as_ref().map(|imp| imp.current())
    }

    /// Advance to the next entry.
    ///
    /// On error the iterator is moved to the end.
    pub fn increment(&mut self) -> Result<()> {
        self.needs_increment = false;
        let Some(imp) = self.inner.as_mut() else {
            return Ok(());
        };
        match imp.increment() {
            Ok(()) => {
                if imp.current().is_end() {
                    self.inner = None;
                }
                Ok(())
            }
            Err(err) => {
                self.inner = None;
                Err(err)
            }
        }
    }
}

impl PartialEq for DirIter {
    fn eq(&self, other: &Self) -> bool {
        match (self.entry(), other.entry()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.path == b.path,
            _ => false,
        }
    }
}

impl fmt::Debug for DirIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirIter")
            .field("entry", &self.entry())
            .finish()
    }
}

impl Iterator for DirIter {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.needs_increment {
            if let Err(err) = self.increment() {
                return Some(Err(err));
            }
        }
        let entry = self.entry()?.clone();
        self.needs_increment = true;
        Some(Ok(entry))
    }
}

/// Iterator over a pre-built list of entries.
///
/// Used by backends that snapshot a directory under a lock.
pub struct ListDirIter {
    rest: std::vec::IntoIter<DirEntry>,
    current: DirEntry,
}

impl ListDirIter {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        let mut rest = entries.into_iter();
        let current = rest.next().unwrap_or_else(DirEntry::end);
        Self { rest, current }
    }
}

impl DirIterImpl for ListDirIter {
    fn current(&self) -> &DirEntry {
        &self.current
    }

    fn increment(&mut self) -> Result<()> {
        self.current = self.rest.next().unwrap_or_else(DirEntry::end);
        Ok(())
    }
}

/// Merges the same directory from several sources, first source wins.
///
/// Names already yielded are skipped. Later sources are opened lazily; a
/// source that does not have the directory is skipped, any other error from
/// opening it is returned.
pub(crate) struct CombiningDirIter {
    dir: PathBuf,
    current: DirIter,
    remaining: VecDeque<Arc<dyn FileSystem>>,
    seen: HashSet<OsString>,
    entry: DirEntry,
}

impl CombiningDirIter {
    pub(crate) fn new(
        dir: &Path,
        first: DirIter,
        remaining: impl IntoIterator<Item = Arc<dyn FileSystem>>,
    ) -> Result<Self> {
        let mut iter = Self {
            dir: dir.to_path_buf(),
            current: first,
            remaining: remaining.into_iter().collect(),
            seen: HashSet::new(),
            entry: DirEntry::end(),
        };
        iter.settle()?;
        Ok(iter)
    }

    /// Move to the first entry whose name has not been yielded yet.
    fn settle(&mut self) -> Result<()> {
        loop {
            match self.current.entry() {
                Some(entry) => {
                    let name = entry
                        .name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_else(|| entry.path.clone().into_os_string());
                    if self.seen.insert(name) {
                        self.entry = entry.clone();
                        return Ok(());
                    }
                    self.current.increment()?;
                }
                None => match self.next_source()? {
                    Some(iter) => self.current = iter,
                    None => {
                        self.entry = DirEntry::end();
                        return Ok(());
                    }
                },
            }
        }
    }

    fn next_source(&mut self) -> Result<Option<DirIter>> {
        while let Some(fs) = self.remaining.pop_front() {
            match fs.dir_begin(&self.dir) {
                Ok(iter) => return Ok(Some(iter)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

impl DirIterImpl for CombiningDirIter {
    fn current(&self) -> &DirEntry {
        &self.entry
    }

    fn increment(&mut self) -> Result<()> {
        self.current.increment()?;
        self.settle()
    }
}

/// Depth-first walk of a directory tree.
///
/// Keeps one [`DirIter`] per level. Directories are entered on `increment`
/// unless [`RecursiveDirIter::no_push`] was requested for the current entry.
pub struct RecursiveDirIter<'a> {
    fs: &'a dyn FileSystem,
    stack: Vec<DirIter>,
    no_push: bool,
    needs_increment: bool,
}

impl<'a> RecursiveDirIter<'a> {
    /// Start walking below `dir`.
    pub fn new(fs: &'a dyn FileSystem, dir: &Path) -> Result<Self> {
        let first = fs.dir_begin(dir)?;
        let stack = if first.is_end() { Vec::new() } else { vec![first] };
        Ok(Self {
            fs,
            stack,
            no_push: false,
            needs_increment: false,
        })
    }

    /// Current entry, or `None` once the walk is complete.
    pub fn entry(&self) -> Option<&DirEntry> {
        self.stack.last().and_then(|iter| iter.entry())
    }

    pub fn is_end(&self) -> bool {
        self.stack.is_empty()
    }

    /// Depth of the current entry; direct children of the start are level 0.
    pub fn level(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Do not descend into the current entry. Consumed by the next increment.
    pub fn no_push(&mut self) {
        self.no_push = true;
    }

    /// Advance to the next entry in depth-first order.
    ///
    /// If entering a directory fails the walk skips it and the error is
    /// returned; the iterator is still usable.
    pub fn increment(&mut self) -> Result<()> {
        self.needs_increment = false;
        let Some(current) = self.entry().cloned() else {
            return Ok(());
        };

        let mut descend_err = None;
        if self.no_push {
            self.no_push = false;
        } else if current.file_type.is_dir() {
            match self.fs.dir_begin(&current.path) {
                Ok(iter) if !iter.is_end() => {
                    self.stack.push(iter);
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => descend_err = Some(err),
            }
        }

        let advanced = self.advance();
        match descend_err {
            Some(err) => Err(err),
            None => advanced,
        }
    }

    /// Leave the current directory and continue with its parent's next entry.
    pub fn pop(&mut self) -> Result<()> {
        self.needs_increment = false;
        self.no_push = false;
        self.stack.pop();
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        let mut first_err: Option<Error> = None;
        while let Some(top) = self.stack.last_mut() {
            if let Err(err) = top.increment() {
                first_err.get_or_insert(err);
            }
            if !top.is_end() {
                break;
            }
            self.stack.pop();
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Iterator for RecursiveDirIter<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.needs_increment {
            if let Err(err) = self.increment() {
                return Some(Err(err));
            }
        }
        let entry = self.entry()?.clone();
        self.needs_increment = true;
        Some(Ok(entry))
    }
}
