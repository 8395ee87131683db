//! Redirecting filesystem driven by a mapping document.
//!
//! [`RedirectingFileSystem`] serves a virtual tree declared in a mapping
//! document (see [`crate::mapping`]). Virtual files resolve to paths on an
//! external backend. Paths the document does not mention fall through to the
//! external backend unless the document sets `fallthrough: false`.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//! use vfskit::{FileSystem, InMemoryFileSystem, RedirectingBuilder};
//!
//! let external = Arc::new(InMemoryFileSystem::new());
//! external.add_file("/real/a.h", SystemTime::UNIX_EPOCH, b"#pragma once");
//!
//! let yaml = r#"
//! version: 0
//! roots:
//!   - type: file
//!     name: /virtual/a.h
//!     external-contents: /real/a.h
//! "#;
//! let fs = RedirectingBuilder::new(external).build_from_str(yaml, &mut |_| {}).unwrap();
//!
//! let status = fs.status(Path::new("/virtual/a.h")).unwrap();
//! assert!(status.is_vfs_mapped);
//! assert_eq!(status.name(), Path::new("/real/a.h"));
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::FileBuffer;
use crate::dir_iter::{CombiningDirIter, DirEntry, DirIter, ListDirIter};
use crate::error::{Error, Result};
use crate::mapping::entry::{split_components, Entry, FileEntry, NameKind};
use crate::mapping::{Diagnostic, MappingOptions, MappingParser, Node};
use crate::path::remove_dots;
use crate::status::{FileType, Status};
use crate::traits::{File, FileSystem};

/// Options that do not come from the mapping document.
pub struct RedirectingBuilder {
    external: Arc<dyn FileSystem>,
    document_path: Option<PathBuf>,
    canonicalize_paths: bool,
}

impl RedirectingBuilder {
    /// Builder redirecting into `external`.
    ///
    /// Lookups strip `.` and `..` by default, except on Windows.
    pub fn new(external: Arc<dyn FileSystem>) -> Self {
        Self {
            external,
            document_path: None,
            canonicalize_paths: !cfg!(windows),
        }
    }

    /// Location of the document; its directory is the base for
    /// `overlay-relative` external paths.
    pub fn document_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_path = Some(path.into());
        self
    }

    pub fn canonicalize_paths(mut self, canonicalize: bool) -> Self {
        self.canonicalize_paths = canonicalize;
        self
    }

    /// Build from an already parsed document tree.
    ///
    /// Every problem in the document is passed to `diagnostics`.
    ///
    /// # Errors
    /// `Error::Mapping` if any diagnostic was reported.
    pub fn build(
        self,
        document: &Node,
        diagnostics: &mut dyn FnMut(&Diagnostic),
    ) -> Result<RedirectingFileSystem> {
        let document_dir = self
            .document_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let parsed = MappingParser::new(diagnostics)
            .document_dir(document_dir)
            .canonicalize(self.canonicalize_paths)
            .parse(document)?;

        tracing::debug!(roots = parsed.roots.len(), "redirecting: mapping loaded");
        Ok(RedirectingFileSystem {
            external: self.external,
            roots: parsed.roots,
            options: parsed.options,
            canonicalize_paths: self.canonicalize_paths,
        })
    }

    /// Build from YAML (or JSON) text.
    pub fn build_from_str(
        self,
        text: &str,
        diagnostics: &mut dyn FnMut(&Diagnostic),
    ) -> Result<RedirectingFileSystem> {
        match Node::from_yaml(text) {
            Ok(document) => self.build(&document, diagnostics),
            Err(err) => Err(MappingParser::new(diagnostics).report_syntax_error(err.to_string())),
        }
    }

    /// Read the document at `path` from the external backend and build.
    ///
    /// Sets the document path if none was given.
    pub fn build_from_path(
        mut self,
        path: &Path,
        diagnostics: &mut dyn FnMut(&Diagnostic),
    ) -> Result<RedirectingFileSystem> {
        let buffer = self.external.buffer_for_file(path, None, false, false)?;
        let text = std::str::from_utf8(buffer.as_bytes()).map_err(|_| {
            Error::InvalidArgument(format!("mapping is not UTF-8: {}", path.display()))
        })?;
        if self.document_path.is_none() {
            self.document_path = Some(self.external.make_absolute(path)?);
        }
        self.build_from_str(text, diagnostics)
    }
}

/// Backend serving the virtual tree of a mapping document.
pub struct RedirectingFileSystem {
    external: Arc<dyn FileSystem>,
    roots: Vec<Entry>,
    options: MappingOptions,
    canonicalize_paths: bool,
}

/// Outcome of resolving a path against the redirect tree.
enum Lookup<'a> {
    Hit(&'a Entry),
    Miss,
}

impl RedirectingFileSystem {
    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    pub fn external(&self) -> &Arc<dyn FileSystem> {
        &self.external
    }

    pub fn roots(&self) -> &[Entry] {
        &self.roots
    }

    fn lookup(&self, path: &Path) -> Result<Lookup<'_>> {
        let mut absolute = self.make_absolute(path)?;
        if self.canonicalize_paths {
            absolute = remove_dots(&absolute);
        }
        let components = split_components(&absolute);
        tracing::trace!(path = %absolute.display(), "redirecting: lookup");
        Ok(self
            .roots
            .iter()
            .find_map(|root| root.lookup(&components, self.options.case_sensitive))
            .map_or(Lookup::Miss, Lookup::Hit))
    }

    fn use_external_name(&self, file: &FileEntry) -> bool {
        match file.use_name {
            NameKind::NotSet => self.options.use_external_names,
            NameKind::External => true,
            NameKind::Virtual => false,
        }
    }

    /// `external` renamed per the entry's naming rule and marked as mapped.
    fn redirected_status(&self, path: &Path, file: &FileEntry, external: Status) -> Status {
        let name = if self.use_external_name(file) {
            file.external_contents.as_path()
        } else {
            path
        };
        let mut status = external.copy_with_new_name(name);
        status.is_vfs_mapped = true;
        status
    }

    fn miss<T>(&self, path: &Path, fallthrough: impl FnOnce(&dyn FileSystem) -> Result<T>) -> Result<T> {
        if self.options.fallthrough {
            tracing::debug!(path = %path.display(), "redirecting: fall through to external");
            fallthrough(self.external.as_ref())
        } else {
            Err(Error::NotFound(path.to_path_buf()))
        }
    }

    /// Every `(virtual path, external path)` pair, in declaration order.
    pub fn mappings(&self) -> Vec<(PathBuf, PathBuf)> {
        let mut out = Vec::new();
        let mut stack: Vec<(PathBuf, &Entry)> = self
            .roots
            .iter()
            .rev()
            .map(|root| (PathBuf::new(), root))
            .collect();
        while let Some((parent, entry)) = stack.pop() {
            let path = if entry.name().is_empty() {
                parent
            } else {
                parent.join(entry.name())
            };
            match entry {
                Entry::File(file) => out.push((path, file.external_contents.clone())),
                Entry::Directory(dir) => {
                    stack.extend(dir.contents.iter().rev().map(|child| (path.clone(), child)));
                }
            }
        }
        out
    }

    /// Indented rendering of the redirect tree, files shown as `name -> external`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(usize, &Entry)> = self.roots.iter().rev().map(|root| (0, root)).collect();
        while let Some((depth, entry)) = stack.pop() {
            let indent = depth * 2;
            match entry {
                Entry::Directory(dir) => {
                    let _ = writeln!(out, "{:indent$}{}", "", dir.name);
                    stack.extend(dir.contents.iter().rev().map(|child| (depth + 1, child)));
                }
                Entry::File(file) => {
                    let _ = writeln!(
                        out,
                        "{:indent$}{} -> {}",
                        "",
                        file.name,
                        file.external_contents.display()
                    );
                }
            }
        }
        out
    }
}

/// Children of `dir` as listed entries, looking through unnamed directories.
fn declared_children(dir: &Path, contents: &[Entry]) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut stack: Vec<&Entry> = contents.iter().rev().collect();
    while let Some(entry) = stack.pop() {
        match entry {
            Entry::Directory(child) if child.name.is_empty() => {
                stack.extend(child.contents.iter().rev());
            }
            Entry::Directory(child) => entries.push(DirEntry::new(dir.join(&child.name), FileType::Directory)),
            Entry::File(file) => entries.push(DirEntry::new(dir.join(&file.name), FileType::Regular)),
        }
    }
    entries
}

impl FileSystem for RedirectingFileSystem {
    fn status(&self, path: &Path) -> Result<Status> {
        match self.lookup(path)? {
            Lookup::Hit(Entry::File(file)) => {
                let external = self.external.status(&file.external_contents)?;
                Ok(self.redirected_status(path, file, external))
            }
            Lookup::Hit(Entry::Directory(dir)) => Ok(dir.status.copy_with_new_name(path)),
            Lookup::Miss => self.miss(path, |fs| fs.status(path)),
        }
    }

    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>> {
        match self.lookup(path)? {
            Lookup::Hit(Entry::File(file)) => {
                let inner = self.external.open_file_for_read(&file.external_contents)?;
                let status = self.redirected_status(path, file, inner.status()?);
                Ok(Box::new(RedirectedFile { inner, status }))
            }
            Lookup::Hit(Entry::Directory(_)) => Err(Error::NotAFile(path.to_path_buf())),
            Lookup::Miss => self.miss(path, |fs| fs.open_file_for_read(path)),
        }
    }

    /// Declared children first, then (with fallthrough) external entries
    /// whose names were not declared.
    fn dir_begin(&self, dir: &Path) -> Result<DirIter> {
        match self.lookup(dir)? {
            Lookup::Hit(Entry::Directory(entry)) => {
                let declared = DirIter::new(ListDirIter::new(declared_children(dir, &entry.contents)));
                if self.options.fallthrough {
                    let merged = CombiningDirIter::new(dir, declared, [Arc::clone(&self.external)])?;
                    Ok(DirIter::new(merged))
                } else {
                    Ok(declared)
                }
            }
            Lookup::Hit(Entry::File(_)) => Err(Error::NotADirectory(dir.to_path_buf())),
            Lookup::Miss => self.miss(dir, |fs| fs.dir_begin(dir)),
        }
    }

    fn current_working_directory(&self) -> Result<PathBuf> {
        self.external.current_working_directory()
    }

    fn set_current_working_directory(&self, path: &Path) -> Result<()> {
        self.external.set_current_working_directory(path)
    }

    fn real_path(&self, path: &Path) -> Result<PathBuf> {
        match self.lookup(path)? {
            Lookup::Hit(Entry::File(file)) => self.external.real_path(&file.external_contents),
            Lookup::Hit(Entry::Directory(_)) => {
                if self.options.fallthrough {
                    self.external.real_path(path)
                } else {
                    Err(Error::InvalidArgument(format!(
                        "virtual directory has no real path: {}",
                        path.display()
                    )))
                }
            }
            Lookup::Miss => self.miss(path, |fs| fs.real_path(path)),
        }
    }

    fn is_local(&self, path: &Path) -> Result<bool> {
        self.external.is_local(path)
    }
}

/// Handle to an external file that reports the redirected status.
struct RedirectedFile {
    inner: Box<dyn File>,
    status: Status,
}

impl File for RedirectedFile {
    fn status(&self) -> Result<Status> {
        Ok(self.status.clone())
    }

    fn buffer(
        &mut self,
        name: &Path,
        size_hint: Option<u64>,
        requires_null_terminator: bool,
        is_volatile: bool,
    ) -> Result<FileBuffer> {
        self.inner
            .buffer(name, size_hint, requires_null_terminator, is_volatile)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn real_name(&self) -> Option<&Path> {
        self.inner.real_name()
    }
}
