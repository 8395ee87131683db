//! In-memory filesystem implementation
//!
//! [`InMemoryFileSystem`] keeps a tree of directory, file and hard-link nodes
//! entirely in memory. Files are immutable once added: re-adding a path only
//! succeeds when the contents are byte-identical.

// RwLock.read()/write().unwrap() only panics on lock poisoning (prior panic
// while holding lock). This is intentional - corrupted state should not propagate.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::buffer::FileBuffer;
use crate::dir_iter::{DirEntry, DirIter, ListDirIter};
use crate::error::{Error, Result};
use crate::path::{absolutize, remove_dots};
use crate::status::{next_virtual_unique_id, FileType, Status, ALL_PERMS, OWNER_ALL};
use crate::traits::{File, FileSystem};

/// Optional attributes for [`InMemoryFileSystem::add_file_with`].
///
/// Unset fields default to user 0, group 0, a regular file, and all
/// permissions.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    user: Option<u32>,
    group: Option<u32>,
    file_type: Option<FileType>,
    permissions: Option<u32>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: u32) -> Self {
        self.user = Some(user);
        self
    }

    pub fn group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// Entry type. `FileType::Directory` creates a directory node.
    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    pub fn permissions(mut self, permissions: u32) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

#[derive(Debug)]
struct FileNode {
    status: Status,
    buffer: Arc<[u8]>,
}

#[derive(Debug)]
struct DirectoryNode {
    status: Status,
    entries: BTreeMap<OsString, Node>,
}

impl DirectoryNode {
    fn new(status: Status) -> Self {
        Self {
            status,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
enum Node {
    Directory(DirectoryNode),
    File(Arc<FileNode>),
    /// Shares the target's status and buffer, and so its unique id.
    HardLink(Arc<FileNode>),
}

/// Result of a tree lookup. Hard links are already resolved.
enum Found<'a> {
    Directory(&'a DirectoryNode),
    File(&'a Arc<FileNode>),
}

/// What the final path component should become.
enum NewNode<'a> {
    Entry {
        buffer: &'a [u8],
        options: &'a FileOptions,
    },
    HardLink(Arc<FileNode>),
}

/// In-memory filesystem.
///
/// Directories are created on demand by [`InMemoryFileSystem::add_file`].
/// Enumeration order is sorted by name.
pub struct InMemoryFileSystem {
    root: RwLock<DirectoryNode>,
    working_directory: RwLock<PathBuf>,
    use_normalized_paths: bool,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystem {
    /// Create an empty filesystem that removes `.` and `..` from every path.
    pub fn new() -> Self {
        Self::with_normalized_paths(true)
    }

    /// Create an empty filesystem, choosing whether paths are normalized.
    pub fn with_normalized_paths(use_normalized_paths: bool) -> Self {
        Self {
            root: RwLock::new(DirectoryNode::new(Status::virtual_directory("/"))),
            working_directory: RwLock::new(PathBuf::from("/")),
            use_normalized_paths,
        }
    }

    pub fn use_normalized_paths(&self) -> bool {
        self.use_normalized_paths
    }

    /// Absolute (and optionally normalized) form of `path`.
    fn resolve(&self, path: &Path) -> PathBuf {
        let absolute = absolutize(&self.working_directory.read().unwrap(), path);
        if self.use_normalized_paths {
            remove_dots(&absolute)
        } else {
            absolute
        }
    }

    /// Split a resolved path into the root part and the names below it.
    fn split(path: &Path) -> (PathBuf, Vec<OsString>) {
        let mut root = PathBuf::new();
        let mut names = Vec::new();
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => root.push(component.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir | Component::Normal(_) => {
                    names.push(component.as_os_str().to_os_string())
                }
            }
        }
        (root, names)
    }

    /// Add a regular file with default attributes.
    ///
    /// Returns `false` if the path is taken by a directory or by a file with
    /// different contents, or if an intermediate component is a file.
    pub fn add_file(&self, path: impl AsRef<Path>, modified: SystemTime, buffer: &[u8]) -> bool {
        self.add_file_with(path, modified, buffer, &FileOptions::default())
    }

    /// Add a file (or directory, per `options`) with explicit attributes.
    pub fn add_file_with(
        &self,
        path: impl AsRef<Path>,
        modified: SystemTime,
        buffer: &[u8],
        options: &FileOptions,
    ) -> bool {
        self.insert(path.as_ref(), modified, NewNode::Entry { buffer, options })
    }

    /// Add an empty directory.
    pub fn add_directory(&self, path: impl AsRef<Path>, modified: SystemTime) -> bool {
        let options = FileOptions::new().file_type(FileType::Directory);
        self.add_file_with(path, modified, &[], &options)
    }

    /// Make `from` another name for the file at `to`.
    ///
    /// Fails unless `to` is an existing file (not a directory, not itself a
    /// link) and `from` does not exist yet.
    pub fn add_hard_link(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> bool {
        let from = from.as_ref();
        let target = {
            let root = self.root.read().unwrap();
            let to_path = self.resolve(to.as_ref());
            let (_, to_names) = Self::split(&to_path);
            let from_path = self.resolve(from);
            let (_, from_names) = Self::split(&from_path);

            if lookup_raw(&root, &from_names).is_some() {
                return false;
            }
            match lookup_raw(&root, &to_names) {
                Some(Node::File(file)) => Arc::clone(file),
                _ => return false,
            }
        };
        let modified = target.status.modified();
        self.insert(from, modified, NewNode::HardLink(target))
    }

    fn insert(&self, path: &Path, modified: SystemTime, new: NewNode<'_>) -> bool {
        let resolved = self.resolve(path);
        let (mut prefix, names) = Self::split(&resolved);
        let Some((last, parents)) = names.split_last() else {
            // The root always exists and cannot be replaced.
            return false;
        };

        let (user, group, perms) = match &new {
            NewNode::Entry { options, .. } => (
                options.user.unwrap_or(0),
                options.group.unwrap_or(0),
                options.permissions.unwrap_or(ALL_PERMS),
            ),
            NewNode::HardLink(target) => (
                target.status.user(),
                target.status.group(),
                target.status.permissions(),
            ),
        };

        let mut root = self.root.write().unwrap();
        let mut dir = &mut *root;
        for name in parents {
            prefix.push(name);
            let node = dir.entries.entry(name.clone()).or_insert_with(|| {
                // Intermediate directories stay usable by their owner
                // whatever the final entry's permissions are.
                Node::Directory(DirectoryNode::new(Status::new(
                    &prefix,
                    next_virtual_unique_id(),
                    modified,
                    user,
                    group,
                    0,
                    FileType::Directory,
                    perms | OWNER_ALL,
                )))
            });
            match node {
                Node::Directory(child) => dir = child,
                Node::File(_) | Node::HardLink(_) => {
                    tracing::debug!(path = %resolved.display(), "add rejected: parent is a file");
                    return false;
                }
            }
        }
        prefix.push(last);

        if let Some(existing) = dir.entries.get(last) {
            let accepted = match (existing, &new) {
                (Node::Directory(_), NewNode::Entry { options, .. }) => {
                    options.file_type == Some(FileType::Directory)
                }
                (Node::Directory(_), NewNode::HardLink(_)) => false,
                (Node::File(file) | Node::HardLink(file), NewNode::HardLink(target)) => {
                    Arc::ptr_eq(file, target)
                }
                (Node::File(file) | Node::HardLink(file), NewNode::Entry { buffer, options }) => {
                    options.file_type != Some(FileType::Directory) && *file.buffer == **buffer
                }
            };
            if !accepted {
                tracing::debug!(path = %resolved.display(), "add rejected: conflicting entry");
            }
            return accepted;
        }

        let node = match new {
            NewNode::HardLink(target) => Node::HardLink(target),
            NewNode::Entry { buffer, options } => {
                let file_type = options.file_type.unwrap_or(FileType::Regular);
                if file_type == FileType::Directory {
                    Node::Directory(DirectoryNode::new(Status::new(
                        &prefix,
                        next_virtual_unique_id(),
                        modified,
                        user,
                        group,
                        0,
                        FileType::Directory,
                        perms,
                    )))
                } else {
                    Node::File(Arc::new(FileNode {
                        status: Status::new(
                            &prefix,
                            next_virtual_unique_id(),
                            modified,
                            user,
                            group,
                            buffer.len() as u64,
                            file_type,
                            perms,
                        ),
                        buffer: Arc::from(buffer),
                    }))
                }
            }
        };
        tracing::trace!(path = %prefix.display(), "added in-memory entry");
        dir.entries.insert(last.clone(), node);
        true
    }

    /// Debug rendering of the tree: two spaces per level, root as `/`.
    pub fn dump(&self) -> String {
        let root = self.root.read().unwrap();
        let mut out = String::from("/\n");
        let mut stack: Vec<(usize, &OsString, &Node)> = root
            .entries
            .iter()
            .rev()
            .map(|(name, node)| (1, name, node))
            .collect();

        while let Some((depth, name, node)) = stack.pop() {
            let name = name.to_string_lossy();
            let indent = depth * 2;
            match node {
                Node::Directory(dir) => {
                    let _ = writeln!(out, "{:indent$}{name}", "");
                    stack.extend(
                        dir.entries
                            .iter()
                            .rev()
                            .map(|(child, node)| (depth + 1, child, node)),
                    );
                }
                Node::File(_) => {
                    let _ = writeln!(out, "{:indent$}{name}", "");
                }
                Node::HardLink(target) => {
                    let _ = writeln!(
                        out,
                        "{:indent$}{name} -> {}",
                        "",
                        target.status.name().display()
                    );
                }
            }
        }
        out
    }

    fn with_node<T>(&self, path: &Path, f: impl FnOnce(Found<'_>) -> Result<T>) -> Result<T> {
        let resolved = self.resolve(path);
        let (_, names) = Self::split(&resolved);
        let root = self.root.read().unwrap();
        tracing::trace!(path = %resolved.display(), "in-memory lookup");
        if names.is_empty() {
            return f(Found::Directory(&root));
        }
        match lookup_raw(&root, &names) {
            Some(Node::Directory(dir)) => f(Found::Directory(dir)),
            Some(Node::File(file) | Node::HardLink(file)) => f(Found::File(file)),
            None => Err(Error::NotFound(path.to_path_buf())),
        }
    }
}

/// Walk `names` below `root`. Files in the middle of the path end the walk.
fn lookup_raw<'a>(root: &'a DirectoryNode, names: &[OsString]) -> Option<&'a Node> {
    let (last, parents) = names.split_last()?;
    let mut dir = root;
    for name in parents {
        match dir.entries.get(name)? {
            Node::Directory(child) => dir = child,
            Node::File(_) | Node::HardLink(_) => return None,
        }
    }
    dir.entries.get(last)
}

impl FileSystem for InMemoryFileSystem {
    fn status(&self, path: &Path) -> Result<Status> {
        self.with_node(path, |found| {
            Ok(match found {
                Found::Directory(dir) => dir.status.copy_with_new_name(path),
                Found::File(file) => file.status.copy_with_new_name(path),
            })
        })
    }

    fn open_file_for_read(&self, path: &Path) -> Result<Box<dyn File>> {
        self.with_node(path, |found| match found {
            Found::Directory(_) => Err(Error::NotAFile(path.to_path_buf())),
            Found::File(file) => Ok(Box::new(InMemoryFileHandle {
                node: Arc::clone(file),
                requested: path.to_path_buf(),
            }) as Box<dyn File>),
        })
    }

    fn dir_begin(&self, dir: &Path) -> Result<DirIter> {
        self.with_node(dir, |found| match found {
            Found::File(_) => Err(Error::NotADirectory(dir.to_path_buf())),
            Found::Directory(node) => {
                let entries = node
                    .entries
                    .iter()
                    .map(|(name, child)| {
                        let file_type = match child {
                            Node::Directory(_) => FileType::Directory,
                            Node::File(file) => file.status.file_type(),
                            Node::HardLink(_) => FileType::Regular,
                        };
                        DirEntry::new(dir.join(name), file_type)
                    })
                    .collect();
                Ok(DirIter::new(ListDirIter::new(entries)))
            }
        })
    }

    fn current_working_directory(&self) -> Result<PathBuf> {
        Ok(self.working_directory.read().unwrap().clone())
    }

    /// Store `path` as the working directory.
    ///
    /// The path is deliberately not checked against the tree: callers may
    /// point at directories they have not populated yet.
    fn set_current_working_directory(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path);
        *self.working_directory.write().unwrap() = resolved;
        Ok(())
    }
}

/// Open in-memory file. Shares the node's buffer.
struct InMemoryFileHandle {
    node: Arc<FileNode>,
    requested: PathBuf,
}

impl File for InMemoryFileHandle {
    fn status(&self) -> Result<Status> {
        Ok(self.node.status.copy_with_new_name(&self.requested))
    }

    fn buffer(
        &mut self,
        name: &Path,
        _size_hint: Option<u64>,
        requires_null_terminator: bool,
        _is_volatile: bool,
    ) -> Result<FileBuffer> {
        Ok(FileBuffer::from_shared(
            name,
            &self.node.buffer,
            requires_null_terminator,
        ))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
