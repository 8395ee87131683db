//! Redirect tree built from a mapping document.
//!
//! Each level of the tree is one path component. Root entries carry the
//! root of an absolute path (`/` or a drive prefix) as their name.

use std::path::{Component, Path, PathBuf};

use crate::path::names_equal;
use crate::status::Status;

/// Which name a redirected file reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameKind {
    /// Use the document-wide `use-external-names` setting.
    #[default]
    NotSet,
    External,
    Virtual,
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub contents: Vec<Entry>,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub external_contents: PathBuf,
    pub use_name: NameKind,
}

#[derive(Debug, Clone)]
pub enum Entry {
    /// A directory. An empty name matches without consuming a component.
    Directory(DirectoryEntry),
    File(FileEntry),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Directory(dir) => &dir.name,
            Entry::File(file) => &file.name,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    /// Find the entry for `components` at or below this one.
    ///
    /// Siblings are tried in declaration order; the first full match wins.
    pub fn lookup<'a>(&'a self, components: &[String], case_sensitive: bool) -> Option<&'a Entry> {
        if let Entry::Directory(dir) = self {
            if dir.name.is_empty() {
                return dir
                    .contents
                    .iter()
                    .find_map(|child| child.lookup(components, case_sensitive));
            }
        }

        let (first, rest) = components.split_first()?;
        if !names_equal(self.name(), first, case_sensitive) {
            return None;
        }
        if rest.is_empty() {
            return Some(self);
        }
        match self {
            Entry::Directory(dir) => dir
                .contents
                .iter()
                .find_map(|child| child.lookup(rest, case_sensitive)),
            Entry::File(_) => None,
        }
    }
}

/// Split a path into tree components: the root (if any) as one component,
/// then each name. `.` components are dropped.
pub fn split_components(path: &Path) -> Vec<String> {
    let mut root = String::new();
    let mut names = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                root.push_str(&component.as_os_str().to_string_lossy())
            }
            Component::CurDir => {}
            Component::ParentDir | Component::Normal(_) => {
                names.push(component.as_os_str().to_string_lossy().into_owned())
            }
        }
    }
    if !root.is_empty() {
        names.insert(0, root);
    }
    names
}

/// Add `entry` to `siblings`, merging with a same-named entry.
///
/// Two directories merge their contents recursively. Otherwise the new entry
/// replaces the existing one in place.
pub fn merge_entry(siblings: &mut Vec<Entry>, entry: Entry, case_sensitive: bool) {
    let existing = siblings.iter_mut().find(|sibling| {
        !entry.name().is_empty() && names_equal(sibling.name(), entry.name(), case_sensitive)
    });
    match (existing, entry) {
        (Some(Entry::Directory(target)), Entry::Directory(source)) => {
            for child in source.contents {
                merge_entry(&mut target.contents, child, case_sensitive);
            }
        }
        (Some(slot), entry) => {
            tracing::debug!(name = entry.name(), "mapping: later entry replaces earlier one");
            *slot = entry;
        }
        (None, entry) => siblings.push(entry),
    }
}
