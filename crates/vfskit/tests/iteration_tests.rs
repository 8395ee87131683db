//! Directory iteration tests
//!
//! Single-level iterator protocol and the recursive walker built on it.

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use vfskit::{
    DirIter, Error, FileSystem, InMemoryFileSystem, Intercept, ProxyFileSystem, RecursiveDirIter,
    Result,
};

fn tree(paths: &[&str]) -> Arc<InMemoryFileSystem> {
    let fs = Arc::new(InMemoryFileSystem::new());
    for path in paths {
        if let Some(dir) = path.strip_suffix('/') {
            assert!(fs.add_directory(dir, SystemTime::UNIX_EPOCH));
        } else {
            assert!(fs.add_file(path, SystemTime::UNIX_EPOCH, b""));
        }
    }
    fs
}

fn paths(iter: impl Iterator<Item = Result<vfskit::DirEntry>>) -> Vec<PathBuf> {
    iter.map(|e| e.unwrap().path).collect()
}

#[test]
fn iterator_equality() {
    let fs = tree(&["/d/a", "/d/b"]);
    let mut first = fs.dir_begin(Path::new("/d")).unwrap();
    let second = fs.dir_begin(Path::new("/d")).unwrap();
    assert_eq!(first, second);

    first.increment().unwrap();
    assert_ne!(first, second);

    first.increment().unwrap();
    assert!(first.is_end());
    assert_eq!(first, DirIter::end());
}

#[test]
fn empty_directory_begins_at_end() {
    let fs = tree(&["/empty/"]);
    let iter = fs.dir_begin(Path::new("/empty")).unwrap();
    assert!(iter.is_end());
    assert_eq!(iter.entry(), None);
}

#[test]
fn recursive_walk_is_depth_first() {
    let fs = tree(&["/r/a/x", "/r/a/y/z", "/r/b", "/r/c/"]);
    let walked = paths(RecursiveDirIter::new(fs.as_ref(), Path::new("/r")).unwrap());
    assert_eq!(
        walked,
        vec![
            PathBuf::from("/r/a"),
            PathBuf::from("/r/a/x"),
            PathBuf::from("/r/a/y"),
            PathBuf::from("/r/a/y/z"),
            PathBuf::from("/r/b"),
            PathBuf::from("/r/c"),
        ]
    );
}

#[test]
fn levels_track_depth() {
    let fs = tree(&["/r/a/b/c"]);
    let mut iter = RecursiveDirIter::new(fs.as_ref(), Path::new("/r")).unwrap();
    let mut levels = Vec::new();
    while let Some(entry) = iter.entry() {
        levels.push((entry.path.clone(), iter.level()));
        iter.increment().unwrap();
    }
    assert_eq!(
        levels,
        vec![
            (PathBuf::from("/r/a"), 0),
            (PathBuf::from("/r/a/b"), 1),
            (PathBuf::from("/r/a/b/c"), 2),
        ]
    );
    assert!(iter.is_end());
}

#[test]
fn no_push_skips_one_directory_only() {
    let fs = tree(&["/r/skip/hidden", "/r/walk/seen"]);
    let mut iter = RecursiveDirIter::new(fs.as_ref(), Path::new("/r")).unwrap();
    let mut walked = Vec::new();
    while let Some(entry) = iter.entry() {
        let path = entry.path.clone();
        if path == Path::new("/r/skip") {
            iter.no_push();
        }
        walked.push(path);
        iter.increment().unwrap();
    }
    assert_eq!(
        walked,
        vec![
            PathBuf::from("/r/skip"),
            PathBuf::from("/r/walk"),
            PathBuf::from("/r/walk/seen"),
        ]
    );
}

#[test]
fn pop_leaves_current_directory() {
    let fs = tree(&["/r/a/1", "/r/a/2", "/r/a/3", "/r/b"]);
    let mut iter = RecursiveDirIter::new(fs.as_ref(), Path::new("/r")).unwrap();
    assert_eq!(iter.entry().unwrap().path, PathBuf::from("/r/a"));
    iter.increment().unwrap();
    assert_eq!(iter.entry().unwrap().path, PathBuf::from("/r/a/1"));
    assert_eq!(iter.level(), 1);

    iter.pop().unwrap();
    assert_eq!(iter.entry().unwrap().path, PathBuf::from("/r/b"));
    assert_eq!(iter.level(), 0);

    iter.pop().unwrap();
    assert!(iter.is_end());
}

struct Unreadable(&'static str);

impl Intercept for Unreadable {
    fn dir_begin(&self, inner: &dyn FileSystem, dir: &Path) -> Result<DirIter> {
        if dir == Path::new(self.0) {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        inner.dir_begin(dir)
    }
}

#[test]
fn descend_failure_is_reported_and_skipped() {
    let inner = tree(&["/d/bad/secret", "/d/good/x"]);
    let fs = ProxyFileSystem::with_intercept(inner, Unreadable("/d/bad"));

    let results: Vec<_> = RecursiveDirIter::new(&fs, Path::new("/d")).unwrap().collect();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_ref().unwrap().path, PathBuf::from("/d/bad"));
    assert!(matches!(results[1], Err(Error::Io(_))));
    assert_eq!(results[2].as_ref().unwrap().path, PathBuf::from("/d/good"));
    assert_eq!(results[3].as_ref().unwrap().path, PathBuf::from("/d/good/x"));
}

#[test]
fn start_must_be_a_directory() {
    let fs = tree(&["/file"]);
    assert!(matches!(
        RecursiveDirIter::new(fs.as_ref(), Path::new("/file")),
        Err(Error::NotADirectory(_))
    ));
    assert!(RecursiveDirIter::new(fs.as_ref(), Path::new("/missing"))
        .err()
        .unwrap()
        .is_not_found());
}

#[test]
fn deep_tree_walk() {
    let depth = 256;
    let mut path = String::new();
    for i in 0..depth {
        path.push_str(&format!("/{i}"));
    }
    let fs = tree(&[path.as_str()]);
    let count = RecursiveDirIter::new(fs.as_ref(), Path::new("/"))
        .unwrap()
        .count();
    assert_eq!(count, depth);
}
