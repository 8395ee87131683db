//! Lexical path helpers shared by the backends.
//!
//! Nothing here touches a file system.

use std::path::{Component, Path, PathBuf};

/// Remove `.` and resolve `..` lexically.
///
/// `..` at the root stays at the root. A relative path that climbs above its
/// start keeps the leading `..` components.
pub fn remove_dots(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    let mut normals = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if normals > 0 {
                    result.pop();
                    normals -= 1;
                } else if !result.has_root() {
                    result.push("..");
                }
            }
            Component::Normal(name) => {
                result.push(name);
                normals += 1;
            }
        }
    }

    result
}

/// Join `path` onto `base` unless it is already absolute.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// ASCII case-insensitive comparison used by case-insensitive mappings.
pub fn names_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_cur_and_parent() {
        assert_eq!(remove_dots(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(remove_dots(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(remove_dots(Path::new("/")), PathBuf::from("/"));
    }

    #[test]
    fn relative_paths_keep_leading_parents() {
        assert_eq!(remove_dots(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(remove_dots(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(remove_dots(Path::new("./")), PathBuf::new());
    }

    #[test]
    fn absolutize_respects_absolute_input() {
        assert_eq!(
            absolutize(Path::new("/cwd"), Path::new("/x")),
            PathBuf::from("/x")
        );
        assert_eq!(
            absolutize(Path::new("/cwd"), Path::new("x/y")),
            PathBuf::from("/cwd/x/y")
        );
    }

    #[test]
    fn case_folding() {
        assert!(names_equal("XX", "xX", false));
        assert!(!names_equal("XX", "xX", true));
    }
}
