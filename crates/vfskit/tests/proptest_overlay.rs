//! Property-based tests for overlay precedence and path handling
//!
//! Run with: cargo test --test proptest_overlay

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use vfskit::{FileSystem, InMemoryFileSystem, OverlayFileSystem, remove_dots};

// Short names from a small alphabet so layers collide often
fn name_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-d]{1,2}").unwrap()
}

// Per layer: a set of file names under /d
fn layers_strategy() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
    proptest::collection::vec(proptest::collection::btree_set(name_strategy(), 0..6), 1..5)
}

fn component_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(".".to_string()),
        Just("..".to_string()),
        proptest::string::string_regex("[a-c]").unwrap(),
    ]
}

fn build(layers: &[BTreeSet<String>]) -> (OverlayFileSystem, Vec<Arc<InMemoryFileSystem>>) {
    let mems: Vec<_> = layers
        .iter()
        .enumerate()
        .map(|(index, names)| {
            let fs = Arc::new(InMemoryFileSystem::new());
            fs.add_directory("/d", SystemTime::UNIX_EPOCH);
            for name in names {
                fs.add_file(
                    format!("/d/{name}"),
                    SystemTime::UNIX_EPOCH,
                    format!("{index}").as_bytes(),
                );
            }
            fs
        })
        .collect();
    let overlay = OverlayFileSystem::new(Arc::clone(&mems[0]) as Arc<dyn FileSystem>);
    for layer in &mems[1..] {
        overlay.push_overlay(Arc::clone(layer) as Arc<dyn FileSystem>);
    }
    (overlay, mems)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The most recently pushed layer holding a name answers for it.
    #[test]
    fn highest_layer_wins(layers in layers_strategy()) {
        let (overlay, mems) = build(&layers);
        let all: BTreeSet<_> = layers.iter().flatten().cloned().collect();
        for name in &all {
            let path = PathBuf::from(format!("/d/{name}"));
            let owner = layers.iter().rposition(|names| names.contains(name)).unwrap();
            let status = overlay.status(&path).unwrap();
            prop_assert!(status.equivalent(&mems[owner].status(&path).unwrap()));
            let buf = overlay.buffer_for_file(&path, None, false, false).unwrap();
            let expected = format!("{owner}");
            prop_assert_eq!(buf.as_bytes(), expected.as_bytes());
        }
    }

    /// Listing is the union of all layers with each name exactly once.
    #[test]
    fn listing_is_union_without_duplicates(layers in layers_strategy()) {
        let (overlay, _mems) = build(&layers);
        let listed: Vec<String> = overlay
            .dir_begin(Path::new("/d"))
            .unwrap()
            .map(|e| e.unwrap().name().unwrap().to_string_lossy().into_owned())
            .collect();
        let unique: BTreeSet<_> = listed.iter().cloned().collect();
        prop_assert_eq!(unique.len(), listed.len());
        let expected: BTreeSet<_> = layers.iter().flatten().cloned().collect();
        prop_assert_eq!(unique, expected);
    }

    /// Names in no layer are never found.
    #[test]
    fn absent_names_are_not_found(layers in layers_strategy(), probe in name_strategy()) {
        prop_assume!(layers.iter().all(|names| !names.contains(&probe)));
        let (overlay, _mems) = build(&layers);
        let path = PathBuf::from(format!("/d/{probe}"));
        prop_assert!(overlay.status(&path).unwrap_err().is_not_found());
        prop_assert!(overlay.open_file_for_read(&path).err().unwrap().is_not_found());
    }

    /// Normalized lookups agree with lookups of the lexically cleaned path.
    #[test]
    fn dotted_paths_resolve_like_clean_paths(components in proptest::collection::vec(component_strategy(), 0..8)) {
        let fs = InMemoryFileSystem::new();
        for a in ["a", "b", "c"] {
            for b in ["a", "b", "c"] {
                fs.add_file(format!("/{a}/{b}"), SystemTime::UNIX_EPOCH, b"");
            }
        }
        let mut dotted = PathBuf::from("/");
        for component in &components {
            dotted.push(component);
        }
        let clean = remove_dots(&dotted);
        prop_assert!(!clean.components().any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::CurDir)));
        prop_assert_eq!(fs.exists(&dotted), fs.exists(&clean));
    }
}
