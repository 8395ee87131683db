//! Mapping-document parser.
//!
//! Turns a [`Node`] tree into [`MappingOptions`] and a redirect tree. Every
//! malformed node produces one [`Diagnostic`]; parsing continues past errors
//! so a single pass reports all of them, and the result is rejected if any
//! were reported.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::entry::{merge_entry, split_components, DirectoryEntry, Entry, FileEntry, NameKind};
use super::node::Node;
use super::Diagnostic;
use crate::error::{Error, Result};
use crate::path::remove_dots;
use crate::status::Status;

/// The only schema version understood.
pub const SUPPORTED_VERSION: u64 = 0;

const TOP_LEVEL_KEYS: &[&str] = &[
    "version",
    "case-sensitive",
    "use-external-names",
    "overlay-relative",
    "fallthrough",
    "roots",
];

const ENTRY_KEYS: &[&str] = &["name", "type", "contents", "external-contents", "use-external-name"];

/// Document-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingOptions {
    pub case_sensitive: bool,
    pub use_external_names: bool,
    pub overlay_relative: bool,
    pub fallthrough: bool,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            use_external_names: true,
            overlay_relative: false,
            fallthrough: true,
        }
    }
}

/// A successfully parsed document.
#[derive(Debug, Clone)]
pub struct ParsedMapping {
    pub options: MappingOptions,
    /// Unified roots: one entry per distinct root.
    pub roots: Vec<Entry>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Directory,
}

/// Parser for one document.
pub struct MappingParser<'h> {
    handler: &'h mut dyn FnMut(&Diagnostic),
    errors: usize,
    document_dir: Option<PathBuf>,
    canonicalize: bool,
}

impl<'h> MappingParser<'h> {
    pub fn new(handler: &'h mut dyn FnMut(&Diagnostic)) -> Self {
        Self {
            handler,
            errors: 0,
            document_dir: None,
            canonicalize: true,
        }
    }

    /// Directory holding the document; prefixes `external-contents` when the
    /// document sets `overlay-relative`.
    pub fn document_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.document_dir = dir;
        self
    }

    /// Strip `.` and `..` from entry names and external paths.
    pub fn canonicalize(mut self, canonicalize: bool) -> Self {
        self.canonicalize = canonicalize;
        self
    }

    /// Report a syntax error from the document reader itself.
    pub fn report_syntax_error(mut self, message: impl Into<String>) -> Error {
        self.error("", message);
        Error::Mapping {
            errors: self.errors,
        }
    }

    /// Parse `document`.
    ///
    /// # Errors
    /// `Error::Mapping` with the number of diagnostics reported.
    pub fn parse(mut self, document: &Node) -> Result<ParsedMapping> {
        let parsed = self.parse_document(document);
        match parsed {
            Some(parsed) if self.errors == 0 => Ok(parsed),
            _ => Err(Error::Mapping {
                errors: self.errors.max(1),
            }),
        }
    }

    fn error(&mut self, location: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            location: location.to_string(),
            message: message.into(),
        };
        tracing::warn!(location = %diagnostic.location, "mapping: {}", diagnostic.message);
        self.errors += 1;
        (self.handler)(&diagnostic);
    }

    /// Known, non-duplicate keys of a mapping node with their locations.
    fn keys<'n>(
        &mut self,
        location: &str,
        pairs: &'n [(Node, Node)],
        known: &[&str],
    ) -> Vec<(&'n str, &'n Node, String)> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let Some(name) = key.as_scalar() else {
                self.error(location, format!("expected a scalar key, found {}", key.kind()));
                continue;
            };
            let key_location = join(location, name);
            if !known.contains(&name) {
                self.error(&key_location, format!("unknown key '{name}'"));
                continue;
            }
            if !seen.insert(name) {
                self.error(&key_location, format!("duplicate key '{name}'"));
                continue;
            }
            accepted.push((name, value, key_location));
        }
        accepted
    }

    fn scalar<'n>(&mut self, location: &str, node: &'n Node) -> Option<&'n str> {
        let scalar = node.as_scalar();
        if scalar.is_none() {
            self.error(location, format!("expected a scalar, found {}", node.kind()));
        }
        scalar
    }

    fn boolean(&mut self, location: &str, node: &Node) -> Option<bool> {
        let text = self.scalar(location, node)?;
        match text.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => {
                self.error(location, format!("expected a boolean, found '{text}'"));
                None
            }
        }
    }

    fn parse_document(&mut self, document: &Node) -> Option<ParsedMapping> {
        let Some(pairs) = document.as_mapping() else {
            self.error("", format!("expected a mapping at top level, found {}", document.kind()));
            return None;
        };

        let mut options = MappingOptions::default();
        let mut has_version = false;
        let mut roots_node = None;
        for (key, value, location) in self.keys("", pairs, TOP_LEVEL_KEYS) {
            match key {
                "version" => {
                    has_version = true;
                    let Some(text) = self.scalar(&location, value) else { continue };
                    match text.parse::<u64>() {
                        Ok(SUPPORTED_VERSION) => {}
                        Ok(v) => self.error(
                            &location,
                            format!("unsupported version {v}, expected {SUPPORTED_VERSION}"),
                        ),
                        Err(_) => self.error(&location, format!("expected an integer, found '{text}'")),
                    }
                }
                "case-sensitive" => {
                    if let Some(b) = self.boolean(&location, value) {
                        options.case_sensitive = b;
                    }
                }
                "use-external-names" => {
                    if let Some(b) = self.boolean(&location, value) {
                        options.use_external_names = b;
                    }
                }
                "overlay-relative" => {
                    if let Some(b) = self.boolean(&location, value) {
                        options.overlay_relative = b;
                    }
                }
                "fallthrough" => {
                    if let Some(b) = self.boolean(&location, value) {
                        options.fallthrough = b;
                    }
                }
                "roots" => roots_node = Some((value, location)),
                _ => unreachable!("keys() only yields known keys"),
            }
        }

        if !has_version {
            self.error("", "missing key 'version'");
        }
        let Some((roots_node, location)) = roots_node else {
            self.error("", "missing key 'roots'");
            return None;
        };
        let Some(items) = roots_node.as_sequence() else {
            self.error(&location, format!("expected a sequence, found {}", roots_node.kind()));
            return None;
        };

        // Parsed after the key loop so `overlay-relative` applies regardless
        // of key order.
        let mut roots = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let item_location = format!("{location}[{index}]");
            if let Some(entry) = self.parse_entry(item, &item_location, None, &options) {
                merge_entry(&mut roots, entry, options.case_sensitive);
            }
        }

        Some(ParsedMapping { options, roots })
    }

    /// Parse one entry. `parent` is the virtual path of the enclosing
    /// directory, `None` for roots.
    fn parse_entry(
        &mut self,
        node: &Node,
        location: &str,
        parent: Option<&Path>,
        options: &MappingOptions,
    ) -> Option<Entry> {
        let Some(pairs) = node.as_mapping() else {
            self.error(location, format!("expected a mapping, found {}", node.kind()));
            return None;
        };

        let mut name = None;
        let mut kind = None;
        let mut contents = None;
        let mut external = None;
        let mut use_name = NameKind::NotSet;
        let mut use_name_location = None;
        let mut valid = true;

        let keys = self.keys(location, pairs, ENTRY_KEYS);
        let has_key = |wanted: &str| keys.iter().any(|(key, _, _)| *key == wanted);

        for (key, value, key_location) in &keys {
            match *key {
                "name" => match self.scalar(key_location, value) {
                    Some(text) => name = Some((text, key_location.clone())),
                    None => valid = false,
                },
                "type" => match self.scalar(key_location, value) {
                    Some("file") => kind = Some(Kind::File),
                    Some("directory") => kind = Some(Kind::Directory),
                    Some(other) => {
                        self.error(key_location, format!("unknown value '{other}' for key 'type'"));
                        valid = false;
                    }
                    None => valid = false,
                },
                "contents" => match value.as_sequence() {
                    Some(items) => contents = Some((items, key_location.clone())),
                    None => {
                        self.error(key_location, format!("expected a sequence, found {}", value.kind()));
                        valid = false;
                    }
                },
                "external-contents" => match self.scalar(key_location, value) {
                    Some(text) => external = Some(text),
                    None => valid = false,
                },
                "use-external-name" => {
                    use_name_location = Some(key_location.clone());
                    match self.boolean(key_location, value) {
                        Some(true) => use_name = NameKind::External,
                        Some(false) => use_name = NameKind::Virtual,
                        None => valid = false,
                    }
                }
                _ => unreachable!("keys() only yields known keys"),
            }
        }

        if !has_key("name") {
            self.error(location, "missing key 'name'");
            valid = false;
        }
        if !has_key("type") {
            self.error(location, "missing key 'type'");
            valid = false;
        }
        let has_contents = has_key("contents");
        let has_external = has_key("external-contents");
        if has_contents && has_external {
            self.error(location, "entry has both 'contents' and 'external-contents'");
            valid = false;
        } else if !has_contents && !has_external {
            self.error(location, "missing key 'contents' or 'external-contents'");
            valid = false;
        }
        match kind {
            Some(Kind::Directory) => {
                if let Some(loc) = &use_name_location {
                    self.error(loc, "'use-external-name' is not supported for directories");
                    valid = false;
                }
                if has_external && !has_contents {
                    self.error(location, "directory entry cannot have 'external-contents'");
                    valid = false;
                }
            }
            Some(Kind::File) => {
                if has_contents && !has_external {
                    self.error(location, "file entry cannot have 'contents'");
                    valid = false;
                }
            }
            None => {}
        }

        let base = parent.map(Path::to_path_buf).unwrap_or_default();
        let Some((raw_name, name_location)) = name else {
            // still walk the children so their problems are reported
            self.parse_children(contents, &base, options);
            return None;
        };
        let raw_name = Path::new(raw_name);
        if parent.is_none() && !raw_name.is_absolute() {
            self.error(&name_location, format!("root entry name must be absolute: '{}'", raw_name.display()));
            valid = false;
        }
        let name = if self.canonicalize {
            remove_dots(raw_name)
        } else {
            raw_name.to_path_buf()
        };
        let components = split_components(&name);
        if components.is_empty() && kind == Some(Kind::File) {
            self.error(&name_location, "file entry has an empty name");
            valid = false;
        }

        // Children are parsed even for invalid entries so their errors are
        // reported too.
        let full_path = if name.as_os_str().is_empty() {
            base.clone()
        } else {
            base.join(&name)
        };
        let children = self.parse_children(contents, &full_path, options);

        if !valid {
            return None;
        }
        let kind = kind?;

        let leaf_name = components.last().cloned().unwrap_or_default();
        let mut entry = match kind {
            Kind::Directory => Entry::Directory(DirectoryEntry {
                name: leaf_name,
                contents: children,
                status: Status::virtual_directory(&full_path),
            }),
            Kind::File => Entry::File(FileEntry {
                name: leaf_name,
                external_contents: self.external_path(external?, options),
                use_name,
            }),
        };

        // Expand multi-component names into a chain of implicit directories.
        if components.len() > 1 {
            let mut dir_path = base;
            let mut chain = Vec::with_capacity(components.len() - 1);
            for component in &components[..components.len() - 1] {
                dir_path.push(component);
                chain.push((component.clone(), dir_path.clone()));
            }
            for (component, path) in chain.into_iter().rev() {
                entry = Entry::Directory(DirectoryEntry {
                    name: component,
                    contents: vec![entry],
                    status: Status::virtual_directory(path),
                });
            }
        }
        Some(entry)
    }

    fn parse_children(
        &mut self,
        contents: Option<(&[Node], String)>,
        parent: &Path,
        options: &MappingOptions,
    ) -> Vec<Entry> {
        let mut children = Vec::new();
        if let Some((items, contents_location)) = contents {
            for (index, item) in items.iter().enumerate() {
                let item_location = format!("{contents_location}[{index}]");
                if let Some(child) = self.parse_entry(item, &item_location, Some(parent), options) {
                    merge_entry(&mut children, child, options.case_sensitive);
                }
            }
        }
        children
    }

    fn external_path(&self, external: &str, options: &MappingOptions) -> PathBuf {
        let mut path = PathBuf::from(external);
        if options.overlay_relative {
            if let Some(dir) = &self.document_dir {
                path = dir.join(path);
            }
        }
        if self.canonicalize {
            path = remove_dots(&path);
        }
        path
    }
}

fn join(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{location}.{key}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> (Result<ParsedMapping>, Vec<Diagnostic>) {
        let node = Node::from_yaml(text).unwrap();
        let mut diagnostics = Vec::new();
        let mut handler = |d: &Diagnostic| diagnostics.push(d.clone());
        let result = MappingParser::new(&mut handler).parse(&node);
        (result, diagnostics)
    }

    fn parse_ok(text: &str) -> ParsedMapping {
        let (result, diagnostics) = parse(text);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        result.unwrap()
    }

    fn messages(text: &str) -> Vec<String> {
        let (result, diagnostics) = parse(text);
        assert!(matches!(result, Err(Error::Mapping { .. })));
        diagnostics.into_iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let parsed = parse_ok("{version: 0, roots: []}");
        assert_eq!(parsed.options, MappingOptions::default());
        assert!(parsed.roots.is_empty());
    }

    #[test]
    fn options_and_boolean_spellings() {
        let parsed = parse_ok(
            "version: 0\ncase-sensitive: 'off'\nuse-external-names: NO\noverlay-relative: 'yes'\nfallthrough: 0\nroots: []\n",
        );
        assert_eq!(
            parsed.options,
            MappingOptions {
                case_sensitive: false,
                use_external_names: false,
                overlay_relative: true,
                fallthrough: false,
            }
        );
    }

    #[test]
    fn children_of_unnamed_entry_are_checked() {
        let found = messages(
            "{version: 0, roots: [{type: directory, contents: [{type: file, name: a, bogus: 1}]}]}",
        );
        assert_eq!(found.len(), 2, "{found:?}");
        assert_eq!(found[0], "roots[0]: missing key 'name'");
        assert!(found[1].starts_with("roots[0].contents[0]"), "{found:?}");
        assert!(found[1].contains("unknown key 'bogus'"), "{found:?}");
    }

    #[test]
    fn root_names_become_chains() {
        let parsed = parse_ok(
            "{version: 0, roots: [{type: file, name: /a/b/f, external-contents: /ext/f}]}",
        );
        assert_eq!(parsed.roots.len(), 1);
        let root = &parsed.roots[0];
        assert_eq!(root.name(), "/");
        let Entry::Directory(root) = root else { panic!("directory expected") };
        assert_eq!(root.status.name(), Path::new("/"));
        let Entry::Directory(a) = &root.contents[0] else { panic!("directory expected") };
        assert_eq!(a.name, "a");
        assert_eq!(a.status.name(), Path::new("/a"));
        let Entry::Directory(b) = &a.contents[0] else { panic!("directory expected") };
        let Entry::File(f) = &b.contents[0] else { panic!("file expected") };
        assert_eq!(f.name, "f");
        assert_eq!(f.external_contents, PathBuf::from("/ext/f"));
    }

    #[test]
    fn nested_relative_names() {
        let parsed = parse_ok(
            r#"
version: 0
roots:
  - type: directory
    name: /root
    contents:
      - type: file
        name: sub/dir/file
        external-contents: /ext/file
        use-external-name: false
"#,
        );
        let hit = parsed.roots[0]
            .lookup(&split_components(Path::new("/root/sub/dir/file")), true)
            .unwrap();
        let Entry::File(f) = hit else { panic!("file expected") };
        assert_eq!(f.use_name, NameKind::Virtual);
    }

    #[test]
    fn roots_with_same_directory_are_unified() {
        let parsed = parse_ok(
            r#"
version: 0
roots:
  - {type: file, name: /dir/a, external-contents: /x/a}
  - {type: file, name: /dir/b, external-contents: /x/b}
"#,
        );
        assert_eq!(parsed.roots.len(), 1);
        let Entry::Directory(root) = &parsed.roots[0] else { panic!() };
        assert_eq!(root.contents.len(), 1);
        let Entry::Directory(dir) = &root.contents[0] else { panic!() };
        let names: Vec<_> = dir.contents.iter().map(Entry::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn overlay_relative_prefix_is_order_independent() {
        let node = Node::from_yaml(
            "{roots: [{type: file, name: /v, external-contents: data/v}], overlay-relative: true, version: 0}",
        )
        .unwrap();
        let mut handler = |_: &Diagnostic| {};
        let parsed = MappingParser::new(&mut handler)
            .document_dir(Some(PathBuf::from("/overlay")))
            .parse(&node)
            .unwrap();
        let hit = parsed.roots[0]
            .lookup(&split_components(Path::new("/v")), true)
            .unwrap();
        let Entry::File(f) = hit else { panic!() };
        assert_eq!(f.external_contents, PathBuf::from("/overlay/data/v"));
    }

    #[test]
    fn canonicalizes_names() {
        let parsed = parse_ok(
            "{version: 0, roots: [{type: file, name: /a/./b/../c, external-contents: /e/./x}]}",
        );
        let hit = parsed.roots[0]
            .lookup(&split_components(Path::new("/a/c")), true)
            .unwrap();
        let Entry::File(f) = hit else { panic!() };
        assert_eq!(f.external_contents, PathBuf::from("/e/x"));
    }

    #[test]
    fn rejects_relative_root() {
        let msgs = messages("{version: 0, roots: [{type: file, name: rel, external-contents: /e}]}");
        assert_eq!(msgs, vec!["roots[0].name: root entry name must be absolute: 'rel'"]);
    }

    #[test]
    fn rejects_use_external_name_on_directory() {
        let msgs = messages(
            "{version: 0, roots: [{type: directory, name: /d, use-external-name: true, contents: []}]}",
        );
        assert_eq!(
            msgs,
            vec!["roots[0].use-external-name: 'use-external-name' is not supported for directories"]
        );
    }

    #[test]
    fn rejects_both_contents_kinds() {
        let msgs = messages(
            "{version: 0, roots: [{type: file, name: /f, contents: [], external-contents: /e}]}",
        );
        assert_eq!(msgs, vec!["roots[0]: entry has both 'contents' and 'external-contents'"]);
    }

    #[test]
    fn rejects_missing_contents() {
        let msgs = messages("{version: 0, roots: [{type: file, name: /f}]}");
        assert_eq!(msgs, vec!["roots[0]: missing key 'contents' or 'external-contents'"]);
    }

    #[test]
    fn rejects_unsupported_version() {
        let msgs = messages("{version: 1, roots: []}");
        assert_eq!(msgs, vec!["version: unsupported version 1, expected 0"]);
    }

    #[test]
    fn rejects_duplicate_top_level_key() {
        let msgs = messages("version: 0\nroots: []\nroots: []\n");
        assert_eq!(msgs, vec!["roots: duplicate key 'roots'"]);
    }

    #[test]
    fn rejects_missing_required_keys() {
        let msgs = messages("{case-sensitive: true}");
        assert_eq!(msgs, vec!["missing key 'version'", "missing key 'roots'"]);
    }

    #[test]
    fn rejects_bad_values() {
        let msgs = messages(
            r#"
version: 0
fallthrough: maybe
bogus: 1
roots:
  - {type: link, name: /l, external-contents: /e}
  - {type: directory, name: /d, contents: {}}
  - not-a-mapping
"#,
        );
        assert_eq!(
            msgs,
            vec![
                "bogus: unknown key 'bogus'",
                "fallthrough: expected a boolean, found 'maybe'",
                "roots[0].type: unknown value 'link' for key 'type'",
                "roots[1].contents: expected a sequence, found mapping",
                "roots[2]: expected a mapping, found scalar",
            ]
        );
    }

    #[test]
    fn nested_errors_are_all_reported() {
        let (result, diagnostics) = parse(
            r#"
version: 0
roots:
  - type: directory
    name: /d
    contents:
      - {type: file, name: a}
      - {type: file, name: b, external-contents: /e, extra: 1}
"#,
        );
        assert!(result.is_err());
        let locations: Vec<_> = diagnostics.iter().map(|d| d.location.as_str()).collect();
        assert_eq!(locations, vec!["roots[0].contents[0]", "roots[0].contents[1].extra"]);
    }

    #[test]
    fn non_mapping_document() {
        let msgs = messages("[1, 2]");
        assert_eq!(msgs, vec!["expected a mapping at top level, found sequence"]);
    }
}
