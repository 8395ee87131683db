//! Emits mapping documents.
//!
//! [`MappingWriter`] collects `virtual -> external` file mappings and renders
//! a schema-0 document that [`super::MappingParser`] accepts. Files are
//! grouped under one directory root per parent directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::parser::SUPPORTED_VERSION;
use crate::error::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Document {
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    case_sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_external_names: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlay_relative: Option<bool>,
    roots: Vec<DirectoryRecord>,
}

#[derive(Serialize)]
struct DirectoryRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    contents: Vec<FileRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct FileRecord {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    external_contents: String,
}

/// Builder for mapping documents.
#[derive(Debug, Clone, Default)]
pub struct MappingWriter {
    mappings: Vec<(PathBuf, PathBuf)>,
    case_sensitive: Option<bool>,
    use_external_names: Option<bool>,
    overlay_dir: Option<PathBuf>,
}

impl MappingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the absolute virtual path `virtual_path` to `external`.
    pub fn add_file_mapping(&mut self, virtual_path: impl Into<PathBuf>, external: impl Into<PathBuf>) {
        self.mappings.push((virtual_path.into(), external.into()));
    }

    pub fn case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    pub fn use_external_names(&mut self, use_external_names: bool) -> &mut Self {
        self.use_external_names = Some(use_external_names);
        self
    }

    /// Write external paths relative to `dir` and set `overlay-relative`.
    ///
    /// `dir` should be the directory the document will be stored in.
    pub fn overlay_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.overlay_dir = Some(dir.into());
        self
    }

    /// Render the document as pretty-printed JSON.
    ///
    /// # Errors
    /// `InvalidArgument` if a virtual path is not absolute or has no file
    /// name, or if an external path is outside the overlay directory.
    pub fn write(&self) -> Result<String> {
        let mut sorted: Vec<&(PathBuf, PathBuf)> = self.mappings.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut roots: Vec<DirectoryRecord> = Vec::new();
        for (virtual_path, external) in sorted {
            if !virtual_path.is_absolute() {
                return Err(Error::InvalidArgument(format!(
                    "virtual path must be absolute: {}",
                    virtual_path.display()
                )));
            }
            let (Some(parent), Some(file_name)) = (virtual_path.parent(), virtual_path.file_name()) else {
                return Err(Error::InvalidArgument(format!(
                    "virtual path has no file name: {}",
                    virtual_path.display()
                )));
            };
            let parent = parent.to_string_lossy().into_owned();
            let file = FileRecord {
                kind: "file",
                name: file_name.to_string_lossy().into_owned(),
                external_contents: self.external_text(external)?,
            };
            match roots.last_mut() {
                Some(root) if root.name == parent => root.contents.push(file),
                _ => roots.push(DirectoryRecord {
                    kind: "directory",
                    name: parent,
                    contents: vec![file],
                }),
            }
        }

        let document = Document {
            version: SUPPORTED_VERSION,
            case_sensitive: self.case_sensitive,
            use_external_names: self.use_external_names,
            overlay_relative: self.overlay_dir.as_ref().map(|_| true),
            roots,
        };
        serde_json::to_string_pretty(&document)
            .map_err(|e| Error::InvalidArgument(format!("cannot render mapping: {e}")))
    }

    fn external_text(&self, external: &Path) -> Result<String> {
        let path = match &self.overlay_dir {
            Some(dir) => external.strip_prefix(dir).map_err(|_| {
                Error::InvalidArgument(format!(
                    "{} is outside overlay directory {}",
                    external.display(),
                    dir.display()
                ))
            })?,
            None => external,
        };
        Ok(path.to_string_lossy().into_owned())
    }
}
