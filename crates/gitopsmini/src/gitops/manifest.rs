//! Manifest discovery and multi-document YAML parsing.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::error::{FetchError, ParseError};

/// One parsed resource document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    /// Name of the file the document came from.
    pub file: String,
    /// Zero-based position among the non-empty documents of the file.
    pub index: usize,
    pub kind: String,
    /// `metadata.name`.
    pub name: String,
    pub body: Value,
}

/// All documents found in one manifest file, in file order.
#[derive(Debug)]
pub struct ManifestFile {
    pub name: String,
    pub documents: Vec<Result<ManifestDocument, ParseError>>,
}

/// Manifests produced for one run, plus the commit they were read from.
#[derive(Debug, Default)]
pub struct ManifestSet {
    pub revision: Option<String>,
    pub files: Vec<ManifestFile>,
}

impl ManifestSet {
    /// Total number of document entries, parse failures included.
    pub fn document_count(&self) -> usize {
        self.files.iter().map(|f| f.documents.len()).sum()
    }
}

fn is_manifest_file(name: &str) -> bool {
    name.ends_with(".yaml") || name.ends_with(".yml")
}

/// Reads every `.yaml`/`.yml` file directly inside `dir`, sorted by name.
///
/// Subdirectories are not descended into. A file that cannot be read
/// yields a single file-scoped [`ParseError`].
pub fn read_manifest_dir(dir: &Path) -> Result<Vec<ManifestFile>, FetchError> {
    if !dir.is_dir() {
        return Err(FetchError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| FetchError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_manifest_file(&name) {
            continue;
        }

        let documents = match std::fs::read_to_string(entry.path()) {
            Ok(content) => parse_documents(&name, &content),
            Err(e) => vec![Err(ParseError::ReadFile {
                file: name.clone(),
                message: e.to_string(),
            })],
        };
        files.push(ManifestFile { name, documents });
    }

    Ok(files)
}

/// Splits `content` on `---` separator and `...` end lines. Returns the raw
/// chunk text.
fn split_documents(content: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if line.trim_end() == "..." {
            chunks.push(std::mem::take(&mut current));
            continue;
        }
        let is_separator = line.trim_end() == "---" || line.starts_with("--- ");
        if is_separator {
            // Directives belong to the document their `---` opens.
            if has_only_directives(&current) {
                current.push_str(line);
                current.push('\n');
                continue;
            }
            chunks.push(std::mem::take(&mut current));
            // Inline content after the marker belongs to the new document.
            if let Some(rest) = line.strip_prefix("--- ") {
                current.push_str(rest);
                current.push('\n');
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    chunks.push(current);
    chunks
}

/// True when `chunk` holds at least one `%` directive and otherwise only
/// blank or comment lines.
fn has_only_directives(chunk: &str) -> bool {
    let mut directives = 0;
    for line in chunk.lines() {
        if line.starts_with('%') {
            directives += 1;
            continue;
        }
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            return false;
        }
    }
    directives > 0
}

fn is_blank(chunk: &str) -> bool {
    chunk.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

/// Parses every document in `content`. Empty and `null` documents are dropped;
/// each remaining document becomes its own entry so one bad document never
/// hides its siblings.
pub fn parse_documents(file: &str, content: &str) -> Vec<Result<ManifestDocument, ParseError>> {
    split_documents(content)
        .iter()
        .filter(|chunk| !is_blank(chunk))
        .filter_map(|chunk| match serde_yaml::from_str::<Value>(chunk) {
            Ok(Value::Null) => None,
            Ok(value) => Some(Ok(value)),
            Err(e) => Some(Err(e.to_string())),
        })
        .enumerate()
        .map(|(index, parsed)| {
            let body = parsed.map_err(|message| ParseError::Yaml {
                file: file.to_string(),
                index,
                message,
            })?;
            into_document(file, index, body)
        })
        .collect()
}

fn into_document(file: &str, index: usize, body: Value) -> Result<ManifestDocument, ParseError> {
    if !body.is_object() {
        return Err(ParseError::NotAMapping {
            file: file.to_string(),
            index,
        });
    }

    let missing = |field| ParseError::MissingField {
        file: file.to_string(),
        index,
        field,
    };

    let kind = body
        .get("kind")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("kind"))?
        .to_string();
    let name = body
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("metadata.name"))?
        .to_string();

    Ok(ManifestDocument {
        file: file.to_string(),
        index,
        kind,
        name,
        body,
    })
}
