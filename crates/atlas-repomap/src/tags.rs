use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Parser, Query, QueryCursor};

use crate::fs::FileSystem;
use crate::language::Language;

/// Capture-name prefix marking an identifier definition.
const DEFINITION_PREFIX: &str = "name.definition.";

/// Capture-name prefix marking an identifier reference.
const REFERENCE_PREFIX: &str = "name.reference.";

/// A located identifier occurrence extracted from a source file.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use atlas_repomap::tags::{Tag, TagKind};
///
/// let tag = Tag {
///     abs_path: PathBuf::from("/repo/src/main.rs"),
///     rel_path: "src/main.rs".into(),
///     line: 1,
///     name: "main".into(),
///     kind: TagKind::Definition,
/// };
/// assert!(tag.is_definition());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Absolute path of the file, used to read it back when rendering.
    pub abs_path: PathBuf,
    /// Path relative to the repository root; the identity of the file in the map.
    pub rel_path: String,
    /// Line of the identifier (1-indexed).
    pub line: u32,
    /// Identifier text.
    pub name: String,
    /// Whether the identifier is defined or used here.
    pub kind: TagKind,
}

impl Tag {
    /// Returns `true` if this tag is a definition.
    pub fn is_definition(&self) -> bool {
        self.kind == TagKind::Definition
    }
}

/// Classification of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Definition,
    Reference,
}

/// Extracts [`Tag`]s from source files with per-language tree-sitter queries.
///
/// Queries are compiled on first use and kept for the extractor's lifetime;
/// a fresh parser is created for every file.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use atlas_repomap::language::Language;
/// use atlas_repomap::tags::{TagExtractor, TagKind};
///
/// let mut extractor = TagExtractor::new();
/// let tags = extractor.extract_source(
///     Path::new("/repo/lib.rs"),
///     "lib.rs",
///     Language::Rust,
///     "fn hello() {}\nfn main() { hello(); }\n",
/// );
/// assert!(tags.iter().any(|t| t.name == "hello" && t.kind == TagKind::Reference));
/// ```
#[derive(Default)]
pub struct TagExtractor {
    queries: HashMap<Language, Option<Query>>,
}

impl TagExtractor {
    /// Create an extractor with no compiled queries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `abs_path` through `fs` and extract its tags.
    ///
    /// Never fails: unsupported languages, unreadable or empty files and
    /// parse failures all yield an empty vec (logged as warnings).
    pub fn extract(&mut self, fs: &dyn FileSystem, abs_path: &Path, rel_path: &str) -> Vec<Tag> {
        let language = Language::from_path(abs_path);
        if language == Language::Unknown {
            tracing::debug!("no grammar for {rel_path}, skipping");
            return Vec::new();
        }

        let Some(source) = fs.read_text(abs_path) else {
            tracing::warn!("unable to read {rel_path}, no tags extracted");
            return Vec::new();
        };
        if source.trim().is_empty() {
            tracing::warn!("{rel_path} is empty, no tags extracted");
            return Vec::new();
        }

        self.extract_source(abs_path, rel_path, language, &source)
    }

    /// Extract tags from already loaded `source`.
    ///
    /// Files that only reference identifiers, defining none, yield no tags.
    pub fn extract_source(
        &mut self,
        abs_path: &Path,
        rel_path: &str,
        language: Language,
        source: &str,
    ) -> Vec<Tag> {
        let Some(grammar) = language.tree_sitter_language() else {
            return Vec::new();
        };

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            tracing::warn!("failed to load {} grammar for {rel_path}: {e}", language.name());
            return Vec::new();
        }
        let Some(tree) = parser.parse(source, None) else {
            tracing::warn!("failed to parse {rel_path}");
            return Vec::new();
        };

        let Some(query) = self.query(language) else {
            return Vec::new();
        };

        let bytes = source.as_bytes();
        let capture_names = query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut captures = cursor.captures(query, tree.root_node(), bytes);

        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        let mut has_definition = false;

        while let Some((m, index)) = captures.next() {
            let capture = m.captures[*index];
            let capture_name = capture_names[capture.index as usize];

            let kind = if capture_name.starts_with(DEFINITION_PREFIX) {
                TagKind::Definition
            } else if capture_name.starts_with(REFERENCE_PREFIX) {
                TagKind::Reference
            } else {
                continue;
            };

            let Ok(name) = capture.node.utf8_text(bytes) else {
                continue;
            };
            let line = capture.node.start_position().row as u32 + 1;

            // Overlapping patterns can capture the same identifier twice.
            if !seen.insert((line, name, kind)) {
                continue;
            }

            has_definition |= kind == TagKind::Definition;
            tags.push(Tag {
                abs_path: abs_path.to_path_buf(),
                rel_path: rel_path.to_string(),
                line,
                name: name.to_string(),
                kind,
            });
        }

        if !has_definition && !tags.is_empty() {
            tracing::debug!(
                "{rel_path} has {} references but no definitions, dropping its tags",
                tags.len()
            );
            return Vec::new();
        }

        tags
    }

    fn query(&mut self, language: Language) -> Option<&Query> {
        self.queries
            .entry(language)
            .or_insert_with(|| match language.compile_tags_query() {
                Ok(query) => Some(query),
                Err(e) => {
                    tracing::warn!("{e}");
                    None
                }
            })
            .as_ref()
    }
}
