//! Multi-file map text assembled from ranked entries.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use atlas_core::{AtlasError, RenderConfig};

use crate::context::TreeContext;
use crate::fs::FileSystem;
use crate::language::Language;
use crate::tags::Tag;

/// Rendered map lines are cut to this many characters.
pub const MAX_LINE_CHARS: usize = 100;

/// One item of a ranked map: a definition to excerpt, or a bare file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEntry {
    Tag(Tag),
    File(String),
}

impl MapEntry {
    /// Repository-relative path this entry belongs to.
    pub fn rel_path(&self) -> &str {
        match self {
            MapEntry::Tag(tag) => &tag.rel_path,
            MapEntry::File(rel_path) => rel_path,
        }
    }
}

/// File being accumulated by [`TreeRenderer::to_tree`].
struct PendingFile<'a> {
    rel_path: &'a str,
    /// Absolute path and 1-based definition lines; `None` for path-only files.
    lines: Option<(&'a Path, Vec<u32>)>,
}

type RenderKey = (String, Vec<u32>, Option<SystemTime>);

/// Renders excerpts and caches both parsed files and finished renderings.
///
/// Parsed files are keyed by path and invalidated on mtime change;
/// renderings are keyed by path, sorted lines and mtime so repeated
/// requests during one budget search are free.
pub struct TreeRenderer {
    options: RenderConfig,
    contexts: HashMap<String, (Option<SystemTime>, Arc<TreeContext>)>,
    rendered: HashMap<RenderKey, String>,
}

impl TreeRenderer {
    pub fn new(options: RenderConfig) -> Self {
        Self {
            options,
            contexts: HashMap::new(),
            rendered: HashMap::new(),
        }
    }

    /// Number of cached renderings.
    pub fn rendered_len(&self) -> usize {
        self.rendered.len()
    }

    /// Drop cached renderings; parsed files stay cached.
    pub fn clear_rendered(&mut self) {
        self.rendered.clear();
    }

    /// Render the excerpt of one file around 1-based `lines`.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Overflow`] if the file nests too deeply to render.
    pub fn render(
        &mut self,
        fs: &dyn FileSystem,
        abs_path: &Path,
        rel_path: &str,
        lines: &[u32],
    ) -> Result<String, AtlasError> {
        let mtime = fs.modified(abs_path);
        let mut sorted = lines.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let key = (rel_path.to_string(), sorted, mtime);
        if let Some(text) = self.rendered.get(&key) {
            return Ok(text.clone());
        }

        let context = self.context(fs, abs_path, rel_path, mtime);
        let lois: BTreeSet<usize> = key
            .1
            .iter()
            .map(|&line| (line as usize).saturating_sub(1))
            .collect();
        let text = context.render(&lois)?;
        self.rendered.insert(key, text.clone());
        Ok(text)
    }

    fn context(
        &mut self,
        fs: &dyn FileSystem,
        abs_path: &Path,
        rel_path: &str,
        mtime: Option<SystemTime>,
    ) -> Arc<TreeContext> {
        if let Some((cached_mtime, context)) = self.contexts.get(rel_path) {
            if *cached_mtime == mtime {
                return Arc::clone(context);
            }
        }

        let source = fs.read_text(abs_path).unwrap_or_default();
        let context = Arc::new(TreeContext::new(
            &source,
            Language::from_path(abs_path),
            self.options.clone(),
        ));
        self.contexts
            .insert(rel_path.to_string(), (mtime, Arc::clone(&context)));
        context
    }

    /// Assemble the map text for `entries`, skipping files in `chat_files`.
    ///
    /// Consecutive entries of the same file are rendered together as
    /// `path:` followed by the excerpt; path-only entries appear as a bare
    /// path line. Every output line is cut to [`MAX_LINE_CHARS`].
    ///
    /// # Errors
    ///
    /// Propagates [`AtlasError::Overflow`] from rendering.
    pub fn to_tree(
        &mut self,
        fs: &dyn FileSystem,
        entries: &[MapEntry],
        chat_files: &HashSet<String>,
    ) -> Result<String, AtlasError> {
        if entries.is_empty() {
            return Ok(String::new());
        }

        let mut output = String::new();
        let mut pending: Option<PendingFile<'_>> = None;

        for entry in entries {
            let rel_path = entry.rel_path();
            if chat_files.contains(rel_path) {
                continue;
            }

            if pending.as_ref().map(|p| p.rel_path) != Some(rel_path) {
                if let Some(done) = pending.take() {
                    self.flush(fs, done, &mut output)?;
                }
                pending = Some(PendingFile {
                    rel_path,
                    lines: match entry {
                        MapEntry::Tag(tag) => Some((tag.abs_path.as_path(), Vec::new())),
                        MapEntry::File(_) => None,
                    },
                });
            }

            if let (MapEntry::Tag(tag), Some(file)) = (entry, pending.as_mut()) {
                if let Some((_, lines)) = file.lines.as_mut() {
                    lines.push(tag.line);
                }
            }
        }
        if let Some(done) = pending.take() {
            self.flush(fs, done, &mut output)?;
        }

        let mut truncated: Vec<String> = output
            .lines()
            .map(|line| line.chars().take(MAX_LINE_CHARS).collect())
            .collect();
        truncated.push(String::new());
        Ok(truncated.join("\n"))
    }

    fn flush(
        &mut self,
        fs: &dyn FileSystem,
        file: PendingFile<'_>,
        output: &mut String,
    ) -> Result<(), AtlasError> {
        output.push('\n');
        output.push_str(file.rel_path);
        match file.lines {
            Some((abs_path, lines)) => {
                output.push_str(":\n");
                let excerpt = self.render(fs, abs_path, file.rel_path, &lines)?;
                output.push_str(&excerpt);
            }
            None => output.push('\n'),
        }
        Ok(())
    }
}
