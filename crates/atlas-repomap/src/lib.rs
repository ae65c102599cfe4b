//! Token-budgeted repository maps via tree-sitter and PageRank ranking.
//!
//! Source files are parsed into definition and reference tags, files are
//! ranked by a weighted reference graph, and the best-ranked definitions are
//! rendered as elided source excerpts until the token budget is met. Uses
//! tree-sitter for parsing, petgraph for the reference graph, and the
//! `ignore` crate for file walking.

pub mod budget;
pub mod cache;
pub mod context;
pub mod fs;
pub mod graph;
pub mod language;
pub mod output;
pub mod repomap;
pub mod tags;
pub mod tokens;
pub mod tree;
pub mod walker;

use std::path::Path;

use atlas_core::{AtlasConfig, AtlasError};

pub use repomap::{MapRequest, RepoMap};

/// Generate a map of the whole repository at `root`.
///
/// Walks the repository, treats every discovered file as a candidate and
/// returns the map text, or `None` when the budget is zero or nothing was
/// found.
///
/// # Errors
///
/// Returns [`AtlasError`] if the repository cannot be walked.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use atlas_core::AtlasConfig;
/// use atlas_repomap::generate_map;
///
/// let map = generate_map(Path::new("."), &AtlasConfig::default()).unwrap();
/// println!("{}", map.unwrap_or_default());
/// ```
pub fn generate_map(root: &Path, config: &AtlasConfig) -> Result<Option<String>, AtlasError> {
    let files = walker::walk_repo(root, &config.walk)?;
    let mut repo_map = RepoMap::new(root, config);
    let request = MapRequest {
        other_files: files.paths,
        ..MapRequest::default()
    };
    Ok(repo_map.get_repo_map(&request))
}
