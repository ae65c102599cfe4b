use std::io::Read;
use std::path::{Path, PathBuf};

use atlas_core::{AtlasError, WalkConfig};

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Hidden directories that are still walked.
const VISIBLE_HIDDEN_DIRS: &[&str] = &[".github"];

/// Candidate files of a repository, with their paths relative to the root.
///
/// # Examples
///
/// ```
/// use atlas_repomap::walker::RepoFiles;
///
/// let files = RepoFiles::default();
/// assert!(files.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RepoFiles {
    /// Absolute paths, sorted.
    pub paths: Vec<PathBuf>,
}

impl RepoFiles {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Walk `root` and collect every candidate file for the map.
///
/// Honors `.gitignore` and friends through the `ignore` crate, skips hidden
/// entries other than `.github/`, files larger than `max_file_size`, files that look binary and files whose
/// root-relative path matches one of the `exclude` globs. Files of every
/// extension are kept; the tag extractor decides later which ones it can
/// parse.
///
/// # Errors
///
/// Returns [`AtlasError::FileNotFound`] if `root` is not a directory, or
/// [`AtlasError::Config`] if an exclude pattern is not a valid glob.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use atlas_core::WalkConfig;
/// use atlas_repomap::walker::walk_repo;
///
/// let files = walk_repo(Path::new("."), &WalkConfig::default()).unwrap();
/// for path in &files.paths {
///     println!("{}", path.display());
/// }
/// ```
pub fn walk_repo(root: &Path, config: &WalkConfig) -> Result<RepoFiles, AtlasError> {
    if !root.is_dir() {
        return Err(AtlasError::FileNotFound(root.to_path_buf()));
    }

    let excludes = config
        .exclude
        .iter()
        .map(|pat| {
            glob::Pattern::new(pat)
                .map_err(|e| AtlasError::Config(format!("invalid exclude pattern '{pat}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut paths = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .filter_entry(|entry| !is_hidden(entry))
        .build();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("skipping walk entry: {e}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excludes.iter().any(|p| p.matches_path(relative)) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.len() > config.max_file_size {
            tracing::debug!("skipping large file {}", relative.display());
            continue;
        }

        if looks_binary(path) {
            continue;
        }

        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(RepoFiles { paths })
}

/// Dot-prefixed entries below the root, except [`VISIBLE_HIDDEN_DIRS`].
fn is_hidden(entry: &ignore::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    if !name.starts_with('.') {
        return false;
    }
    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
    !(is_dir && VISIBLE_HIDDEN_DIRS.contains(&name))
}

/// Null bytes in the first 8 KiB mark a file as binary. Unreadable files
/// count as binary so they are dropped early.
fn looks_binary(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return true;
    };
    let mut head = Vec::with_capacity(BINARY_CHECK_SIZE);
    if file
        .take(BINARY_CHECK_SIZE as u64)
        .read_to_end(&mut head)
        .is_err()
    {
        return true;
    }
    head.contains(&0)
}
