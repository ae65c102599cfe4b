use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use atlas_core::{AtlasConfig, AtlasError, MapConfig, RefreshPolicy};

use crate::budget::BudgetFitter;
use crate::cache::TagCache;
use crate::fs::{FileSystem, LocalFs};
use crate::graph::{self, FileTags};
use crate::tags::Tag;
use crate::tokens::estimate_tokens;
use crate::tree::TreeRenderer;

/// Tokens kept free of the context window when the budget is expanded.
const CONTEXT_WINDOW_PADDING: usize = 4096;

/// Under [`RefreshPolicy::Auto`], maps slower than this are cached.
const AUTO_CACHE_THRESHOLD: Duration = Duration::from_secs(1);

/// Placeholder in the content prefix replaced by `"other "` when chat files exist.
const OTHER_PLACEHOLDER: &str = "{other}";

/// Inputs of one map request.
///
/// Paths may be absolute or relative to the repository root. Mentioned files
/// are repository-relative paths.
#[derive(Debug, Clone, Default)]
pub struct MapRequest {
    /// Files already open in the consumer; ranked but never rendered.
    pub chat_files: Vec<PathBuf>,
    /// Candidate files for the map.
    pub other_files: Vec<PathBuf>,
    /// Files to bias the ranking toward.
    pub mentioned_files: HashSet<String>,
    /// Identifiers whose edges get extra weight.
    pub mentioned_idents: HashSet<String>,
    /// Bypass every cached map.
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MapKey {
    chat_files: Vec<String>,
    other_files: Vec<String>,
    max_tokens: usize,
    mentioned: Option<(Vec<String>, Vec<String>)>,
}

fn sorted<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut items: Vec<String> = items.into_iter().cloned().collect();
    items.sort();
    items.dedup();
    items
}

/// Repository map generator for one repository.
///
/// Owns the tag cache, the render caches and the map cache; all of them live
/// as long as the instance.
///
/// # Examples
///
/// ```
/// use atlas_core::AtlasConfig;
/// use atlas_repomap::repomap::{MapRequest, RepoMap};
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
/// std::fs::write(dir.path().join("b.py"), "def bar():\n    return foo()\n").unwrap();
///
/// let mut repo_map = RepoMap::new(dir.path(), &AtlasConfig::default());
/// let request = MapRequest {
///     other_files: vec!["a.py".into(), "b.py".into()],
///     ..MapRequest::default()
/// };
/// let map = repo_map.get_repo_map(&request).unwrap();
/// assert!(map.contains("a.py:"));
/// ```
pub struct RepoMap<F: FileSystem = LocalFs> {
    root: PathBuf,
    fs: F,
    config: MapConfig,
    max_tokens: usize,
    tags: TagCache,
    renderer: TreeRenderer,
    map_cache: HashMap<MapKey, String>,
    last_map: Option<String>,
    last_duration: Duration,
}

impl RepoMap<LocalFs> {
    /// Create a generator over the local file system.
    pub fn new(root: &Path, config: &AtlasConfig) -> Self {
        Self::with_fs(root, LocalFs, config)
    }
}

impl<F: FileSystem> RepoMap<F> {
    /// Create a generator reading files through `fs`.
    pub fn with_fs(root: &Path, fs: F, config: &AtlasConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            fs,
            config: config.map.clone(),
            max_tokens: config.map.max_tokens,
            tags: TagCache::new(),
            renderer: TreeRenderer::new(config.render.clone()),
            map_cache: HashMap::new(),
            last_map: None,
            last_duration: Duration::ZERO,
        }
    }

    /// Start from a previously persisted tag cache.
    pub fn with_tag_cache(mut self, tags: TagCache) -> Self {
        self.tags = tags;
        self
    }

    pub fn tag_cache(&self) -> &TagCache {
        &self.tags
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Current token budget; zero once the map has been disabled.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Build the map for `request`.
    ///
    /// Returns `None` when the budget is zero, when there are no candidate
    /// files, or after the map was disabled by an overflow. `Some("")`
    /// means the map was computed but nothing fit.
    pub fn get_repo_map(&mut self, request: &MapRequest) -> Option<String> {
        if self.max_tokens == 0 || request.other_files.is_empty() {
            return None;
        }

        let has_chat_files = !request.chat_files.is_empty();
        let max_tokens = self.effective_budget(has_chat_files);

        let listing = match self.ranked_tags_map(request, max_tokens) {
            Ok(listing) => listing,
            Err(e) => {
                self.disable_on_error(e);
                return None;
            }
        };
        if listing.is_empty() {
            return Some(listing);
        }

        if self.config.verbose {
            let tokens = estimate_tokens(&listing);
            tracing::info!("repo map: {:.1} k-tokens", tokens / 1024.0);
        }

        let other = if has_chat_files { "other " } else { "" };
        let prefix = self
            .config
            .repo_content_prefix
            .as_deref()
            .map(|p| p.replace(OTHER_PLACEHOLDER, other))
            .unwrap_or_default();
        Some(prefix + &listing)
    }

    /// Definition tags ranked for `request`, chat files excluded.
    pub fn ranked_tags(&mut self, request: &MapRequest) -> Vec<Tag> {
        let chat: Vec<PathBuf> = request.chat_files.iter().map(|p| self.abs_path(p)).collect();
        let other: Vec<PathBuf> = request.other_files.iter().map(|p| self.abs_path(p)).collect();

        let mut all: Vec<&PathBuf> = chat.iter().chain(other.iter()).collect();
        all.sort();
        all.dedup();

        let mut files: Vec<FileTags> = Vec::with_capacity(all.len());
        for abs in all {
            let rel = relative_to(&self.root, abs);
            let tags = self.tags.get_tags(&self.fs, abs, &rel);
            files.push((rel, tags));
        }

        let chat_rel: HashSet<String> = chat.iter().map(|p| self.rel_path(p)).collect();
        graph::rank(
            &files,
            &chat_rel,
            &request.mentioned_files,
            &request.mentioned_idents,
        )
    }

    /// Budget for one request: expanded when nothing is open and a context
    /// window is configured.
    fn effective_budget(&self, has_chat_files: bool) -> usize {
        let Some(window) = self.config.max_context_window else {
            return self.max_tokens;
        };
        let expanded = (self.max_tokens as f64 * self.config.map_multiplier_no_files) as usize;
        let target = expanded.min(window.saturating_sub(CONTEXT_WINDOW_PADDING));
        if !has_chat_files && target > 0 {
            target
        } else {
            self.max_tokens
        }
    }

    fn ranked_tags_map(
        &mut self,
        request: &MapRequest,
        max_tokens: usize,
    ) -> Result<String, AtlasError> {
        let chat_rel = sorted(
            &request
                .chat_files
                .iter()
                .map(|p| self.rel_path(&self.abs_path(p)))
                .collect::<Vec<_>>(),
        );
        let other_rel = sorted(
            &request
                .other_files
                .iter()
                .map(|p| self.rel_path(&self.abs_path(p)))
                .collect::<Vec<_>>(),
        );

        let policy = self.config.refresh;
        let key = MapKey {
            chat_files: chat_rel.clone(),
            other_files: other_rel.clone(),
            max_tokens,
            mentioned: (policy == RefreshPolicy::Auto).then(|| {
                (
                    sorted(&request.mentioned_files),
                    sorted(&request.mentioned_idents),
                )
            }),
        };

        if !request.force_refresh {
            if policy == RefreshPolicy::Manual {
                if let Some(map) = &self.last_map {
                    tracing::debug!("reusing last map (manual refresh)");
                    return Ok(map.clone());
                }
            }
            let use_cache = match policy {
                RefreshPolicy::Always | RefreshPolicy::Manual => false,
                RefreshPolicy::Files => true,
                RefreshPolicy::Auto => self.last_duration > AUTO_CACHE_THRESHOLD,
            };
            if use_cache {
                if let Some(map) = self.map_cache.get(&key) {
                    tracing::debug!("map cache hit");
                    return Ok(map.clone());
                }
            }
        }

        let started = Instant::now();
        let ranked = self.ranked_tags(request);
        let chat_set: HashSet<String> = chat_rel.into_iter().collect();
        let map = BudgetFitter::new(&mut self.renderer, &self.fs).fit(
            ranked,
            &other_rel,
            &chat_set,
            max_tokens,
        )?;
        self.last_duration = started.elapsed();
        tracing::debug!("map computed in {:?}", self.last_duration);

        self.map_cache.insert(key, map.clone());
        self.last_map = Some(map.clone());
        Ok(map)
    }

    fn disable_on_error(&mut self, error: AtlasError) {
        if error.is_overflow() {
            tracing::error!("disabling repo map, repository too large? ({error})");
            self.max_tokens = 0;
        } else {
            tracing::error!("repo map failed: {error}");
        }
    }

    fn abs_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn rel_path(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }
}

/// `path` relative to `root` with `/` separators; paths outside `root` are
/// kept whole.
fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
