use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use atlas_core::AtlasError;
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;
use crate::tags::{Tag, TagExtractor};

/// Tags extracted from one file, valid while the file's mtime is unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    mtime: SystemTime,
    tags: Arc<Vec<Tag>>,
}

/// Memoizes [`TagExtractor`] results per absolute path, keyed by mtime.
///
/// Entries are never evicted; the cache lives as long as its owner.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use atlas_repomap::cache::TagCache;
/// use atlas_repomap::fs::LocalFs;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("lib.py");
/// std::fs::write(&path, "def hello():\n    pass\n").unwrap();
///
/// let mut cache = TagCache::new();
/// let first = cache.get_tags(&LocalFs, &path, "lib.py");
/// let second = cache.get_tags(&LocalFs, &path, "lib.py");
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(cache.extractions(), 1);
/// ```
#[derive(Default)]
pub struct TagCache {
    extractor: TagExtractor,
    entries: HashMap<PathBuf, CacheEntry>,
    extractions: usize,
}

impl TagCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags for `abs_path`, re-extracted only when its mtime changed.
    ///
    /// Files that cannot be stat'ed yield an empty list and are not cached.
    pub fn get_tags(
        &mut self,
        fs: &dyn FileSystem,
        abs_path: &Path,
        rel_path: &str,
    ) -> Arc<Vec<Tag>> {
        let Some(mtime) = fs.modified(abs_path) else {
            tracing::warn!("file not found: {}", abs_path.display());
            return Arc::new(Vec::new());
        };

        if let Some(entry) = self.entries.get(abs_path) {
            if entry.mtime == mtime {
                return Arc::clone(&entry.tags);
            }
        }

        let tags = Arc::new(self.extractor.extract(fs, abs_path, rel_path));
        self.extractions += 1;
        self.entries.insert(
            abs_path.to_path_buf(),
            CacheEntry {
                mtime,
                tags: Arc::clone(&tags),
            },
        );
        tags
    }

    /// Number of times the extractor has run (cache misses).
    pub fn extractions(&self) -> usize {
        self.extractions
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load cached entries previously written by [`TagCache::save`].
    ///
    /// A missing or unreadable cache file gives an empty cache; stale entries
    /// are discarded lazily by the mtime check.
    ///
    /// # Examples
    ///
    /// ```
    /// use atlas_repomap::cache::TagCache;
    ///
    /// let cache = TagCache::load(std::path::Path::new("/no/such/cache.json"));
    /// assert!(cache.is_empty());
    /// ```
    pub fn load(path: &Path) -> Self {
        let mut cache = Self::new();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                tracing::warn!("unable to read tag cache {}: {e}", path.display());
                return cache;
            }
        };
        match serde_json::from_str::<HashMap<PathBuf, CacheEntry>>(&content) {
            Ok(entries) => {
                tracing::debug!("loaded {} cached files from {}", entries.len(), path.display());
                cache.entries = entries;
            }
            Err(e) => {
                tracing::warn!("discarding corrupt tag cache {}: {e}", path.display());
            }
        }
        cache
    }

    /// Write all cached entries to `path` as JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Io`] if the file cannot be written, or
    /// [`AtlasError::Serialization`] if encoding fails.
    pub fn save(&self, path: &Path) -> Result<(), AtlasError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::fs::LocalFs;

    /// In-memory file system with a controllable clock and a read counter.
    struct FakeFs {
        content: String,
        mtime: Cell<SystemTime>,
        reads: Cell<usize>,
    }

    impl FakeFs {
        fn new(content: &str) -> Self {
            Self {
                content: content.to_string(),
                mtime: Cell::new(SystemTime::UNIX_EPOCH),
                reads: Cell::new(0),
            }
        }

        fn touch(&self) {
            self.mtime
                .set(self.mtime.get() + std::time::Duration::from_secs(1));
        }
    }

    impl FileSystem for FakeFs {
        fn modified(&self, _path: &Path) -> Option<SystemTime> {
            Some(self.mtime.get())
        }

        fn read_text(&self, _path: &Path) -> Option<String> {
            self.reads.set(self.reads.get() + 1);
            Some(self.content.clone())
        }
    }

    #[test]
    fn unchanged_file_is_not_reparsed() {
        let fs = FakeFs::new("def a():\n    pass\n");
        let mut cache = TagCache::new();
        let path = Path::new("/repo/a.py");

        let first = cache.get_tags(&fs, path, "a.py");
        let second = cache.get_tags(&fs, path, "a.py");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.extractions(), 1);
        assert_eq!(fs.reads.get(), 1);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn touched_file_is_reextracted() {
        let fs = FakeFs::new("def a():\n    pass\n");
        let mut cache = TagCache::new();
        let path = Path::new("/repo/a.py");

        let first = cache.get_tags(&fs, path, "a.py");
        fs.touch();
        let second = cache.get_tags(&fs, path, "a.py");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.extractions(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TagCache::new();

        let tags = cache.get_tags(&LocalFs, &dir.path().join("nope.py"), "nope.py");
        assert!(tags.is_empty());
        assert!(cache.is_empty());
        assert_eq!(cache.extractions(), 0);
    }

    #[test]
    fn save_and_load_preserve_entries() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib.py");
        std::fs::write(&source, "def hello():\n    pass\n").unwrap();
        let cache_path = dir.path().join(".atlas/tags.cache.json");

        let mut cache = TagCache::new();
        cache.get_tags(&LocalFs, &source, "lib.py");
        cache.save(&cache_path).unwrap();

        let mut loaded = TagCache::load(&cache_path);
        assert_eq!(loaded.len(), 1);
        let tags = loaded.get_tags(&LocalFs, &source, "lib.py");
        assert_eq!(tags[0].name, "hello");
        assert_eq!(loaded.extractions(), 0, "loaded entry should be reused");
    }

    #[test]
    fn corrupt_cache_file_gives_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("tags.cache.json");
        std::fs::write(&cache_path, "{not json").unwrap();

        let cache = TagCache::load(&cache_path);
        assert!(cache.is_empty());
    }
}
