use std::path::Path;
use std::time::SystemTime;

/// File access needed to build a map: modification times and text content.
///
/// Implementations must not panic. A missing or unreadable file is reported
/// as `None`, and the map treats it as contributing nothing.
pub trait FileSystem {
    /// Last modification time of `path`, or `None` if it cannot be stat'ed.
    fn modified(&self, path: &Path) -> Option<SystemTime>;

    /// Full UTF-8 content of `path`, or `None` if it cannot be read.
    fn read_text(&self, path: &Path) -> Option<String>;
}

/// [`FileSystem`] backed by `std::fs`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use atlas_repomap::fs::{FileSystem, LocalFs};
///
/// assert!(LocalFs.modified(Path::new("/definitely/not/here.rs")).is_none());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    fn read_text(&self, path: &Path) -> Option<String> {
        match std::fs::read(path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::warn!("cannot read {}: {e}", path.display());
                None
            }
        }
    }
}
