use std::path::PathBuf;

/// Errors that can occur while building a repository map.
///
/// Per-file problems (unsupported language, unreadable file, query failure)
/// never surface here: they are logged and the file contributes nothing.
/// Library crates use this type directly; it doubles as a `miette`
/// diagnostic so the binary can propagate it with `?`.
///
/// # Examples
///
/// ```
/// use atlas_core::AtlasError;
///
/// let err = AtlasError::Config("max_tokens must be positive".into());
/// assert!(err.to_string().contains("max_tokens"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AtlasError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(atlas::config), help("check .atlas.toml or run 'atlas init'"))]
    Config(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(atlas::toml))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(atlas::not_found))]
    FileNotFound(PathBuf),

    /// The map computation outgrew its structural limits (scope nesting too
    /// deep, sizes out of range). Disables mapping for the owning instance.
    #[error("repository map overflow: {0}")]
    Overflow(String),
}

impl AtlasError {
    /// Returns `true` for errors that should permanently disable mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// use atlas_core::AtlasError;
    ///
    /// assert!(AtlasError::Overflow("scope depth".into()).is_overflow());
    /// assert!(!AtlasError::Parse("bad query".into()).is_overflow());
    /// ```
    pub fn is_overflow(&self) -> bool {
        matches!(self, AtlasError::Overflow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AtlasError = io_err.into();
        assert!(err.to_string().contains("gone"));
        assert!(!err.is_overflow());
    }

    #[test]
    fn config_error_displays_message() {
        let err = AtlasError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = AtlasError::FileNotFound(PathBuf::from("/tmp/missing.rs"));
        assert!(err.to_string().contains("/tmp/missing.rs"));
    }

    #[test]
    fn overflow_displays_reason() {
        let err = AtlasError::Overflow("scope nesting deeper than 1024 levels".into());
        assert_eq!(
            err.to_string(),
            "repository map overflow: scope nesting deeper than 1024 levels"
        );
        assert!(err.is_overflow());
    }
}
