use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::types::RefreshPolicy;

/// Top-level configuration loaded from `.atlas.toml`.
///
/// Supports layered resolution: CLI flags > local config > defaults.
///
/// # Examples
///
/// ```
/// use atlas_core::AtlasConfig;
///
/// let config = AtlasConfig::default();
/// assert_eq!(config.map.max_tokens, 1024);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Map budget and caching behavior.
    #[serde(default)]
    pub map: MapConfig,
    /// How file excerpts are rendered.
    #[serde(default)]
    pub render: RenderConfig,
    /// Which files are considered when walking a repository.
    #[serde(default)]
    pub walk: WalkConfig,
}

impl AtlasConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Io`] if the file cannot be read, or
    /// [`AtlasError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use atlas_core::AtlasConfig;
    /// use std::path::Path;
    ///
    /// let config = AtlasConfig::from_file(Path::new(".atlas.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, AtlasError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Toml`] if parsing fails, or
    /// [`AtlasError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use atlas_core::AtlasConfig;
    ///
    /// let toml = r#"
    /// [map]
    /// max_tokens = 2048
    /// "#;
    /// let config = AtlasConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.map.max_tokens, 2048);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, AtlasError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AtlasError> {
        if !self.map.map_multiplier_no_files.is_finite() || self.map.map_multiplier_no_files < 0.0
        {
            return Err(AtlasError::Config(format!(
                "map_multiplier_no_files must be a non-negative number, got {}",
                self.map.map_multiplier_no_files
            )));
        }
        if self.render.header_max == 0 {
            return Err(AtlasError::Config("header_max must be at least 1".into()));
        }
        Ok(())
    }
}

/// Token budget and refresh behavior of the repository map.
///
/// # Examples
///
/// ```
/// use atlas_core::{MapConfig, RefreshPolicy};
///
/// let config = MapConfig::default();
/// assert_eq!(config.max_tokens, 1024);
/// assert_eq!(config.map_multiplier_no_files, 8.0);
/// assert_eq!(config.refresh, RefreshPolicy::Auto);
/// assert!(config.max_context_window.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Target size of the map in tokens. Zero disables mapping.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Context window of the consuming model, used to cap budget expansion.
    pub max_context_window: Option<usize>,
    /// Budget multiplier applied when no files are already in focus.
    #[serde(default = "default_map_multiplier")]
    pub map_multiplier_no_files: f64,
    /// When previously computed maps may be reused.
    #[serde(default)]
    pub refresh: RefreshPolicy,
    /// Text placed before the map; `{other}` becomes `"other "` when chat
    /// files exist.
    pub repo_content_prefix: Option<String>,
    /// Report map sizes as they are computed.
    #[serde(default)]
    pub verbose: bool,
}

fn default_max_tokens() -> usize {
    1024
}

fn default_map_multiplier() -> f64 {
    8.0
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_context_window: None,
            map_multiplier_no_files: default_map_multiplier(),
            refresh: RefreshPolicy::default(),
            repo_content_prefix: None,
            verbose: false,
        }
    }
}

/// Options for expanding lines of interest into a file excerpt.
///
/// # Examples
///
/// ```
/// use atlas_core::RenderConfig;
///
/// let config = RenderConfig::default();
/// assert_eq!(config.loi_pad, 1);
/// assert_eq!(config.margin, 3);
/// assert_eq!(config.header_max, 10);
/// assert!(!config.line_numbers);
/// assert!(!config.show_top_of_file_parent_scope);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Prefix shown lines with their 1-based line number.
    #[serde(default)]
    pub line_numbers: bool,
    /// Mark lines of interest with a block character instead of a bar.
    #[serde(default = "default_true")]
    pub mark_lois: bool,
    /// Lines shown above and below every line of interest.
    #[serde(default = "default_loi_pad")]
    pub loi_pad: usize,
    /// Lines always shown at the top of the file.
    #[serde(default = "default_margin")]
    pub margin: usize,
    /// Longest header shown for an enclosing scope.
    #[serde(default = "default_header_max")]
    pub header_max: usize,
    /// Always show the last line of the file and its enclosing scopes.
    #[serde(default = "default_true")]
    pub last_line: bool,
    /// Show headers of scopes enclosing each line of interest.
    #[serde(default = "default_true")]
    pub parent_context: bool,
    /// Show bounded context from inside scopes starting at a line of interest.
    #[serde(default = "default_true")]
    pub child_context: bool,
    /// Allow scopes that start on the first line to reveal their header.
    /// The module scope starts there, so enabling this shows the first
    /// `header_max` lines of the file in every excerpt.
    #[serde(default)]
    pub show_top_of_file_parent_scope: bool,
}

fn default_true() -> bool {
    true
}

fn default_loi_pad() -> usize {
    1
}

fn default_margin() -> usize {
    3
}

fn default_header_max() -> usize {
    10
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            line_numbers: false,
            mark_lois: true,
            loi_pad: default_loi_pad(),
            margin: default_margin(),
            header_max: default_header_max(),
            last_line: true,
            parent_context: true,
            child_context: true,
            show_top_of_file_parent_scope: false,
        }
    }
}

/// File discovery settings.
///
/// # Examples
///
/// ```
/// use atlas_core::WalkConfig;
///
/// let config = WalkConfig::default();
/// assert!(config.exclude.is_empty());
/// assert_eq!(config.max_file_size, 1_048_576);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Glob patterns (relative to the repository root) to leave out of the map.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    1_048_576
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            max_file_size: default_max_file_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = AtlasConfig::default();
        assert_eq!(config.map.max_tokens, 1024);
        assert_eq!(config.map.map_multiplier_no_files, 8.0);
        assert_eq!(config.map.refresh, RefreshPolicy::Auto);
        assert!(config.map.repo_content_prefix.is_none());
        assert!(!config.map.verbose);
        assert!(config.render.mark_lois);
        assert!(config.render.child_context);
        assert!(config.walk.exclude.is_empty());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[map]
max_tokens = 4096
refresh = "files"
"#;
        let config = AtlasConfig::from_toml(toml).unwrap();
        assert_eq!(config.map.max_tokens, 4096);
        assert_eq!(config.map.refresh, RefreshPolicy::Files);
        assert_eq!(config.map.map_multiplier_no_files, 8.0);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[map]
max_tokens = 2048
max_context_window = 128000
map_multiplier_no_files = 2.0
refresh = "manual"
repo_content_prefix = "Here are summaries of some {other}files:\n"
verbose = true

[render]
line_numbers = true
mark_lois = false
loi_pad = 0
margin = 0
header_max = 5

[walk]
exclude = ["vendor/**", "*.min.js"]
max_file_size = 2048
"#;
        let config = AtlasConfig::from_toml(toml).unwrap();
        assert_eq!(config.map.max_context_window, Some(128_000));
        assert_eq!(config.map.map_multiplier_no_files, 2.0);
        assert_eq!(config.map.refresh, RefreshPolicy::Manual);
        assert!(config
            .map
            .repo_content_prefix
            .as_deref()
            .unwrap()
            .contains("{other}"));
        assert!(config.map.verbose);
        assert!(config.render.line_numbers);
        assert!(!config.render.mark_lois);
        assert_eq!(config.render.loi_pad, 0);
        assert_eq!(config.render.header_max, 5);
        assert!(config.render.last_line);
        assert_eq!(config.walk.exclude, vec!["vendor/**", "*.min.js"]);
        assert_eq!(config.walk.max_file_size, 2048);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = AtlasConfig::from_toml("").unwrap();
        assert_eq!(config.map.max_tokens, 1024);
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn top_of_file_scope_is_opt_in() {
        let config = AtlasConfig::from_toml("[render]\nmargin = 1\n").unwrap();
        assert!(!config.render.show_top_of_file_parent_scope);

        let config =
            AtlasConfig::from_toml("[render]\nshow_top_of_file_parent_scope = true\n").unwrap();
        assert!(config.render.show_top_of_file_parent_scope);
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = AtlasConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(AtlasError::Toml(_))));
    }

    #[test]
    fn negative_multiplier_is_rejected() {
        let toml = r#"
[map]
map_multiplier_no_files = -1.0
"#;
        let result = AtlasConfig::from_toml(toml);
        assert!(matches!(result, Err(AtlasError::Config(_))));
    }

    #[test]
    fn zero_header_max_is_rejected() {
        let toml = r#"
[render]
header_max = 0
"#;
        assert!(AtlasConfig::from_toml(toml).is_err());
    }
}
