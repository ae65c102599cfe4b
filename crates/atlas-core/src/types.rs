use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When a previously computed map may be reused instead of recomputed.
///
/// # Examples
///
/// ```
/// use atlas_core::RefreshPolicy;
///
/// let policy: RefreshPolicy = "files".parse().unwrap();
/// assert_eq!(policy, RefreshPolicy::Files);
/// assert_eq!(RefreshPolicy::default(), RefreshPolicy::Auto);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Reuse cached maps once a computation has proven expensive.
    #[default]
    Auto,
    /// Keep returning the last map until a refresh is forced.
    Manual,
    /// Never reuse a cached map.
    Always,
    /// Reuse cached maps whenever the input file sets match.
    Files,
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPolicy::Auto => write!(f, "auto"),
            RefreshPolicy::Manual => write!(f, "manual"),
            RefreshPolicy::Always => write!(f, "always"),
            RefreshPolicy::Files => write!(f, "files"),
        }
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(RefreshPolicy::Auto),
            "manual" => Ok(RefreshPolicy::Manual),
            "always" => Ok(RefreshPolicy::Always),
            "files" => Ok(RefreshPolicy::Files),
            other => Err(format!("unknown refresh policy: {other}")),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use atlas_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The rendered map, as an LLM would see it.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
