use std::fmt::Write;

use atlas_core::{AtlasError, OutputFormat};
use serde::Serialize;

use crate::tokens::estimate_tokens;

/// A finished map with the figures reported alongside it.
///
/// # Examples
///
/// ```
/// use atlas_repomap::output::MapReport;
///
/// let report = MapReport::new("\nsrc/lib.rs:\n│pub fn run() {}\n".into(), 3);
/// assert_eq!(report.files, 3);
/// assert!(report.tokens > 0);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapReport {
    /// Estimated token count of `map`.
    pub tokens: usize,
    /// Number of candidate files the map was built from.
    pub files: usize,
    pub map: String,
}

impl MapReport {
    pub fn new(map: String, files: usize) -> Self {
        Self {
            tokens: estimate_tokens(&map).round() as usize,
            files,
            map,
        }
    }
}

/// Render `report` in the requested format.
///
/// # Errors
///
/// Returns [`AtlasError::Serialization`] if JSON encoding fails.
///
/// # Examples
///
/// ```
/// use atlas_core::OutputFormat;
/// use atlas_repomap::output::{format_report, MapReport};
///
/// let report = MapReport::new("\na.py:\n│def a():\n".into(), 1);
/// let text = format_report(&report, OutputFormat::Text).unwrap();
/// assert_eq!(text, "\na.py:\n│def a():\n");
/// ```
pub fn format_report(report: &MapReport, format: OutputFormat) -> Result<String, AtlasError> {
    match format {
        OutputFormat::Text => Ok(report.map.clone()),
        OutputFormat::Json => format_json(report),
        OutputFormat::Markdown => Ok(format_markdown(report)),
    }
}

/// Pretty-printed JSON with camelCase keys.
///
/// # Errors
///
/// Returns [`AtlasError::Serialization`] if serialization fails.
pub fn format_json(report: &MapReport) -> Result<String, AtlasError> {
    serde_json::to_string_pretty(report).map_err(AtlasError::from)
}

/// Markdown document with the map in a fenced block.
pub fn format_markdown(report: &MapReport) -> String {
    let mut out = String::new();
    out.push_str("# Repository Map\n\n");
    let _ = writeln!(
        out,
        "_{} files, ~{} tokens_\n",
        report.files, report.tokens
    );
    out.push_str("```text\n");
    out.push_str(report.map.trim_start_matches('\n'));
    if !report.map.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MapReport {
        MapReport::new("\nsrc/config.rs:\n│pub struct Config {\n⋮...\n".into(), 2)
    }

    #[test]
    fn json_output_uses_camel_case_fields() {
        let json = format_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["files"], 2);
        assert!(value["tokens"].as_u64().unwrap() > 0);
        assert!(value["map"].as_str().unwrap().contains("src/config.rs:"));
    }

    #[test]
    fn markdown_output_fences_the_map() {
        let md = format_markdown(&report());
        assert!(md.starts_with("# Repository Map\n\n"));
        assert!(md.contains("_2 files, ~"));
        assert!(md.contains("```text\nsrc/config.rs:\n│pub struct Config {\n⋮...\n```\n"));
    }

    #[test]
    fn empty_map_still_formats() {
        let empty = MapReport::new(String::new(), 0);
        assert_eq!(empty.tokens, 0);
        assert_eq!(format_report(&empty, OutputFormat::Text).unwrap(), "");
        assert!(format_markdown(&empty).ends_with("```text\n\n```\n"));
    }
}
