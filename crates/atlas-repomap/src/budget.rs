use std::collections::HashSet;

use atlas_core::AtlasError;

use crate::fs::FileSystem;
use crate::tags::Tag;
use crate::tokens::estimate_tokens;
use crate::tree::{MapEntry, TreeRenderer};

/// Empirical tokens per rendered tag, used to seed the search.
const TOKENS_PER_TAG: usize = 25;

/// Relative error at which a candidate is accepted immediately.
const ACCEPTABLE_ERROR: f64 = 0.15;

/// Lowercased file-name fragments of files worth listing even when unranked.
const IMPORTANT_FILES: &[&str] = &[
    "readme",
    "package.json",
    "cargo.toml",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "gemfile",
    "makefile",
    "dockerfile",
    "tsconfig.json",
    "composer.json",
];

/// Returns `true` for project-level files that belong in every map.
///
/// # Examples
///
/// ```
/// use atlas_repomap::budget::is_important;
///
/// assert!(is_important("README.md"));
/// assert!(is_important("docs/readme.rst"));
/// assert!(is_important("crates/core/Cargo.toml"));
/// assert!(is_important(".github/workflows/ci.yml"));
/// assert!(!is_important("src/main.rs"));
/// ```
pub fn is_important(rel_path: &str) -> bool {
    let normalized = rel_path.replace('\\', "/");
    if normalized.starts_with(".github/workflows/") {
        return true;
    }
    let name = normalized
        .rsplit('/')
        .next()
        .unwrap_or(normalized.as_str())
        .to_lowercase();
    IMPORTANT_FILES.iter().any(|fragment| name.contains(fragment))
}

/// Path-only entries for important `other_files` that no ranked tag covers.
pub fn important_entries(ranked: &[Tag], other_files: &[String]) -> Vec<MapEntry> {
    let covered: HashSet<&str> = ranked.iter().map(|t| t.rel_path.as_str()).collect();
    let mut seen = HashSet::new();
    other_files
        .iter()
        .filter(|path| is_important(path) && !covered.contains(path.as_str()))
        .filter(|path| seen.insert(path.as_str()))
        .map(|path| MapEntry::File(path.clone()))
        .collect()
}

/// Selects how many leading entries of a ranked map fit a token budget.
///
/// Each probe renders a prefix of the entries through the [`TreeRenderer`]
/// and estimates its tokens; a binary search over the prefix length keeps
/// the best candidate.
pub struct BudgetFitter<'a> {
    renderer: &'a mut TreeRenderer,
    fs: &'a dyn FileSystem,
}

impl<'a> BudgetFitter<'a> {
    pub fn new(renderer: &'a mut TreeRenderer, fs: &'a dyn FileSystem) -> Self {
        Self { renderer, fs }
    }

    /// Render the largest useful prefix of `ranked` within `max_tokens`.
    ///
    /// Important files from `other_files` are listed first. A candidate is
    /// kept when it is under budget and larger than the best so far, or
    /// when it is within 15% of the budget, which also ends the search.
    /// Returns an empty string when no candidate qualifies.
    ///
    /// # Errors
    ///
    /// Propagates [`AtlasError::Overflow`] from rendering.
    pub fn fit(
        &mut self,
        ranked: Vec<Tag>,
        other_files: &[String],
        chat_files: &HashSet<String>,
        max_tokens: usize,
    ) -> Result<String, AtlasError> {
        if max_tokens == 0 {
            return Ok(String::new());
        }

        let mut entries = important_entries(&ranked, other_files);
        entries.extend(ranked.into_iter().map(MapEntry::Tag));

        self.renderer.clear_rendered();

        let budget = max_tokens as f64;
        let total = entries.len();
        let mut lower = 0usize;
        let mut upper = total;
        let mut middle = (max_tokens / TOKENS_PER_TAG).min(total);
        let mut best: Option<String> = None;
        let mut best_tokens = 0.0;

        while lower <= upper {
            let tree = self
                .renderer
                .to_tree(self.fs, &entries[..middle], chat_files)?;
            let tokens = estimate_tokens(&tree);
            let error = (tokens - budget).abs() / budget;
            tracing::debug!("budget probe: {middle}/{total} entries, {tokens:.0} tokens");

            if (tokens <= budget && tokens > best_tokens) || error < ACCEPTABLE_ERROR {
                best = Some(tree);
                best_tokens = tokens;
                if error < ACCEPTABLE_ERROR {
                    break;
                }
            }

            if tokens < budget {
                lower = middle + 1;
            } else {
                match middle.checked_sub(1) {
                    Some(next) => upper = next,
                    None => break,
                }
            }
            middle = (lower + upper) / 2;
        }

        Ok(best.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::RenderConfig;
    use std::path::Path;

    use crate::fs::LocalFs;
    use crate::tags::TagKind;

    fn definition(root: &Path, rel_path: &str, line: u32, name: &str) -> Tag {
        Tag {
            abs_path: root.join(rel_path),
            rel_path: rel_path.to_string(),
            line,
            name: name.to_string(),
            kind: TagKind::Definition,
        }
    }

    /// Writes `files` Python modules of ten functions each and returns their
    /// definitions in file order.
    fn synthetic_repo(root: &Path, files: usize) -> Vec<Tag> {
        let mut tags = Vec::new();
        for f in 0..files {
            let rel_path = format!("pkg/module_{f:03}.py");
            let mut source = String::new();
            for i in 0..10 {
                let name = format!("handler_{f}_{i}");
                tags.push(definition(root, &rel_path, (i * 3 + 1) as u32, &name));
                source.push_str(&format!(
                    "def {name}(request, context):\n    return process(request, context, {i})\n\n"
                ));
            }
            std::fs::create_dir_all(root.join("pkg")).unwrap();
            std::fs::write(root.join(&rel_path), source).unwrap();
        }
        tags
    }

    #[test]
    fn five_hundred_tags_converge_near_budget() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = synthetic_repo(dir.path(), 50);
        assert_eq!(ranked.len(), 500);

        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(ranked, &[], &HashSet::new(), 1000)
            .unwrap();

        let tokens = estimate_tokens(&map);
        let error = (tokens - 1000.0).abs() / 1000.0;
        assert!(error < ACCEPTABLE_ERROR, "estimated {tokens} tokens");
    }

    #[test]
    fn best_candidate_under_budget_wins_when_none_is_close() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("small.py"), "def tiny():\n    return 1\n").unwrap();
        let filler = "x".repeat(80);
        let mut big = String::new();
        let mut ranked = vec![definition(root, "small.py", 1, "tiny")];
        for i in 0..60 {
            big.push_str(&format!("def wide_{i:02}(): return \"{filler}\"\n"));
            ranked.push(definition(root, "big.py", i + 1, &format!("wide_{i:02}")));
        }
        std::fs::write(root.join("big.py"), big).unwrap();

        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let alone = renderer
            .to_tree(
                &LocalFs,
                &ranked[..1].iter().cloned().map(MapEntry::Tag).collect::<Vec<_>>(),
                &HashSet::new(),
            )
            .unwrap();
        let with_big = renderer
            .to_tree(
                &LocalFs,
                &ranked[..2].iter().cloned().map(MapEntry::Tag).collect::<Vec<_>>(),
                &HashSet::new(),
            )
            .unwrap();
        let budget = 30;
        assert!(estimate_tokens(&alone) < 0.85 * budget as f64, "{alone}");
        assert!(estimate_tokens(&with_big) > 1.15 * budget as f64, "{with_big}");

        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(ranked, &[], &HashSet::new(), budget)
            .unwrap();
        assert_eq!(map, alone);
    }

    #[test]
    fn small_repo_is_rendered_whole() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = synthetic_repo(dir.path(), 2);

        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(ranked, &[], &HashSet::new(), 100_000)
            .unwrap();

        assert!(map.contains("pkg/module_000.py:"), "{map}");
        assert!(map.contains("pkg/module_001.py:"), "{map}");
        assert!(map.contains("handler_1_9"), "{map}");
    }

    #[test]
    fn tiny_budget_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = synthetic_repo(dir.path(), 3);

        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(ranked, &[], &HashSet::new(), 1)
            .unwrap();
        assert_eq!(map, "");
    }

    #[test]
    fn zero_budget_yields_empty_map() {
        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(Vec::new(), &[], &HashSet::new(), 0)
            .unwrap();
        assert_eq!(map, "");
    }

    #[test]
    fn important_files_are_listed_before_ranked_tags() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = synthetic_repo(dir.path(), 1);
        let other = vec![
            "README.md".to_string(),
            "pkg/module_000.py".to_string(),
            "notes.txt".to_string(),
        ];

        let mut renderer = TreeRenderer::new(RenderConfig::default());
        let map = BudgetFitter::new(&mut renderer, &LocalFs)
            .fit(ranked, &other, &HashSet::new(), 10_000)
            .unwrap();

        assert!(map.starts_with("\nREADME.md\n"), "{map}");
        assert!(!map.contains("notes.txt"), "{map}");
    }

    #[test]
    fn covered_or_duplicate_important_files_are_not_repeated() {
        let root = Path::new("/repo");
        let ranked = vec![definition(root, "setup.py", 1, "setup")];
        let other = vec![
            "setup.py".to_string(),
            "Makefile".to_string(),
            "Makefile".to_string(),
        ];

        let entries = important_entries(&ranked, &other);
        assert_eq!(entries, vec![MapEntry::File("Makefile".into())]);
    }
}
