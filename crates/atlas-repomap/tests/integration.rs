//! Integration tests: walk → extract → rank → fit → render on real files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use atlas_core::{AtlasConfig, RenderConfig};
use atlas_repomap::cache::TagCache;
use atlas_repomap::fs::LocalFs;
use atlas_repomap::graph::{self, ReferenceGraph};
use atlas_repomap::tags::TagKind;
use atlas_repomap::tree::TreeRenderer;
use atlas_repomap::{MapRequest, RepoMap};

fn write(root: &Path, rel_path: &str, content: &str) -> PathBuf {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// `b.ts` defines `bar` so that its call to `foo` survives extraction.
fn ts_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function foo() {}\n");
    write(dir.path(), "b.ts", "function bar() {\n  foo();\n}\n");
    dir
}

#[test]
fn end_to_end_on_atlas_crates() {
    // The workspace's own crates directory
    let crates_dir = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap();

    let files = atlas_repomap::walker::walk_repo(crates_dir, &Default::default()).unwrap();
    assert!(
        files.paths.iter().filter(|p| p.extension().is_some_and(|e| e == "rs")).count() > 5,
        "should find multiple Rust files"
    );

    let mut repo_map = RepoMap::new(crates_dir, &AtlasConfig::default());
    let request = MapRequest {
        other_files: files.paths.clone(),
        ..MapRequest::default()
    };

    let ranked = repo_map.ranked_tags(&request);
    let names: HashSet<&str> = ranked.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains("AtlasError"), "should find AtlasError");
    assert!(ranked.iter().all(|t| t.kind == TagKind::Definition));

    let map = repo_map.get_repo_map(&request).unwrap();
    assert!(!map.is_empty());
    assert!(map.contains(".rs:"), "map should list Rust files");
    assert!(map.contains("Cargo.toml"), "manifests are always listed");
}

#[test]
fn referenced_file_ranks_first() {
    let dir = ts_repo();
    let root = dir.path();
    let mut cache = TagCache::new();
    let files: Vec<(String, _)> = ["a.ts", "b.ts"]
        .iter()
        .map(|rel| {
            let tags = cache.get_tags(&LocalFs, &root.join(rel), rel);
            (rel.to_string(), tags)
        })
        .collect();

    let graph = ReferenceGraph::build(&files, &HashSet::new());
    let edge = graph.edge("b.ts", "a.ts").expect("edge b.ts -> a.ts");
    assert_eq!(edge.identifier, "foo");
    assert!((edge.weight - 1.0).abs() < 1e-12);

    let scores = graph.pagerank(&HashSet::new());
    assert!(scores["a.ts"] > scores["b.ts"]);

    let none = HashSet::new();
    let ranked = graph::rank(&files, &none, &none, &none);
    assert_eq!(ranked[0].name, "foo");
    assert_eq!(ranked[0].rel_path, "a.ts");
    assert!(ranked.iter().any(|t| t.name == "bar" && t.rel_path == "b.ts"));
}

#[test]
fn reference_only_file_adds_no_edge() {
    // b.ts only calls foo; a file without definitions keeps no tags at all
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "a.ts", "export function foo() {}\n");
    write(root, "b.ts", "foo();\n");

    let mut cache = TagCache::new();
    let files: Vec<(String, _)> = ["a.ts", "b.ts"]
        .iter()
        .map(|rel| {
            let tags = cache.get_tags(&LocalFs, &root.join(rel), rel);
            (rel.to_string(), tags)
        })
        .collect();
    assert!(files[1].1.is_empty());

    let graph = ReferenceGraph::build(&files, &HashSet::new());
    assert!(graph.edge("b.ts", "a.ts").is_none());

    let none = HashSet::new();
    let ranked = graph::rank(&files, &none, &none, &none);
    let ranked: Vec<(&str, &str)> = ranked
        .iter()
        .map(|t| (t.rel_path.as_str(), t.name.as_str()))
        .collect();
    assert_eq!(ranked, vec![("a.ts", "foo")]);
}

#[test]
fn readme_is_listed_without_ranking() {
    let dir = ts_repo();
    let root = dir.path();
    write(root, "README.md", "# Demo\n");

    let mut repo_map = RepoMap::new(root, &AtlasConfig::default());
    let request = MapRequest {
        other_files: vec!["a.ts".into(), "b.ts".into(), "README.md".into()],
        ..MapRequest::default()
    };
    let map = repo_map.get_repo_map(&request).unwrap();

    assert!(map.contains("\nREADME.md\n"), "{map}");
    assert!(map.contains("a.ts:"), "{map}");
}

#[test]
fn chat_file_never_rendered_even_when_top_ranked() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "core.py", "def shared():\n    return 1\n");
    for i in 0..3 {
        write(
            root,
            &format!("user_{i}.py"),
            &format!("def use_{i}():\n    return shared()\n"),
        );
    }

    let mut repo_map = RepoMap::new(root, &AtlasConfig::default());
    let request = MapRequest {
        chat_files: vec!["core.py".into()],
        other_files: (0..3).map(|i| format!("user_{i}.py").into()).collect(),
        ..MapRequest::default()
    };
    let map = repo_map.get_repo_map(&request).unwrap();

    assert!(!map.contains("core.py"), "{map}");
    assert!(map.contains("user_0.py:"), "{map}");
}

#[test]
fn mentioned_identifier_pulls_its_definer_up() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "alpha.py", "def alpha():\n    return 1\n");
    write(root, "beta.py", "def beta():\n    return 2\n");
    write(
        root,
        "main.py",
        "def main():\n    alpha()\n    alpha()\n    beta()\n",
    );
    let request = |idents: &[&str]| MapRequest {
        other_files: vec!["alpha.py".into(), "beta.py".into(), "main.py".into()],
        mentioned_idents: idents.iter().map(|s| s.to_string()).collect(),
        ..MapRequest::default()
    };

    let mut repo_map = RepoMap::new(root, &AtlasConfig::default());
    let ranked = repo_map.ranked_tags(&request(&[]));
    assert_eq!(ranked[0].name, "alpha");

    let ranked = repo_map.ranked_tags(&request(&["beta"]));
    assert_eq!(ranked[0].name, "beta");
}

#[test]
fn hundred_line_file_is_elided_around_line_fifty() {
    let dir = tempfile::tempdir().unwrap();
    let source: String = (1..=100).map(|i| format!("value_{i} = {i}\n")).collect();
    let path = write(dir.path(), "values.py", &source);

    let mut renderer = TreeRenderer::new(RenderConfig::default());
    let out = renderer.render(&LocalFs, &path, "values.py", &[50]).unwrap();

    assert!(out.contains("█value_50 = 50"), "{out}");
    assert!(out.contains("│value_1 = 1"), "{out}");
    assert!(!out.contains("value_25 = 25"), "{out}");
    assert!(!out.contains("value_75 = 75"), "{out}");
    assert_eq!(out.matches("⋮...").count(), 2, "{out}");
}

#[test]
fn persisted_tag_cache_is_reused() {
    let dir = ts_repo();
    let root = dir.path();
    let cache_path = root.join(".atlas/tags.cache.json");
    let request = MapRequest {
        other_files: vec!["a.ts".into(), "b.ts".into()],
        ..MapRequest::default()
    };

    let mut first = RepoMap::new(root, &AtlasConfig::default());
    let map = first.get_repo_map(&request).unwrap();
    assert_eq!(first.tag_cache().extractions(), 2);
    first.tag_cache().save(&cache_path).unwrap();

    let mut second =
        RepoMap::new(root, &AtlasConfig::default()).with_tag_cache(TagCache::load(&cache_path));
    assert_eq!(second.get_repo_map(&request).unwrap(), map);
    assert_eq!(second.tag_cache().extractions(), 0);
}

#[test]
fn workflow_files_reach_the_map() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, ".github/workflows/ci.yml", "on: push\njobs: {}\n");
    write(root, "README.md", "# Demo\n");
    write(root, "a.py", "def foo():\n    return 1\n");
    write(root, "b.py", "def bar():\n    return foo()\n");

    let map = atlas_repomap::generate_map(root, &AtlasConfig::default())
        .unwrap()
        .unwrap();
    assert!(map.contains("\n.github/workflows/ci.yml\n"), "{map}");
    assert!(map.contains("\nREADME.md\n"), "{map}");
    assert!(map.contains("a.py:"), "{map}");
}

#[test]
fn generate_map_covers_whole_repository() {
    let dir = ts_repo();
    let map = atlas_repomap::generate_map(dir.path(), &AtlasConfig::default())
        .unwrap()
        .unwrap();
    assert!(map.contains("a.ts:"), "{map}");
    assert!(map.contains("b.ts:"), "{map}");
}
