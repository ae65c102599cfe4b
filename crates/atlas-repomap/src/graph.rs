use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::tags::Tag;

/// PageRank damping factor.
const DAMPING: f64 = 0.85;

/// Upper bound on power iterations.
const MAX_ITERATIONS: usize = 100;

/// Per-node convergence tolerance (summed over all nodes).
const TOLERANCE: f64 = 1.0e-6;

/// Weight multiplier for identifiers the caller mentioned.
const MENTIONED_WEIGHT: f64 = 2.0;

/// Weight multiplier for `_private` identifiers.
const PRIVATE_WEIGHT: f64 = 0.5;

/// Tags of one input file, keyed by its repository-relative path.
pub type FileTags = (String, Arc<Vec<Tag>>);

/// Edge annotation: the identifier that created the edge and its weight.
///
/// # Examples
///
/// ```
/// use atlas_repomap::graph::ReferenceEdge;
///
/// let edge = ReferenceEdge { identifier: "foo".into(), weight: 1.0 };
/// assert_eq!(edge.identifier, "foo");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEdge {
    pub identifier: String,
    pub weight: f64,
}

/// Weight of every edge created for `identifier`.
///
/// `base × sqrt(reference_count)`, where the base is 2 for mentioned
/// identifiers, 0.5 for identifiers starting with `_` and 1 otherwise.
///
/// # Examples
///
/// ```
/// use atlas_repomap::graph::edge_weight;
///
/// assert_eq!(edge_weight("helper", 4, false), 2.0);
/// assert_eq!(edge_weight("_helper", 4, false), 1.0);
/// assert_eq!(edge_weight("helper", 4, true), 4.0);
/// ```
pub fn edge_weight(identifier: &str, reference_count: usize, mentioned: bool) -> f64 {
    let base = if mentioned {
        MENTIONED_WEIGHT
    } else if identifier.starts_with('_') {
        PRIVATE_WEIGHT
    } else {
        1.0
    };
    base * (reference_count as f64).sqrt()
}

/// Directed file graph linked by identifier references, referencer → definer.
///
/// Only one edge exists per (referencer, definer) pair; the first identifier
/// (in sorted identifier order) that links them owns the edge.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use atlas_repomap::graph::ReferenceGraph;
/// use atlas_repomap::tags::{Tag, TagKind};
///
/// let tag = |path: &str, name: &str, kind| Tag {
///     abs_path: PathBuf::from(format!("/repo/{path}")),
///     rel_path: path.into(),
///     line: 1,
///     name: name.into(),
///     kind,
/// };
/// let files = vec![
///     ("a.ts".to_string(), Arc::new(vec![tag("a.ts", "foo", TagKind::Definition)])),
///     ("b.ts".to_string(), Arc::new(vec![tag("b.ts", "foo", TagKind::Reference)])),
/// ];
/// let graph = ReferenceGraph::build(&files, &HashSet::new());
/// assert_eq!(graph.edge("b.ts", "a.ts").unwrap().weight, 1.0);
/// ```
pub struct ReferenceGraph {
    graph: DiGraph<String, ReferenceEdge>,
    index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    /// Build the graph from the tags of every input file.
    ///
    /// Every file with at least one tag becomes a node. Tags with an empty
    /// path are skipped.
    pub fn build(files: &[FileTags], mentioned_idents: &HashSet<String>) -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        let mut definers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut referencers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (_, tags) in files {
            for tag in tags.iter() {
                if tag.rel_path.is_empty() {
                    tracing::warn!("skipping tag {:?} with an empty path", tag.name);
                    continue;
                }
                graph.node(&tag.rel_path);
                if tag.is_definition() {
                    definers
                        .entry(tag.name.as_str())
                        .or_default()
                        .insert(tag.rel_path.as_str());
                } else {
                    referencers
                        .entry(tag.name.as_str())
                        .or_default()
                        .push(tag.rel_path.as_str());
                }
            }
        }

        for (identifier, defined_in) in &definers {
            let Some(referenced_in) = referencers.get(identifier) else {
                continue;
            };
            let mentioned = mentioned_idents.contains(*identifier);
            let weight = edge_weight(identifier, referenced_in.len(), mentioned);

            for referencer in referenced_in {
                for definer in defined_in {
                    graph.add_edge(referencer, definer, identifier, weight);
                }
            }
        }

        graph
    }

    fn node(&mut self, path: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.index.insert(path.to_string(), idx);
        idx
    }

    fn add_edge(&mut self, from: &str, to: &str, identifier: &str, weight: f64) {
        let from_idx = self.node(from);
        let to_idx = self.node(to);
        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return;
        }
        self.graph.add_edge(
            from_idx,
            to_idx,
            ReferenceEdge {
                identifier: identifier.to_string(),
                weight,
            },
        );
    }

    /// Number of files in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of referencer → definer edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The edge from `from` to `to`, if one exists.
    pub fn edge(&self, from: &str, to: &str) -> Option<&ReferenceEdge> {
        let from_idx = *self.index.get(from)?;
        let to_idx = *self.index.get(to)?;
        let edge = self.graph.find_edge(from_idx, to_idx)?;
        self.graph.edge_weight(edge)
    }

    /// Weighted PageRank over the files (damping 0.85).
    ///
    /// `personalization` biases the restart distribution toward the given
    /// paths; when it names no node the restart distribution is uniform.
    /// Rank held by files without outgoing edges is redistributed along the
    /// restart distribution. Scores sum to 1.
    pub fn pagerank(&self, personalization: &HashSet<String>) -> HashMap<String, f64> {
        let n = self.graph.node_count();
        if n == 0 {
            return HashMap::new();
        }
        let n_f64 = n as f64;

        let mut restart = vec![0.0; n];
        for path in personalization {
            if let Some(idx) = self.index.get(path) {
                restart[idx.index()] = 1.0;
            }
        }
        let restart_total: f64 = restart.iter().sum();
        if restart_total > 0.0 {
            for r in &mut restart {
                *r /= restart_total;
            }
        } else {
            restart.fill(1.0 / n_f64);
        }

        let out_weight: Vec<f64> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges(idx).map(|e| e.weight().weight).sum())
            .collect();

        let mut ranks = vec![1.0 / n_f64; n];
        for iteration in 0..MAX_ITERATIONS {
            let dangling: f64 = ranks
                .iter()
                .zip(&out_weight)
                .filter(|(_, w)| **w <= 0.0)
                .map(|(r, _)| r)
                .sum();

            let mut next: Vec<f64> = restart
                .iter()
                .map(|p| (1.0 - DAMPING) * p + DAMPING * dangling * p)
                .collect();

            for idx in self.graph.node_indices() {
                let i = idx.index();
                if out_weight[i] <= 0.0 {
                    continue;
                }
                let share = DAMPING * ranks[i] / out_weight[i];
                for edge in self.graph.edges(idx) {
                    next[edge.target().index()] += share * edge.weight().weight;
                }
            }

            let delta: f64 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
            ranks = next;
            if delta < n_f64 * TOLERANCE {
                tracing::debug!("pagerank converged after {} iterations", iteration + 1);
                break;
            }
        }

        self.graph
            .node_indices()
            .map(|idx| (self.graph[idx].clone(), ranks[idx.index()]))
            .collect()
    }
}

/// Rank definition tags by the PageRank of the file that owns them.
///
/// With exactly one input file the graph is skipped and that file's tags are
/// returned unchanged. Otherwise files are visited by descending rank (ties
/// by path); chat files are skipped; each file contributes its definitions
/// grouped by identifier in first-seen order.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use atlas_repomap::graph::rank;
/// use atlas_repomap::tags::{Tag, TagKind};
///
/// let tag = |path: &str, name: &str, kind| Tag {
///     abs_path: PathBuf::from(format!("/repo/{path}")),
///     rel_path: path.into(),
///     line: 1,
///     name: name.into(),
///     kind,
/// };
/// let files = vec![
///     ("a.ts".to_string(), Arc::new(vec![tag("a.ts", "foo", TagKind::Definition)])),
///     ("b.ts".to_string(), Arc::new(vec![
///         tag("b.ts", "bar", TagKind::Definition),
///         tag("b.ts", "foo", TagKind::Reference),
///     ])),
/// ];
/// let none = HashSet::new();
/// let ranked = rank(&files, &none, &none, &none);
/// assert_eq!(ranked[0].name, "foo");
/// ```
pub fn rank(
    files: &[FileTags],
    chat_files: &HashSet<String>,
    mentioned_files: &HashSet<String>,
    mentioned_idents: &HashSet<String>,
) -> Vec<Tag> {
    if let [(_, tags)] = files {
        return tags.to_vec();
    }

    let graph = ReferenceGraph::build(files, mentioned_idents);
    tracing::debug!(
        "reference graph: {} files, {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    let personalization: HashSet<String> = chat_files.union(mentioned_files).cloned().collect();
    let scores = graph.pagerank(&personalization);

    let mut ordered: Vec<(&str, f64)> = scores.iter().map(|(p, r)| (p.as_str(), *r)).collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut definitions_by_file: HashMap<&str, Vec<&Tag>> = HashMap::new();
    for (_, tags) in files {
        for tag in tags.iter().filter(|t| t.is_definition()) {
            definitions_by_file
                .entry(tag.rel_path.as_str())
                .or_default()
                .push(tag);
        }
    }

    let mut ranked = Vec::new();
    for (path, _) in ordered {
        if chat_files.contains(path) {
            continue;
        }
        let Some(definitions) = definitions_by_file.get(path) else {
            continue;
        };

        let mut groups: Vec<(&str, Vec<&Tag>)> = Vec::new();
        let mut group_of: HashMap<&str, usize> = HashMap::new();
        for tag in definitions {
            match group_of.get(tag.name.as_str()) {
                Some(&i) => groups[i].1.push(tag),
                None => {
                    group_of.insert(tag.name.as_str(), groups.len());
                    groups.push((tag.name.as_str(), vec![tag]));
                }
            }
        }

        for (_, group) in groups {
            ranked.extend(group.into_iter().cloned());
        }
    }

    ranked
}
