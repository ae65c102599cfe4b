//! Structural excerpts of a source file around a few lines of interest.
//!
//! A [`TreeContext`] indexes one file's syntax tree by line: which scopes
//! (multi-line nodes, identified by their start line) cover each line, which
//! nodes start on each line, and a short "header" range for every scope. An
//! excerpt is then grown from the lines of interest by revealing enclosing
//! scope headers, some child structure, the file's top and bottom, and
//! finally collapsing everything hidden into elision markers.

use std::collections::{BTreeSet, HashSet};

use atlas_core::{AtlasError, RenderConfig};
use tree_sitter::Parser;

use crate::language::Language;

/// Deepest chain of enclosing scopes followed before giving up.
const MAX_SCOPE_DEPTH: usize = 1024;

/// Scopes spanning fewer lines than this are shown whole as child context.
const SMALL_SCOPE_LINES: usize = 5;

const CHILD_CONTEXT_FRACTION: f64 = 0.10;
const CHILD_CONTEXT_MIN: f64 = 5.0;
const CHILD_CONTEXT_MAX: f64 = 25.0;

/// Elision marker when line numbers are hidden.
const ELISION: &str = "⋮...";

/// Elision marker when line numbers are shown.
const ELISION_NUMBERED: &str = "...⋮...";

/// Line range of one syntax node (0-based, inclusive).
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn size(&self) -> usize {
        self.end - self.start
    }
}

/// Line index of one parsed file. Immutable once built; every render call
/// keeps its own expansion state.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use atlas_core::RenderConfig;
/// use atlas_repomap::context::TreeContext;
/// use atlas_repomap::language::Language;
///
/// let source = "def outer():\n    x = 1\n    y = 2\n    return x + y\n";
/// let context = TreeContext::new(source, Language::Python, RenderConfig::default());
/// let excerpt = context.render(&BTreeSet::from([3])).unwrap();
/// assert!(excerpt.contains("█    return x + y"));
/// assert!(excerpt.contains("│def outer():"));
/// ```
pub struct TreeContext {
    lines: Vec<String>,
    /// `lines.len() + 1`: tree-sitter places the end of a file that ends in a
    /// newline on the line after the last one.
    num_lines: usize,
    spans: Vec<Span>,
    /// Preorder index of the last descendant of every node.
    subtree_end: Vec<usize>,
    /// Nodes starting on each line.
    nodes: Vec<Vec<usize>>,
    /// Start lines of every scope covering each line.
    scopes: Vec<BTreeSet<usize>>,
    /// Header range `[start, end)` of the scope starting on each line.
    headers: Vec<(usize, usize)>,
    options: RenderConfig,
}

impl TreeContext {
    /// Parse `source` and index it by line.
    ///
    /// Languages without a grammar, or sources that fail to parse, get an
    /// index with no scopes: excerpts then only show padded lines of
    /// interest and margins.
    pub fn new(source: &str, language: Language, options: RenderConfig) -> Self {
        let mut code = source.to_string();
        if !code.ends_with('\n') {
            code.push('\n');
        }
        let lines: Vec<String> = code.lines().map(str::to_string).collect();
        let num_lines = lines.len() + 1;

        let mut context = Self {
            lines,
            num_lines,
            spans: Vec::new(),
            subtree_end: Vec::new(),
            nodes: vec![Vec::new(); num_lines],
            scopes: vec![BTreeSet::new(); num_lines],
            headers: Vec::new(),
            options,
        };

        let mut header_candidates: Vec<Vec<Span>> = vec![Vec::new(); num_lines];
        if let Some(tree) = parse(&code, language) {
            context.index_tree(&tree, &mut header_candidates);
        }

        let header_max = context.options.header_max.max(1);
        context.headers = header_candidates
            .iter_mut()
            .enumerate()
            .map(|(line, candidates)| {
                candidates.sort_by_key(|span| (span.size(), span.end));
                match candidates.first() {
                    Some(span) => (line, line + span.size().min(header_max)),
                    None => (line, line + 1),
                }
            })
            .collect();

        context
    }

    fn index_tree(&mut self, tree: &tree_sitter::Tree, header_candidates: &mut [Vec<Span>]) {
        let last = self.num_lines - 1;
        let mut cursor = tree.walk();
        let mut open: Vec<usize> = Vec::new();

        'walk: loop {
            let node = cursor.node();
            let span = Span {
                start: node.start_position().row.min(last),
                end: node.end_position().row.min(last),
            };
            let id = self.spans.len();
            self.spans.push(span);
            self.subtree_end.push(id);
            self.nodes[span.start].push(id);
            if span.size() > 0 {
                header_candidates[span.start].push(span);
            }
            for line in span.start..=span.end {
                self.scopes[line].insert(span.start);
            }

            if cursor.goto_first_child() {
                open.push(id);
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
                if let Some(parent) = open.pop() {
                    self.subtree_end[parent] = self.spans.len() - 1;
                }
            }
        }
    }

    /// Number of source lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Render an excerpt around `lines_of_interest` (0-based line numbers).
    ///
    /// Returns an empty string when no line of interest is given.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Overflow`] if scopes nest deeper than the
    /// renderer can follow.
    pub fn render(&self, lines_of_interest: &BTreeSet<usize>) -> Result<String, AtlasError> {
        let lois: BTreeSet<usize> = lines_of_interest
            .iter()
            .copied()
            .filter(|&line| line < self.lines.len())
            .collect();
        if lois.is_empty() {
            return Ok(String::new());
        }

        let mut expansion = Expansion {
            context: self,
            show: lois.clone(),
            done: HashSet::new(),
        };
        expansion.expand(&lois)?;
        Ok(self.format(&expansion.show, &lois))
    }

    fn last_line_of_scope(&self, line: usize) -> usize {
        self.nodes[line]
            .iter()
            .map(|&id| self.spans[id].end)
            .max()
            .unwrap_or(line)
    }

    fn format(&self, show: &BTreeSet<usize>, lois: &BTreeSet<usize>) -> String {
        if show.is_empty() {
            return String::new();
        }

        let mut output = String::new();
        let mut dots = !show.contains(&0);
        for (i, line) in self.lines.iter().enumerate() {
            if !show.contains(&i) {
                if dots {
                    output.push_str(if self.options.line_numbers {
                        ELISION_NUMBERED
                    } else {
                        ELISION
                    });
                    output.push('\n');
                    dots = false;
                }
                continue;
            }

            let spacer = if self.options.mark_lois && lois.contains(&i) {
                '█'
            } else {
                '│'
            };
            if self.options.line_numbers {
                output.push_str(&format!("{:3}", i + 1));
            }
            output.push(spacer);
            output.push_str(line);
            output.push('\n');
            dots = true;
        }
        output
    }
}

fn parse(code: &str, language: Language) -> Option<tree_sitter::Tree> {
    let grammar = language.tree_sitter_language()?;
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        tracing::warn!("failed to load {} grammar: {e}", language.name());
        return None;
    }
    parser.parse(code, None)
}

/// Mutable state of one render: the growing set of shown lines.
struct Expansion<'a> {
    context: &'a TreeContext,
    show: BTreeSet<usize>,
    done: HashSet<usize>,
}

impl Expansion<'_> {
    fn expand(&mut self, lois: &BTreeSet<usize>) -> Result<(), AtlasError> {
        let ctx = self.context;
        let options = &ctx.options;

        if options.loi_pad > 0 {
            for &line in lois {
                let from = line.saturating_sub(options.loi_pad);
                let to = (line + options.loi_pad).min(ctx.num_lines - 1);
                self.show.extend(from..=to);
            }
        }

        if options.last_line {
            let bottom = ctx.num_lines.saturating_sub(2);
            self.show.insert(bottom);
            self.add_parent_scopes(bottom, 0)?;
        }

        if options.parent_context {
            for &line in lois {
                self.add_parent_scopes(line, 0)?;
            }
        }

        if options.child_context {
            for &line in lois {
                self.add_child_context(line)?;
            }
        }

        self.show.extend(0..options.margin.min(ctx.lines.len()));

        self.close_small_gaps();
        Ok(())
    }

    fn add_parent_scopes(&mut self, line: usize, depth: usize) -> Result<(), AtlasError> {
        if depth > MAX_SCOPE_DEPTH {
            return Err(AtlasError::Overflow(format!(
                "scope nesting deeper than {MAX_SCOPE_DEPTH} levels"
            )));
        }
        if !self.done.insert(line) {
            return Ok(());
        }
        let ctx = self.context;
        let Some(scopes) = ctx.scopes.get(line) else {
            return Ok(());
        };

        for &scope in scopes {
            let (head_start, head_end) = ctx.headers[scope];
            if head_start > 0 || ctx.options.show_top_of_file_parent_scope {
                self.show.extend(head_start..head_end);
            }
            if ctx.options.last_line {
                let last = ctx.last_line_of_scope(scope);
                self.add_parent_scopes(last, depth + 1)?;
            }
        }
        Ok(())
    }

    fn add_child_context(&mut self, line: usize) -> Result<(), AtlasError> {
        let ctx = self.context;
        if ctx.nodes[line].is_empty() {
            return Ok(());
        }

        let last = ctx.last_line_of_scope(line);
        let size = last - line;
        if size < SMALL_SCOPE_LINES {
            self.show.extend(line..=last);
            return Ok(());
        }

        let mut descendants: Vec<usize> = ctx.nodes[line]
            .iter()
            .flat_map(|&id| id..=ctx.subtree_end[id])
            .collect();
        descendants.sort_by_key(|&id| std::cmp::Reverse(ctx.spans[id].size()));

        let currently_showing = self.show.len() as f64;
        let max_to_show = (size as f64 * CHILD_CONTEXT_FRACTION)
            .min(CHILD_CONTEXT_MAX)
            .max(CHILD_CONTEXT_MIN);

        for id in descendants {
            if self.show.len() as f64 > currently_showing + max_to_show {
                break;
            }
            self.add_parent_scopes(ctx.spans[id].start, 0)?;
        }
        Ok(())
    }

    fn close_small_gaps(&mut self) {
        let ctx = self.context;
        let mut closed = self.show.clone();

        let shown: Vec<usize> = self.show.iter().copied().collect();
        for pair in shown.windows(2) {
            if pair[1] - pair[0] == 2 {
                closed.insert(pair[0] + 1);
            }
        }

        // Keep a blank line that directly follows shown code.
        for (i, line) in ctx.lines.iter().enumerate() {
            if !closed.contains(&i) || line.trim().is_empty() {
                continue;
            }
            if i + 2 < ctx.num_lines && ctx.lines[i + 1].trim().is_empty() {
                closed.insert(i + 1);
            }
        }

        self.show = closed;
    }
}
