use std::path::Path;

use atlas_core::AtlasError;

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use atlas_repomap::language::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("tsx"), Language::Tsx);
/// assert_eq!(Language::from_extension("java"), Language::Java);
/// assert_eq!(Language::from_extension("c"), Language::C);
/// assert_eq!(Language::from_extension("cpp"), Language::Cpp);
/// assert_eq!(Language::from_extension("rb"), Language::Ruby);
/// assert_eq!(Language::from_extension("md"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Unknown,
}

impl Language {
    /// Every language with a grammar, in a stable order.
    pub const SUPPORTED: [Language; 10] = [
        Language::Rust,
        Language::Python,
        Language::TypeScript,
        Language::Tsx,
        Language::JavaScript,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Ruby,
    ];

    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a path's extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use atlas_repomap::language::Language;
    ///
    /// assert_eq!(Language::from_path(Path::new("src/app.ts")), Language::TypeScript);
    /// assert_eq!(Language::from_path(Path::new("Makefile")), Language::Unknown);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(Language::Unknown, Language::from_extension)
    }

    /// Short lowercase name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Unknown => "unknown",
        }
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }

    /// Source of the tags query whose captures are named
    /// `name.definition.*` and `name.reference.*`.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tags_query(&self) -> Option<&'static str> {
        match self {
            Language::Rust => Some(include_str!("../queries/rust-tags.scm")),
            Language::Python => Some(include_str!("../queries/python-tags.scm")),
            Language::TypeScript | Language::Tsx => {
                Some(include_str!("../queries/typescript-tags.scm"))
            }
            Language::JavaScript => Some(include_str!("../queries/javascript-tags.scm")),
            Language::Go => Some(include_str!("../queries/go-tags.scm")),
            Language::Java => Some(include_str!("../queries/java-tags.scm")),
            Language::C => Some(include_str!("../queries/c-tags.scm")),
            Language::Cpp => Some(include_str!("../queries/cpp-tags.scm")),
            Language::Ruby => Some(include_str!("../queries/ruby-tags.scm")),
            Language::Unknown => None,
        }
    }

    /// Compile this language's tags query against its grammar.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Parse`] if the language has no grammar or the
    /// query does not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use atlas_repomap::language::Language;
    ///
    /// assert!(Language::Go.compile_tags_query().is_ok());
    /// assert!(Language::Unknown.compile_tags_query().is_err());
    /// ```
    pub fn compile_tags_query(&self) -> Result<tree_sitter::Query, AtlasError> {
        let (Some(grammar), Some(source)) = (self.tree_sitter_language(), self.tags_query()) else {
            return Err(AtlasError::Parse(format!("no tags query for {}", self.name())));
        };
        tree_sitter::Query::new(&grammar, source)
            .map_err(|e| AtlasError::Parse(format!("invalid {} tags query: {e}", self.name())))
    }
}
