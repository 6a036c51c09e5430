//! Language detection and tree-sitter grammar registry.

use std::path::Path;

/// Languages the chunker understands.
///
/// Source languages are chunked structurally when their grammar feature is
/// enabled; prose is split into text blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Markdown,
    PlainText,
}

impl Lang {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
            Self::Markdown => "markdown",
            Self::PlainText => "text",
        }
    }

    #[must_use]
    pub fn is_prose(self) -> bool {
        matches!(self, Self::Markdown | Self::PlainText)
    }

    /// Get the tree-sitter grammar. Returns `None` for prose and for
    /// languages whose feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-js")]
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Sibling kinds that attach to the unit directly below them.
    #[must_use]
    pub(crate) fn leading_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["line_comment", "block_comment", "attribute_item"],
            Self::Python | Self::JavaScript | Self::TypeScript | Self::Tsx | Self::Go => {
                &["comment"]
            }
            Self::Markdown | Self::PlainText => &[],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "mts" | "cts" => Some(Lang::TypeScript),
        "tsx" => Some(Lang::Tsx),
        "go" => Some(Lang::Go),
        "md" | "mdx" | "markdown" => Some(Lang::Markdown),
        "txt" | "rst" | "adoc" => Some(Lang::PlainText),
        _ => None,
    }
}

/// Whether the file takes part in indexing at all.
///
/// Source files without an enabled grammar are still indexed through the
/// whole-file fallback.
#[must_use]
pub fn is_indexable(path: &Path) -> bool {
    detect_language(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_language_by_extension() {
        assert_eq!(detect_language(Path::new("src/main.rs")), Some(Lang::Rust));
        assert_eq!(detect_language(Path::new("app.py")), Some(Lang::Python));
        assert_eq!(detect_language(Path::new("a/b.mjs")), Some(Lang::JavaScript));
        assert_eq!(detect_language(Path::new("a/b.cts")), Some(Lang::TypeScript));
        assert_eq!(detect_language(Path::new("view.tsx")), Some(Lang::Tsx));
        assert_eq!(detect_language(Path::new("main.go")), Some(Lang::Go));
        assert_eq!(detect_language(Path::new("README.MD")), Some(Lang::Markdown));
        assert_eq!(detect_language(Path::new("notes.txt")), Some(Lang::PlainText));
    }

    #[test]
    fn unknown_extensions_are_skipped() {
        assert_eq!(detect_language(Path::new("logo.png")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
        assert!(!is_indexable(Path::new("Cargo.lock")));
    }

    #[test]
    fn prose_has_no_grammar() {
        assert!(Lang::Markdown.is_prose());
        assert!(Lang::Markdown.grammar().is_none());
        assert!(!Lang::Rust.is_prose());
    }

    #[cfg(feature = "lang-js")]
    #[test]
    fn typescript_grammar_available() {
        assert!(Lang::TypeScript.grammar().is_some());
        assert!(Lang::Tsx.grammar().is_some());
    }

    #[test]
    fn display_uses_id() {
        assert_eq!(Lang::Tsx.to_string(), "tsx");
    }
}
