//! Grammar selection and per-file metadata extraction

pub mod ecmascript;

use std::path::Path;

use grove_core::ParsedSource;
use tree_sitter::{Language, Parser};

/// Tree-sitter grammars the indexer parses with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Grammar {
    /// Pick a grammar by extension; `None` for files without one.
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "ts" | "mts" | "cts" => Some(Grammar::TypeScript),
            "tsx" => Some(Grammar::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Grammar::JavaScript),
            _ => None,
        }
    }

    pub fn language(self) -> Language {
        match self {
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Parse one file's content. Returns `None` when no grammar applies or the
/// parser gives up, so the caller builds an empty-metadata capsule instead.
pub fn parse_source(parser: &mut Parser, path: &Path, content: &str, preview_lines: usize) -> Option<ParsedSource> {
    let grammar = Grammar::for_path(path)?;

    if let Err(e) = parser.set_language(&grammar.language()) {
        tracing::warn!("Failed to set {:?} grammar for {}: {}", grammar, path.display(), e);
        return None;
    }

    let Some(tree) = parser.parse(content, None) else {
        tracing::warn!("Parser gave up on {}", path.display());
        return None;
    };

    if tree.root_node().has_error() {
        tracing::debug!("Syntax errors in {}; keeping what parsed", path.display());
    }

    Some(ecmascript::extract(&tree, content, preview_lines))
}
