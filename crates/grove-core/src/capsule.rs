//! Capsule builder: scanned file + parsed metadata -> `FileCapsule`

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::*;

/// One file record as yielded by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub name: String,
    pub language: Language,
    pub content_hash: Option<String>,
    /// Set once the content has been read.
    pub line_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImport {
    pub specifier: String,
    pub names: Vec<String>,
    pub reexport: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExport {
    pub name: String,
    pub local_name: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSymbol {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
}

/// Parser output for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSource {
    pub imports: Vec<RawImport>,
    pub exports: Vec<RawExport>,
    pub functions: Vec<RawSymbol>,
    pub classes: Vec<RawSymbol>,
    pub constants: Vec<RawSymbol>,
    /// Interfaces, type aliases, enums.
    pub types: Vec<RawSymbol>,
    pub doc_comment: Option<String>,
    pub preview: Vec<String>,
    pub line_count: u32,
}

/// Build a capsule. `parsed` is `None` for files the parser does not handle;
/// those still get a capsule, with empty imports, exports, and symbols, and
/// only a line count for metrics.
pub fn build_capsule(file: SourceFile, parsed: Option<ParsedSource>) -> FileCapsule {
    let SourceFile { path, relative_path, name, language, content_hash, line_count } = file;

    let Some(parsed) = parsed else {
        return FileCapsule {
            path,
            relative_path,
            name,
            language,
            imports: Vec::new(),
            exports: Vec::new(),
            top_symbols: Vec::new(),
            metrics: line_count.map(|lines| FileMetrics { lines, ..FileMetrics::default() }),
            summary_context: None,
            content_hash,
            summary: None,
            structure: None,
            risks: BTreeMap::new(),
        };
    };

    let imports: Vec<ImportEntry> = parsed
        .imports
        .into_iter()
        .map(|raw| ImportEntry {
            kind: provisional_kind(&raw.specifier),
            specifier: raw.specifier,
            names: raw.names,
            resolved: None,
            reexport: raw.reexport,
            line: Some(raw.line),
        })
        .collect();

    let exports: Vec<ExportEntry> = parsed
        .exports
        .into_iter()
        .map(|raw| ExportEntry {
            name: raw.name,
            local_name: raw.local_name.filter(|l| !l.is_empty()),
            is_default: raw.is_default,
        })
        .collect();

    let mut top_symbols: Vec<Symbol> = [
        (SymbolKind::Function, &parsed.functions),
        (SymbolKind::Class, &parsed.classes),
        (SymbolKind::Constant, &parsed.constants),
        (SymbolKind::Type, &parsed.types),
    ]
    .into_iter()
    .flat_map(|(kind, symbols)| {
        symbols.iter().map(move |s| (kind, s))
    })
    .map(|(kind, s)| Symbol {
        name: s.name.clone(),
        kind,
        line_start: s.line_start,
        line_end: s.line_end.max(s.line_start),
        exported: exports.iter().any(|e| e.exports(&s.name)),
    })
    .collect();
    top_symbols.sort_by(|a, b| a.line_start.cmp(&b.line_start).then_with(|| a.name.cmp(&b.name)));

    let signatures = parsed
        .functions
        .iter()
        .filter_map(|f| {
            f.signature.as_ref().map(|sig| FunctionSignature {
                name: f.name.clone(),
                signature: sig.clone(),
                line: f.line_start,
            })
        })
        .collect();

    let metrics = FileMetrics {
        lines: parsed.line_count,
        import_count: imports.len() as u32,
        export_count: exports.len() as u32,
        symbol_count: top_symbols.len() as u32,
    };

    let summary_context = SummaryContext {
        doc_comment: parsed.doc_comment.filter(|d| !d.trim().is_empty()),
        signatures,
        preview: parsed.preview,
        used_by: Vec::new(),
        depends_on: Vec::new(),
    };

    FileCapsule {
        path,
        relative_path,
        name,
        language,
        imports,
        exports,
        top_symbols,
        metrics: Some(metrics),
        summary_context: Some(summary_context),
        content_hash,
        summary: None,
        structure: None,
        risks: BTreeMap::new(),
    }
}

/// Relative and aliased imports stay unresolved until the graph is assembled.
fn provisional_kind(specifier: &str) -> ImportKind {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("@/") || specifier.starts_with("~/") {
        ImportKind::Unresolved
    } else {
        ImportKind::External
    }
}

/// Hex SHA-256 of file content, recorded on the capsule for staleness checks.
pub fn compute_content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
