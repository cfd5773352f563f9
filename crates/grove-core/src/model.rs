//! Core data structures for file and directory capsules

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Languages recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Json,
    Yaml,
    Toml,
    Markdown,
    Css,
    Html,
    Sql,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("py") | Some("pyi") => Language::Python,
            Some("rs") => Language::Rust,
            Some("go") => Language::Go,
            Some("java") => Language::Java,
            Some("c") | Some("h") => Language::C,
            Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Language::Cpp,
            Some("json") | Some("jsonc") => Language::Json,
            Some("yml") | Some("yaml") => Language::Yaml,
            Some("toml") => Language::Toml,
            Some("md") | Some("mdx") => Language::Markdown,
            Some("css") | Some("scss") | Some("less") => Language::Css,
            Some("html") | Some("htm") => Language::Html,
            Some("sql") => Language::Sql,
            _ => Language::Other,
        }
    }

    /// Whether this is program source (as opposed to data, docs, or markup).
    pub fn is_source(self) -> bool {
        matches!(
            self,
            Language::TypeScript
                | Language::JavaScript
                | Language::Python
                | Language::Rust
                | Language::Go
                | Language::Java
                | Language::C
                | Language::Cpp
        )
    }

    /// TypeScript and JavaScript share the import/export model the resolver understands.
    pub fn is_ecmascript(self) -> bool {
        matches!(self, Language::TypeScript | Language::JavaScript)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Markdown => "markdown",
            Language::Css => "css",
            Language::Html => "html",
            Language::Sql => "sql",
            Language::Other => "other",
        }
    }
}

/// How an import string was classified by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    /// Resolved to a file inside the scanned tree.
    Local,
    /// Third-party package.
    External,
    /// Platform built-in module (`fs`, `node:path`, ...).
    Builtin,
    /// Looked local (relative or aliased) but matched no scanned file.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntry {
    /// The raw import string as written in source.
    pub specifier: String,
    /// Imported binding names (`default`, `*`, or named imports).
    #[serde(default)]
    pub names: Vec<String>,
    pub kind: ImportKind,
    /// Absolute identity of the target when `kind` is `Local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    /// `export ... from` statements re-export what they import.
    #[serde(default)]
    pub reexport: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl ImportEntry {
    pub fn is_local(&self) -> bool {
        self.kind == ImportKind::Local && self.resolved.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    /// Name visible to importers.
    pub name: String,
    /// Local binding when exported under a different name (`export { a as b }`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl ExportEntry {
    /// Whether this entry exports the top-level binding `name`.
    pub fn exports(&self, name: &str) -> bool {
        self.name == name || self.local_name.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Constant,
    /// Interfaces, type aliases, and enums.
    Type,
}

/// A top-level declaration in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub exported: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetrics {
    pub lines: u32,
    pub import_count: u32,
    pub export_count: u32,
    pub symbol_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSignature {
    pub name: String,
    pub signature: String,
    pub line: u32,
}

/// Material handed to the summarizer. `used_by` and `depends_on` hold
/// root-relative paths and are filled in during graph assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    #[serde(default)]
    pub signatures: Vec<FunctionSignature>,
    #[serde(default)]
    pub preview: Vec<String>,
    #[serde(default)]
    pub used_by: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Function,
    Method,
    Class,
    Component,
    Hook,
    Constant,
    Type,
    #[serde(other)]
    Block,
}

impl BlockKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "function" | "fn" | "arrow" | "arrow_function" => BlockKind::Function,
            "method" => BlockKind::Method,
            "class" => BlockKind::Class,
            "component" | "react_component" => BlockKind::Component,
            "hook" => BlockKind::Hook,
            "constant" | "const" | "variable" => BlockKind::Constant,
            "type" | "interface" | "enum" => BlockKind::Type,
            _ => BlockKind::Block,
        }
    }
}

/// One named region of a file produced by structure analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    pub name: String,
    pub kind: BlockKind,
    pub line_start: u32,
    pub line_end: u32,
    pub summary: String,
    #[serde(default)]
    pub calls: Vec<String>,
    #[serde(default)]
    pub called_by: Vec<String>,
}

/// Narrative used when structure analysis exhausted its attempts.
pub const STRUCTURE_FALLBACK_SUMMARY: &str =
    "Analysis failed: the analysis service did not return a usable structure for this file.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureAnalysis {
    pub summary: String,
    pub blocks: Vec<CodeBlock>,
    /// Set on the fallback record stored after retries run out.
    #[serde(default)]
    pub failed: bool,
}

impl StructureAnalysis {
    pub fn fallback() -> Self {
        StructureAnalysis {
            summary: STRUCTURE_FALLBACK_SUMMARY.to_string(),
            blocks: Vec::new(),
            failed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
    /// The service answered in free text that carried no recognisable level.
    Unknown,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "no" | "safe" => RiskLevel::None,
            "low" | "minor" => RiskLevel::Low,
            "medium" | "moderate" => RiskLevel::Medium,
            "high" | "major" => RiskLevel::High,
            "critical" | "severe" => RiskLevel::Critical,
            _ => RiskLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskCategory {
    Security,
    Performance,
    ErrorHandling,
    Concurrency,
    Correctness,
    Maintainability,
    Other,
}

impl RiskCategory {
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "security" => RiskCategory::Security,
            "performance" => RiskCategory::Performance,
            "errorhandling" | "error" | "errors" => RiskCategory::ErrorHandling,
            "concurrency" | "race" | "racecondition" => RiskCategory::Concurrency,
            "correctness" | "bug" | "logic" => RiskCategory::Correctness,
            "maintainability" | "complexity" | "readability" => RiskCategory::Maintainability,
            _ => RiskCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRecord {
    pub level: RiskLevel,
    #[serde(default)]
    pub categories: Vec<RiskCategory>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl RiskRecord {
    /// Keep a free-text answer as a single issue.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        RiskRecord {
            level: RiskLevel::Unknown,
            categories: Vec::new(),
            issues: if text.is_empty() { Vec::new() } else { vec![text.to_string()] },
            recommendation: None,
        }
    }
}

/// Normalized metadata for one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCapsule {
    /// Absolute identity, stable for the lifetime of a scan.
    pub path: PathBuf,
    pub relative_path: String,
    pub name: String,
    #[serde(rename = "lang")]
    pub language: Language,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
    #[serde(default)]
    pub exports: Vec<ExportEntry>,
    #[serde(default)]
    pub top_symbols: Vec<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FileMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_context: Option<SummaryContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    // ── Enrichment results, filled in over time ─────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureAnalysis>,
    /// Risk findings keyed by code block name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub risks: BTreeMap<String, RiskRecord>,
}

impl FileCapsule {
    /// Number of source lines, when the file was read.
    pub fn lines(&self) -> u32 {
        self.metrics.as_ref().map_or(0, |m| m.lines)
    }

    /// Blocks from structure analysis that still lack a risk record.
    pub fn blocks_missing_risk(&self) -> impl Iterator<Item = &CodeBlock> {
        self.structure
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter(|b| !self.risks.contains_key(&b.name))
    }
}

/// One directory that contains files or is an ancestor of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryCapsule {
    pub path: PathBuf,
    pub relative_path: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub subdirectories: Vec<PathBuf>,
    pub file_count: u32,
    pub subdirectory_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Imports,
    /// `from` re-exports symbols of `to`.
    ExportsTo,
}

/// A directed dependency between two local files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub kind: EdgeKind,
    pub symbols: Vec<String>,
}
