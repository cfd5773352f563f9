//! Offline analyzer built from source heuristics
//!
//! Answers every enrichment question without a network call, so the whole
//! pipeline can run in demos, CI, and tests.

use std::sync::LazyLock;

use async_trait::async_trait;
use grove_core::{
    BlockKind, CodeBlock, RiskCategory, RiskLevel, RiskRecord, StructureAnalysis, SummaryContext,
};
use regex::Regex;

use crate::bridge::{AnalysisError, Analyzer, NamedSummary, RiskRequest, StructureRequest, SummaryRequest};
use crate::parse::link_callers;

/// Functions longer than this are flagged as hard to maintain.
const LONG_FUNCTION_LINES: u32 = 80;

static FUNCTION_DECL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)").ok()
});

static CLASS_DECL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)").ok()
});

static ARROW_DECL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)[^=]*=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)[^=]*=>",
    )
    .ok()
});

struct RiskPattern {
    regex: Option<Regex>,
    level: RiskLevel,
    category: RiskCategory,
    issue: &'static str,
    recommendation: &'static str,
}

fn pattern(
    source: &str,
    level: RiskLevel,
    category: RiskCategory,
    issue: &'static str,
    recommendation: &'static str,
) -> RiskPattern {
    RiskPattern { regex: Regex::new(source).ok(), level, category, issue, recommendation }
}

static RISK_PATTERNS: LazyLock<Vec<RiskPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"\beval\s*\(|\bnew\s+Function\s*\(",
            RiskLevel::High,
            RiskCategory::Security,
            "Evaluates dynamically built code",
            "Replace dynamic evaluation with explicit parsing or a lookup table",
        ),
        pattern(
            r"\.innerHTML\s*=|dangerouslySetInnerHTML",
            RiskLevel::High,
            RiskCategory::Security,
            "Writes raw HTML into the page",
            "Escape or sanitize the content before inserting it",
        ),
        pattern(
            r"\b(?:exec|execSync|spawn|spawnSync)\s*\(",
            RiskLevel::Medium,
            RiskCategory::Security,
            "Spawns shell commands",
            "Validate arguments and avoid passing user input to the shell",
        ),
        pattern(
            r"catch\s*(?:\([^)]*\))?\s*\{\s*\}",
            RiskLevel::Medium,
            RiskCategory::ErrorHandling,
            "Swallows errors in an empty catch block",
            "Log or propagate the caught error",
        ),
        pattern(
            r"\bconsole\.log\s*\(",
            RiskLevel::Low,
            RiskCategory::Maintainability,
            "Leaves console.log debugging output",
            "Remove the debug output or route it through a logger",
        ),
    ]
});

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAnalyzer;

impl LocalAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for LocalAnalyzer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, AnalysisError> {
        Ok(match request {
            SummaryRequest::File { language, context, .. } => file_summary(language.as_str(), context),
            SummaryRequest::Directory { path, file_summaries, subdirectory_summaries } => {
                directory_summary(path, file_summaries, subdirectory_summaries)
            }
            SummaryRequest::Project { file_summaries } => project_overview(file_summaries),
        })
    }

    async fn analyze_structure(&self, request: &StructureRequest) -> Result<StructureAnalysis, AnalysisError> {
        Ok(detect_structure(&request.content))
    }

    async fn analyze_risk(&self, request: &RiskRequest) -> Result<RiskRecord, AnalysisError> {
        Ok(assess_risk(&request.code))
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn first_sentence(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    match line.find(". ") {
        Some(end) => line[..=end].to_string(),
        None => line.to_string(),
    }
}

fn file_summary(language: &str, context: &SummaryContext) -> String {
    if let Some(doc) = context.doc_comment.as_deref().map(first_sentence).filter(|s| !s.is_empty()) {
        return doc;
    }

    let mut summary = if context.signatures.is_empty() {
        match context.preview.iter().map(|l| l.trim()).find(|l| !l.is_empty()) {
            Some(first) => format!("{language} file beginning with `{first}`"),
            None => format!("Empty {language} file"),
        }
    } else {
        let names: Vec<&str> = context.signatures.iter().take(3).map(|s| s.name.as_str()).collect();
        let mut text = format!("Defines {}", names.join(", "));
        if context.signatures.len() > names.len() {
            text.push_str(&format!(" and {} more", context.signatures.len() - names.len()));
        }
        text
    };

    match context.used_by.len() {
        0 => {}
        1 => summary.push_str("; used by 1 file"),
        n => summary.push_str(&format!("; used by {n} files")),
    }
    summary.push('.');
    summary
}

fn directory_summary(path: &str, files: &[NamedSummary], subdirectories: &[NamedSummary]) -> String {
    let name = path.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("Project root");
    let mut summary = format!(
        "{name} holds {} file{} and {} sub-director{}",
        files.len(),
        if files.len() == 1 { "" } else { "s" },
        subdirectories.len(),
        if subdirectories.len() == 1 { "y" } else { "ies" },
    );
    if let Some(first) = files.first().or(subdirectories.first()) {
        summary.push_str(&format!(", e.g. {}: {}", first.path, first.summary.trim_end_matches('.')));
    }
    summary.push('.');
    summary
}

fn project_overview(files: &[NamedSummary]) -> String {
    let mut top: Vec<&str> = files
        .iter()
        .filter_map(|f| f.path.split('/').next())
        .filter(|segment| !segment.is_empty())
        .collect();
    top.sort_unstable();
    top.dedup();

    format!(
        "Project of {} summarized file{} spread across {}.",
        files.len(),
        if files.len() == 1 { "" } else { "s" },
        if top.is_empty() { "the root".to_string() } else { top.join(", ") }
    )
}

fn declaration(line: &str) -> Option<(String, BlockKind)> {
    let capture = |re: &LazyLock<Option<Regex>>| {
        re.as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    if let Some(name) = capture(&CLASS_DECL) {
        return Some((name, BlockKind::Class));
    }
    let name = capture(&FUNCTION_DECL).or_else(|| capture(&ARROW_DECL))?;
    let kind = function_kind(&name);
    Some((name, kind))
}

fn function_kind(name: &str) -> BlockKind {
    let upper = |rest: &str| rest.starts_with(|c: char| c.is_ascii_uppercase());
    if name.strip_prefix("use").is_some_and(upper) {
        BlockKind::Hook
    } else if upper(name) {
        BlockKind::Component
    } else {
        BlockKind::Function
    }
}

/// Last line (1-based) of the block opening at `start` (0-based index).
fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i64 = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if (opened && depth <= 0) || (!opened && line.trim_end().ends_with(';')) {
            return i + 1;
        }
    }
    lines.len()
}

fn calls_name(body: &str, name: &str) -> bool {
    let needle = format!("{name}(");
    body.match_indices(&needle).any(|(at, _)| {
        !body[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
    })
}

/// Top-level declarations found by line patterns, with brace-matched extents.
pub fn detect_structure(content: &str) -> StructureAnalysis {
    let lines: Vec<&str> = content.lines().collect();
    let mut blocks = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some((name, kind)) = declaration(lines[i]) else {
            i += 1;
            continue;
        };
        let end = block_end(&lines, i);
        blocks.push(CodeBlock {
            summary: format!("{kind:?} `{name}` spanning {} lines", end - i),
            name,
            kind,
            line_start: (i + 1) as u32,
            line_end: end as u32,
            calls: Vec::new(),
            called_by: Vec::new(),
        });
        i = end.max(i + 1);
    }

    let names: Vec<String> = blocks.iter().map(|b| b.name.clone()).collect();
    for block in &mut blocks {
        // Skip the declaration line, which names the block itself.
        let body = lines[block.line_start as usize..block.line_end as usize].join("\n");
        block.calls = names
            .iter()
            .filter(|n| **n != block.name && calls_name(&body, n))
            .cloned()
            .collect();
    }
    link_callers(&mut blocks);

    let summary = if blocks.is_empty() {
        "No top-level functions or classes were found.".to_string()
    } else {
        let listed: Vec<&str> = blocks.iter().take(5).map(|b| b.name.as_str()).collect();
        format!(
            "{} top-level block{}: {}{}.",
            blocks.len(),
            if blocks.len() == 1 { "" } else { "s" },
            listed.join(", "),
            if blocks.len() > listed.len() { ", ..." } else { "" }
        )
    };

    StructureAnalysis { summary, blocks, failed: false }
}

/// Pattern-based findings; the level is the most severe finding.
pub fn assess_risk(code: &str) -> RiskRecord {
    let mut level = RiskLevel::None;
    let mut categories = Vec::new();
    let mut issues = Vec::new();
    let mut recommendation: Option<(RiskLevel, &str)> = None;

    let mut record = |found: RiskLevel, category: RiskCategory, issue: String, fix: &'static str| {
        level = level.max(found);
        if !categories.contains(&category) {
            categories.push(category);
        }
        issues.push(issue);
        if recommendation.is_none_or(|(current, _)| found > current) {
            recommendation = Some((found, fix));
        }
    };

    for p in RISK_PATTERNS.iter() {
        if p.regex.as_ref().is_some_and(|re| re.is_match(code)) {
            record(p.level, p.category, p.issue.to_string(), p.recommendation);
        }
    }

    let lines = code.lines().count() as u32;
    if lines > LONG_FUNCTION_LINES {
        record(
            RiskLevel::Low,
            RiskCategory::Maintainability,
            format!("Function is {lines} lines long"),
            "Split the function into smaller helpers",
        );
    }

    RiskRecord {
        level,
        categories,
        issues,
        recommendation: recommendation.map(|(_, fix)| fix.to_string()),
    }
}
