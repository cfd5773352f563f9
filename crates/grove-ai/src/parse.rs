//! Validation and coercion of free-form model output

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use grove_core::{BlockKind, CodeBlock, RiskCategory, RiskLevel, RiskRecord, StructureAnalysis};
use regex::Regex;
use serde_json::{Map, Value};

use crate::bridge::AnalysisError;

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").ok());

/// Pull a JSON object out of a model answer.
///
/// Tries a fenced code block first, then the whole text, then the span from
/// the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let fenced = FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str());

    let embedded = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    };

    [fenced, Some(text.trim()), embedded]
        .into_iter()
        .flatten()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(value) if value.is_object() => Some(value),
            _ => None,
        })
}

/// First present key among snake_case and camelCase spellings.
fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

fn as_line(value: Option<&Value>) -> Option<u32> {
    let line: u64 = match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(u32::try_from(line).unwrap_or(u32::MAX))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(o) => field(o, &["description", "issue", "name", "text"])
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Validate a structure answer against the file it describes.
///
/// `summary` and `blocks` are required, as are each block's name and start line.
/// Line ranges are clamped into the file, blocks are ordered by start line, and
/// `called_by` is completed from the other blocks' `calls`.
pub fn parse_structure(text: &str, line_count: u32) -> Result<StructureAnalysis, AnalysisError> {
    let value = extract_json(text).ok_or_else(|| AnalysisError::malformed("no JSON object in response"))?;
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisError::malformed("response is not an object"))?;

    let summary = field(object, &["summary", "fileSummary", "file_summary"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalysisError::malformed("missing `summary`"))?
        .to_string();

    let raw_blocks = field(object, &["blocks", "codeBlocks", "code_blocks"])
        .and_then(Value::as_array)
        .ok_or_else(|| AnalysisError::malformed("missing `blocks` array"))?;

    let last_line = line_count.max(1);
    let mut seen = HashSet::new();
    let mut blocks = Vec::with_capacity(raw_blocks.len());

    for (i, raw) in raw_blocks.iter().enumerate() {
        let block = raw
            .as_object()
            .ok_or_else(|| AnalysisError::malformed(format!("block {i} is not an object")))?;

        let name = block
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AnalysisError::malformed(format!("block {i} has no name")))?;

        let line_start = as_line(field(block, &["lineStart", "line_start", "startLine", "start_line", "start"]))
            .ok_or_else(|| AnalysisError::malformed(format!("block `{name}` has no start line")))?
            .clamp(1, last_line);
        let line_end = as_line(field(block, &["lineEnd", "line_end", "endLine", "end_line", "end"]))
            .unwrap_or(line_start)
            .clamp(line_start, last_line);

        // Risk results are keyed by block name.
        if !seen.insert(name.to_string()) {
            continue;
        }

        blocks.push(CodeBlock {
            name: name.to_string(),
            kind: block
                .get("kind")
                .or_else(|| block.get("type"))
                .and_then(Value::as_str)
                .map(BlockKind::parse)
                .unwrap_or(BlockKind::Block),
            line_start,
            line_end,
            summary: block
                .get("summary")
                .or_else(|| block.get("description"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            calls: string_list(block.get("calls")),
            called_by: string_list(field(block, &["calledBy", "called_by"])),
        });
    }

    blocks.sort_by_key(|b| (b.line_start, b.line_end));
    link_callers(&mut blocks);

    Ok(StructureAnalysis { summary, blocks, failed: false })
}

/// Mirror every `calls` edge between known blocks into the callee's `called_by`.
pub fn link_callers(blocks: &mut [CodeBlock]) {
    let mut callers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for block in blocks.iter() {
        for callee in &block.calls {
            if callee != &block.name {
                callers.entry(callee.clone()).or_default().push(block.name.clone());
            }
        }
    }

    for block in blocks.iter_mut() {
        if let Some(names) = callers.remove(&block.name) {
            block.called_by.extend(names);
        }
        block.called_by.sort();
        block.called_by.dedup();
    }
}

/// Risk answers never fail: anything that is not a usable JSON record is kept as text.
pub fn parse_risk(text: &str) -> RiskRecord {
    let Some(value) = extract_json(text) else {
        return RiskRecord::from_text(text);
    };
    let Some(object) = value.as_object() else {
        return RiskRecord::from_text(text);
    };
    let Some(level) = field(object, &["level", "riskLevel", "risk_level", "severity", "risk"]).and_then(Value::as_str)
    else {
        return RiskRecord::from_text(text);
    };

    let mut categories: Vec<RiskCategory> = Vec::new();
    for raw in string_list(field(object, &["categories", "category", "types", "type"])) {
        let category = RiskCategory::parse(&raw);
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    RiskRecord {
        level: RiskLevel::parse(level),
        categories,
        issues: string_list(field(object, &["issues", "findings", "problems"])),
        recommendation: field(object, &["recommendation", "fix", "suggestion"])
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

/// Strip fences, quotes, and label prefixes; optionally keep only the first line.
pub fn clean_summary(text: &str, single_line: bool) -> String {
    let mut body = text.trim();
    if let Some(inner) = FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(body))
        .and_then(|c| c.get(1))
    {
        body = inner.as_str().trim();
    }

    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let joined = if single_line {
        lines.first().copied().unwrap_or_default().to_string()
    } else {
        lines.join(" ")
    };

    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cleaned = strip_quotes(&collapsed);
    for prefix in ["Summary:", "summary:", "SUMMARY:", "Overview:"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim_start();
        }
    }
    strip_quotes(cleaned).to_string()
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim()
}
