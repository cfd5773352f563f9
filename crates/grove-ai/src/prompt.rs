//! Prompt templates for enrichment calls

use grove_core::SummaryContext;

use crate::bridge::{NamedSummary, RiskRequest, StructureRequest, SummaryRequest};

pub const SUMMARY_SYSTEM: &str =
    "You are a senior engineer writing terse documentation for a code map. Answer with plain prose, no markdown.";

pub const STRUCTURE_SYSTEM: &str =
    "You are a code analysis expert. Break source files into their top-level blocks and answer with valid JSON only.";

pub const RISK_SYSTEM: &str =
    "You are a code reviewer looking for defects and security problems. Answer with valid JSON only.";

/// Cap on file summaries quoted in directory and project prompts.
const MAX_QUOTED_SUMMARIES: usize = 60;

pub fn summary_prompt(request: &SummaryRequest) -> String {
    match request {
        SummaryRequest::File { path, language, context } => file_summary_prompt(path, language.as_str(), context),
        SummaryRequest::Directory { path, file_summaries, subdirectory_summaries } => {
            directory_summary_prompt(path, file_summaries, subdirectory_summaries)
        }
        SummaryRequest::Project { file_summaries } => project_overview_prompt(file_summaries),
    }
}

fn file_summary_prompt(path: &str, language: &str, context: &SummaryContext) -> String {
    let mut sections = vec![format!("File: {path}\nLanguage: {language}")];

    if let Some(doc) = &context.doc_comment {
        sections.push(format!("Leading comment:\n{doc}"));
    }
    if !context.signatures.is_empty() {
        let signatures = context
            .signatures
            .iter()
            .map(|s| format!("- line {}: {}", s.line, s.signature))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Declarations:\n{signatures}"));
    }
    if !context.depends_on.is_empty() {
        sections.push(format!("Depends on: {}", context.depends_on.join(", ")));
    }
    if !context.used_by.is_empty() {
        sections.push(format!("Used by: {}", context.used_by.join(", ")));
    }
    if !context.preview.is_empty() {
        sections.push(format!("First lines:\n```\n{}\n```", context.preview.join("\n")));
    }

    format!(
        "{}\n\nDescribe what this file is for in ONE sentence of at most 25 words. \
         Do not repeat the file name.",
        sections.join("\n\n")
    )
}

fn directory_summary_prompt(path: &str, files: &[NamedSummary], subdirectories: &[NamedSummary]) -> String {
    let display = if path.is_empty() { "(project root)" } else { path };
    let mut sections = vec![format!("Directory: {display}")];

    if !files.is_empty() {
        sections.push(format!("Files:\n{}", bullet_list(files)));
    }
    if !subdirectories.is_empty() {
        sections.push(format!("Sub-directories:\n{}", bullet_list(subdirectories)));
    }

    format!(
        "{}\n\nSummarize the responsibility of this directory in one or two sentences.",
        sections.join("\n\n")
    )
}

fn project_overview_prompt(files: &[NamedSummary]) -> String {
    format!(
        "Here are one-line summaries of the files in a project:\n{}\n\n\
         Write a short overview (at most five sentences) of what the project does \
         and how its main parts fit together.",
        bullet_list(files)
    )
}

fn bullet_list(entries: &[NamedSummary]) -> String {
    let mut lines: Vec<String> = entries
        .iter()
        .take(MAX_QUOTED_SUMMARIES)
        .map(|e| format!("- {}: {}", e.path, e.summary))
        .collect();
    if entries.len() > MAX_QUOTED_SUMMARIES {
        lines.push(format!("- ... and {} more", entries.len() - MAX_QUOTED_SUMMARIES));
    }
    lines.join("\n")
}

/// Line numbers are prefixed so the model can cite exact ranges.
pub fn structure_prompt(request: &StructureRequest) -> String {
    let numbered = request
        .content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"File: {path}
Language: {language}

```
{numbered}
```

Identify the top-level functions, classes, components, hooks, constants, and types in this file.
Return a JSON object in exactly this format:
{{
  "summary": "two or three sentences describing the file",
  "blocks": [
    {{
      "name": "functionName",
      "kind": "function|method|class|component|hook|constant|type",
      "lineStart": 1,
      "lineEnd": 10,
      "summary": "what this block does",
      "calls": ["otherBlockName"]
    }}
  ]
}}"#,
        path = request.path,
        language = request.language.as_str(),
    )
}

pub fn risk_prompt(request: &RiskRequest) -> String {
    format!(
        r#"File: {path}
{kind:?} `{function}` starting at line {line}:

```
{code}
```

Assess the risk of this code. Return a JSON object:
{{
  "level": "none|low|medium|high|critical",
  "categories": ["security|performance|error-handling|concurrency|correctness|maintainability"],
  "issues": ["one short sentence per concrete problem"],
  "recommendation": "the single most useful fix"
}}"#,
        path = request.path,
        kind = request.kind,
        function = request.function,
        line = request.line_start,
        code = request.code,
    )
}
