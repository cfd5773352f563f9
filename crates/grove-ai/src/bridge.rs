//! The seam between the enrichment scheduler and whatever answers its questions

use async_trait::async_trait;
use grove_core::{AiConfig, BlockKind, Language, RiskRecord, StructureAnalysis, SummaryContext};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse::{clean_summary, parse_risk, parse_structure};
use crate::prompt;
use crate::providers::{CompletionRequest, LlmProvider};

/// A summary paired with the root-relative path it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSummary {
    pub path: String,
    pub summary: String,
}

impl NamedSummary {
    pub fn new(path: impl Into<String>, summary: impl Into<String>) -> Self {
        Self { path: path.into(), summary: summary.into() }
    }
}

/// What a summary call is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "kebab-case")]
pub enum SummaryRequest {
    File {
        path: String,
        language: Language,
        context: SummaryContext,
    },
    Directory {
        path: String,
        file_summaries: Vec<NamedSummary>,
        subdirectory_summaries: Vec<NamedSummary>,
    },
    Project {
        file_summaries: Vec<NamedSummary>,
    },
}

impl SummaryRequest {
    /// File summaries are displayed inline and kept to one line.
    pub fn wants_single_line(&self) -> bool {
        matches!(self, SummaryRequest::File { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRequest {
    pub path: String,
    pub language: Language,
    pub content: String,
}

impl StructureRequest {
    pub fn line_count(&self) -> u32 {
        u32::try_from(self.content.lines().count()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub path: String,
    pub function: String,
    pub kind: BlockKind,
    pub line_start: u32,
    pub code: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Transport(String),

    #[error("analysis service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed analysis response: {reason}")]
    Malformed { reason: String },

    #[error("no API key configured for provider `{provider}`")]
    MissingApiKey { provider: String },

    #[error("unknown analysis provider `{0}`")]
    UnknownProvider(String),
}

impl AnalysisError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        AnalysisError::Malformed { reason: reason.into() }
    }
}

/// Anything that can answer the three enrichment questions.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, AnalysisError>;

    /// Must return a validated record; malformed answers are `Err(Malformed)`.
    async fn analyze_structure(&self, request: &StructureRequest) -> Result<StructureAnalysis, AnalysisError>;

    async fn analyze_risk(&self, request: &RiskRequest) -> Result<RiskRecord, AnalysisError>;

    fn name(&self) -> &str;
}

/// Prompted analysis over a text-completion provider.
pub struct LlmAnalyzer {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmAnalyzer {
    pub fn new(provider: Box<dyn LlmProvider>, config: &AiConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn complete(&self, system: &str, prompt: String, max_tokens: u32) -> Result<String, AnalysisError> {
        let request = CompletionRequest {
            system: system.to_string(),
            prompt,
            temperature: self.temperature,
            max_tokens: max_tokens.min(self.max_tokens),
        };
        self.provider.complete(&request).await.map_err(into_analysis_error)
    }
}

/// Providers return `anyhow` errors; typed failures they raised survive the trip.
fn into_analysis_error(err: anyhow::Error) -> AnalysisError {
    match err.downcast::<AnalysisError>() {
        Ok(typed) => typed,
        Err(other) => AnalysisError::Transport(format!("{other:#}")),
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, AnalysisError> {
        let max_tokens = if request.wants_single_line() { 120 } else { 400 };
        let text = self
            .complete(prompt::SUMMARY_SYSTEM, prompt::summary_prompt(request), max_tokens)
            .await?;

        let summary = clean_summary(&text, request.wants_single_line());
        if summary.is_empty() {
            return Err(AnalysisError::malformed("empty summary"));
        }
        Ok(summary)
    }

    async fn analyze_structure(&self, request: &StructureRequest) -> Result<StructureAnalysis, AnalysisError> {
        let text = self
            .complete(prompt::STRUCTURE_SYSTEM, prompt::structure_prompt(request), self.max_tokens)
            .await?;
        parse_structure(&text, request.line_count())
    }

    async fn analyze_risk(&self, request: &RiskRequest) -> Result<RiskRecord, AnalysisError> {
        let text = self
            .complete(prompt::RISK_SYSTEM, prompt::risk_prompt(request), 600)
            .await?;
        Ok(parse_risk(&text))
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
