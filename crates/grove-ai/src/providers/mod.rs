//! LLM provider implementations

pub mod anthropic;
pub mod local;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use grove_core::AiConfig;

use crate::bridge::{AnalysisError, Analyzer, LlmAnalyzer};

/// One prompt/answer exchange with a text model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A text-completion backend.
///
/// Errors are `anyhow`; raise [`AnalysisError`] directly when the failure has a typed meaning.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn name(&self) -> &str;
}

/// Build the analyzer selected by `config.provider`.
pub fn create_analyzer(config: &AiConfig) -> std::result::Result<Arc<dyn Analyzer>, AnalysisError> {
    let provider: Box<dyn LlmProvider> = match config.provider.trim().to_ascii_lowercase().as_str() {
        "local" | "offline" => return Ok(Arc::new(local::LocalAnalyzer::new())),
        "openai" => Box::new(openai::OpenAiCompatible::new(&openai::OPENAI, config)?),
        "openrouter" => Box::new(openai::OpenAiCompatible::new(&openai::OPENROUTER, config)?),
        "gemini" => Box::new(openai::OpenAiCompatible::new(&openai::GEMINI, config)?),
        "anthropic" => Box::new(anthropic::AnthropicProvider::new(config)?),
        other => return Err(AnalysisError::UnknownProvider(other.to_string())),
    };

    tracing::info!("Using {} analysis provider", provider.name());
    Ok(Arc::new(LlmAnalyzer::new(provider, config)))
}

/// Explicit key first, then the provider's environment variable.
pub(crate) fn resolve_api_key(
    config: &AiConfig,
    env_var: &str,
    provider: &str,
) -> std::result::Result<String, AnalysisError> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|key| !key.trim().is_empty()))
        .ok_or_else(|| AnalysisError::MissingApiKey { provider: provider.to_string() })
}

pub(crate) fn http_client(config: &AiConfig) -> std::result::Result<reqwest::Client, AnalysisError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| AnalysisError::Transport(e.to_string()))
}

/// Turn a non-success response into a typed error.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AnalysisError::Http { status: status.as_u16(), body }.into())
}
