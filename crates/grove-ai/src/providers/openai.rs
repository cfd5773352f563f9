//! OpenAI-compatible chat completions (OpenAI, OpenRouter, Gemini)

use anyhow::{Context, Result};
use async_trait::async_trait;
use grove_core::AiConfig;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, LlmProvider, check_status, http_client, resolve_api_key};
use crate::bridge::AnalysisError;

/// Endpoint defaults for one OpenAI-compatible service.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub api_key_env: &'static str,
    pub default_model: &'static str,
}

pub const OPENAI: Preset = Preset {
    name: "openai",
    base_url: "https://api.openai.com/v1",
    api_key_env: "OPENAI_API_KEY",
    default_model: "gpt-4o-mini",
};

pub const OPENROUTER: Preset = Preset {
    name: "openrouter",
    base_url: "https://openrouter.ai/api/v1",
    api_key_env: "OPENROUTER_API_KEY",
    default_model: "openai/gpt-4o-mini",
};

pub const GEMINI: Preset = Preset {
    name: "gemini",
    base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
    api_key_env: "GEMINI_API_KEY",
    default_model: "gemini-2.0-flash",
};

pub struct OpenAiCompatible {
    client: reqwest::Client,
    preset: Preset,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatible {
    pub fn new(preset: &Preset, config: &AiConfig) -> std::result::Result<Self, AnalysisError> {
        let base_url = config.base_url.as_deref().unwrap_or(preset.base_url);
        Ok(Self {
            client: http_client(config)?,
            preset: *preset,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: resolve_api_key(config, preset.api_key_env, preset.name)?,
            model: config.model.clone().unwrap_or_else(|| preset.default_model.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiCompatible {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self.client.post(&self.endpoint).bearer_auth(&self.api_key).json(&body);
        if self.preset.name == OPENROUTER.name {
            builder = builder.header("X-Title", "Grove");
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.endpoint))?;
        let response = check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid chat completion from {}", self.preset.name))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::malformed("completion contained no message content"))?;
        tracing::debug!("{} answered with {} bytes", self.preset.name, content.len());
        Ok(content)
    }

    fn name(&self) -> &str {
        self.preset.name
    }
}
