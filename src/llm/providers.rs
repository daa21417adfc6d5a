use super::{ChatMessage, Llm, LlmConfig, LlmProvider, LlmResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completions payload. LMStudio speaks the same wire format as the
/// hosted OpenAI API, so both providers share these types.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl ChatRequest {
    fn from_config(config: &LlmConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

fn first_choice(response: ChatResponse, provider: &str) -> Result<LlmResponse> {
    let content = response
        .choices
        .first()
        .ok_or_else(|| anyhow!("No response from {}", provider))?
        .message
        .content
        .clone();

    Ok(LlmResponse {
        content,
        tokens_used: response.usage.map(|u| u.total_tokens),
    })
}

/// Hosted OpenAI provider
pub struct OpenAIProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("OpenAI API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for OpenAIProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured"))?;

        let request = ChatRequest::from_config(&self.config, messages);

        debug!("Sending chat request to OpenAI ({})", self.config.model);

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }

        first_choice(response.json().await?, "OpenAI")
    }

    async fn is_available(&self) -> bool {
        let api_key = match &self.config.api_key {
            Some(key) => key,
            None => return false,
        };

        match self
            .client
            .get("https://api.openai.com/v1/models")
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LlmProvider {
        LlmProvider::OpenAI
    }
}

/// Local LMStudio provider (OpenAI-compatible endpoint)
pub struct LMStudioProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LMStudioProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.endpoint.is_none() {
            return Err(anyhow!("LMStudio endpoint required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for LMStudioProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse> {
        let endpoint = self
            .config
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("LMStudio endpoint not configured"))?;

        let request = ChatRequest::from_config(&self.config, messages);

        debug!("Sending chat request to LMStudio at {}", endpoint);

        let response = self.client.post(endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LMStudio API error {}: {}", status, text));
        }

        first_choice(response.json().await?, "LMStudio")
    }

    async fn is_available(&self) -> bool {
        let endpoint = match &self.config.endpoint {
            Some(ep) => ep,
            None => return false,
        };

        let health_endpoint = endpoint.replace("/v1/chat/completions", "/health");

        match self.client.get(&health_endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LlmProvider {
        LlmProvider::LMStudio
    }
}
