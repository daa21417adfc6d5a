pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Narration-model provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    LMStudio,
}

/// Narration-model configuration, threaded explicitly into each provider —
/// credentials are never ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Endpoint override (required for LMStudio, ignored for OpenAI)
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            endpoint: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_seconds: 120,
        }
    }
}

/// Chat message for model communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Model response
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for narration-model providers
#[async_trait]
pub trait Llm: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LlmProvider;
}

/// Create a provider instance from configuration
pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn Llm>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(providers::OpenAIProvider::new(config.clone())?)),
        LlmProvider::LMStudio => Ok(Box::new(providers::LMStudioProvider::new(config.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::system("be brief");
        assert_eq!(msg.role, "system");
        assert_eq!(msg.content, "be brief");
        assert_eq!(ChatMessage::user("hi").role, "user");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = LlmConfig::default();
        assert!(create_llm(&config).is_err());
    }

    #[test]
    fn test_lmstudio_requires_endpoint() {
        let config = LlmConfig {
            provider: LlmProvider::LMStudio,
            endpoint: None,
            ..LlmConfig::default()
        };
        assert!(create_llm(&config).is_err());
    }
}
