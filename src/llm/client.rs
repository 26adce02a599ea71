//! Async LLM client for query interpretation and explanations
//!
//! A model-agnostic HTTP client. The wire dialect is chosen from the endpoint
//! URL: Anthropic messages, Ollama chat (the default local deployment), or
//! anything OpenAI-compatible. Failed requests are retried with exponential
//! backoff; the workflow engine never retries on its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::LlmSettings;
use crate::core::error::{AgentError, Result};

/// Anything that turns a system prompt plus a user message into text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// API format type
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
    Ollama,
}

/// Async LLM client for making API calls
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client with explicit configuration
    pub fn new(api_key: String, settings: &LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AgentError::LlmError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
            api_format: Self::detect_api_format(&settings.api_url),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            max_retries: settings.max_retries,
        })
    }

    /// Detect API format from URL
    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else if url.contains(":11434") || url.ends_with("/api/chat") {
            ApiFormat::Ollama
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Create a client from configuration, reading the key from `LLM_API_KEY`
    ///
    /// A local Ollama server needs no key; every other dialect does.
    pub fn from_config(settings: &LlmSettings) -> Result<Self> {
        let api_key = match std::env::var("LLM_API_KEY") {
            Ok(key) => key,
            Err(_) if Self::detect_api_format(&settings.api_url) == ApiFormat::Ollama => {
                String::new()
            }
            Err(_) => return Err(AgentError::LlmError("LLM_API_KEY not set".into())),
        };
        Self::new(api_key, settings)
    }

    pub fn api_format(&self) -> &ApiFormat {
        &self.api_format
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(system, user).await,
            ApiFormat::OpenAI => self.complete_openai(system, user).await,
            ApiFormat::Ollama => self.complete_ollama(system, user).await,
        }
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system.into(),
            messages: vec![Message {
                role: "user".into(),
                content: user.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmError(format!("API error: {}", error_text)));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        completion
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| AgentError::LlmError("Empty response".into()))
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: chat_messages(system, user),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmError(format!("API error: {}", error_text)));
        }

        let completion: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AgentError::LlmError("Empty response".into()))
    }

    async fn complete_ollama(&self, system: &str, user: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: chat_messages(system, user),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmError(format!("API error: {}", error_text)));
        }

        let completion: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        Ok(completion.message.content)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    /// Send a completion request, retrying with 1s, 2s, 4s... backoff
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let attempts = self.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.complete_once(system, user).await {
                Ok(text) => {
                    debug!(attempt = attempt + 1, chars = text.len(), "LLM completion received");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "LLM request failed");
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        tokio::time::sleep(backoff(attempt)).await;
                    }
                }
            }
        }

        Err(AgentError::LlmError(format!(
            "Failed to generate response after {} attempts: {}",
            attempts, last_error
        )))
    }
}

/// Delay before retry number `attempt + 1`
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

fn chat_messages(system: &str, user: &str) -> Vec<Message> {
    vec![
        Message {
            role: "system".into(),
            content: system.into(),
        },
        Message {
            role: "user".into(),
            content: user.into(),
        },
    ]
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

// Ollama chat format
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChoiceMessage,
}

// Shared
#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> LlmSettings {
        LlmSettings {
            api_url: url.into(),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new("test-key".into(), &settings("https://api.example.com/v1")).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.api_url, "https://api.example.com/v1");
        assert_eq!(client.model(), "llama3.1:8b");
        assert_eq!(client.max_retries, 3);
    }

    #[test]
    fn test_detect_api_format() {
        assert_eq!(
            LlmClient::detect_api_format("https://api.anthropic.com/v1/messages"),
            ApiFormat::Anthropic
        );
        assert_eq!(
            LlmClient::detect_api_format("http://localhost:11434/api/chat"),
            ApiFormat::Ollama
        );
        assert_eq!(
            LlmClient::detect_api_format("https://api.deepseek.com/chat/completions"),
            ApiFormat::OpenAI
        );
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(40), Duration::from_secs(64));
    }

    #[test]
    fn test_ollama_request_shape() {
        let request = OllamaRequest {
            model: "llama3.1:8b".into(),
            messages: chat_messages("sys", "hi"),
            stream: false,
            options: OllamaOptions {
                temperature: 0.5,
                num_predict: 16,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 16);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_attempts() {
        let settings = LlmSettings {
            api_url: "http://127.0.0.1:9/api/chat".into(),
            max_retries: 1,
            timeout_secs: 2,
            ..LlmSettings::default()
        };
        let client = LlmClient::new(String::new(), &settings).unwrap();
        let err = client.complete("sys", "hi").await.unwrap_err();
        assert!(err.to_string().contains("after 1 attempts"));
    }
}
