//! Language model client
//!
//! The summarizer only needs "prompt in, text out". [`LanguageModel`] is that
//! seam; [`OpenRouterClient`] implements it against an OpenAI-compatible chat
//! completions endpoint, and tests substitute scripted fakes.

use crate::config::{Credentials, ModelConfig};
use crate::errors::{GrpoError, Result};
use crate::models::types::{ChatMessage, ChatRequest, ChatResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Black-box text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt, return the raw reply text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Identifier used in logs
    fn name(&self) -> &str;
}

/// HTTP client for OpenRouter (or any OpenAI-compatible endpoint)
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    credentials: Credentials,
}

impl OpenRouterClient {
    /// Create client from configuration and credential
    pub fn new(config: &ModelConfig, credentials: Credentials) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GrpoError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            credentials,
        })
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.api_key())
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GrpoError::Timeout {
                        duration_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    GrpoError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GrpoError::ModelApi(format!(
                "HTTP {}: {}",
                status,
                truncate(&error_text, 200)
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GrpoError::ModelApi(format!("Failed to parse response: {}", e)))?;

        body.first_content()
            .map(str::to_string)
            .ok_or_else(|| GrpoError::ModelApi("Empty response from model".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
