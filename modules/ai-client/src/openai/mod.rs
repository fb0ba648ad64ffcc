mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{ChatCompletion, Message, MessageRole};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use client::OpenAiClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

// =============================================================================
// OpenAi Agent
// =============================================================================

/// Chat client for OpenAI and any OpenAI-compatible endpoint
/// (DeepSeek, Moonshot, local gateways) selected via `with_base_url`.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            temperature: 0.0,
            max_tokens: 2000,
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    fn request(&self, messages: &[Message]) -> types::ChatRequest {
        let mut request = types::ChatRequest::new(&self.model);
        request = if types::uses_max_completion_tokens(&self.model) {
            request.max_completion_tokens(self.max_tokens)
        } else {
            request.max_tokens(self.max_tokens).temperature(self.temperature)
        };
        for message in messages {
            request = request.message(match message.role {
                MessageRole::System => types::WireMessage::system(&message.content),
                MessageRole::User => types::WireMessage::user(&message.content),
            });
        }
        request
    }

    /// Multi-message conversation; returns the first choice's text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = self.request(messages);
        let response = self.client().chat(&request).await?;
        Ok(response
            .text()
            .ok_or(AiError::EmptyResponse("OpenAI"))?)
    }
}

#[async_trait]
impl ChatCompletion for OpenAi {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String> {
        self.chat(&[Message::system(system), Message::user(user)])
            .await
    }
}
