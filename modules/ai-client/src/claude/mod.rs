mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::traits::{ChatCompletion, Message, MessageRole};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use client::ClaudeClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    max_tokens: u32,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
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

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// System messages are folded into the top-level `system` field as the
    /// Messages API requires.
    fn request(&self, messages: &[Message]) -> ChatRequest {
        let mut request = ChatRequest::new(&self.model)
            .max_tokens(self.max_tokens)
            .temperature(0.0);

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            request = request.system(system.join("\n\n"));
        }

        for message in messages.iter().filter(|m| m.role == MessageRole::User) {
            request = request.message(WireMessage::user(&message.content));
        }
        request
    }

    /// Multi-message conversation; returns the concatenated text blocks.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = self.request(messages);
        let response = self.client().chat(&request).await?;

        Ok(response
            .text()
            .ok_or(AiError::EmptyResponse("Claude"))?)
    }
}

#[async_trait]
impl ChatCompletion for Claude {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String> {
        self.chat(&[Message::system(system), Message::user(user)])
            .await
    }
}
