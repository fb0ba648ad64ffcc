use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// =============================================================================
// ChatCompletion Trait
// =============================================================================

/// A single-shot system + user prompt round trip against a hosted model.
///
/// Both providers implement this so callers can hold an
/// `Arc<dyn ChatCompletion>` and swap the backend from configuration.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Provider label for logs ("openai", "anthropic", ...).
    fn provider(&self) -> &'static str;

    fn model(&self) -> &str;

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String>;
}
