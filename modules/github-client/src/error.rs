use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GithubError>;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exhausted (resets at {})", reset_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "unknown".into()))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl GithubError {
    /// Network failures and 5xx responses are worth retrying; a rate limit
    /// or a rejected query is not.
    pub fn is_transient(&self) -> bool {
        match self {
            GithubError::Network(_) => true,
            GithubError::Api { status, .. } => *status >= 500,
            GithubError::RateLimited { .. } | GithubError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for GithubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GithubError::Parse(err.to_string())
        } else {
            GithubError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GithubError {
    fn from(err: serde_json::Error) -> Self {
        GithubError::Parse(err.to_string())
    }
}
