pub mod error;
pub mod types;

pub use error::{GithubError, Result};
pub use types::{Owner, Repository, SearchQuery, SearchResponse, SortBy};

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use std::time::Duration;

const BASE_URL: &str = "https://api.github.com";

/// The mercy preview media type makes the search API include `topics`.
const ACCEPT_TOPICS: &str = "application/vnd.github.mercy-preview+json";

const DEFAULT_USER_AGENT: &str = "trendwatch/0.1";

pub struct GithubClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            token: token.filter(|t| !t.is_empty()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether requests carry a token (authenticated search has a higher rate limit).
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Run one repository search and return a single page of results.
    pub async fn search_repositories(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let url = format!("{}/search/repositories", self.base_url);
        tracing::debug!(q = %query.q, sort = query.sort.as_str(), per_page = query.per_page, "GitHub search");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, ACCEPT_TOPICS)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .query(&query.params());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            if let Some(err) = rate_limit_error(status.as_u16(), resp.headers()) {
                return Err(err);
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(GithubError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        if parsed.incomplete_results {
            tracing::warn!(q = %query.q, "GitHub search returned incomplete results");
        }
        tracing::debug!(total = parsed.total_count, returned = parsed.items.len(), "GitHub search complete");
        Ok(parsed)
    }
}

/// A 429, or a 403 with an exhausted `X-RateLimit-Remaining`, is a rate limit
/// rather than a permission problem.
fn rate_limit_error(status: u16, headers: &HeaderMap) -> Option<GithubError> {
    let remaining = header_value(headers, "x-ratelimit-remaining");
    let exhausted = status == 429 || (status == 403 && remaining.as_deref() == Some("0"));
    if !exhausted {
        return None;
    }
    let reset_at = header_value(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(epoch_to_utc);
    Some(GithubError::RateLimited { reset_at })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
