use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Search request ---

/// Sort key accepted by `/search/repositories`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Stars,
    Updated,
    Forks,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Stars => "stars",
            SortBy::Updated => "updated",
            SortBy::Forks => "forks",
        }
    }
}

/// A single repository search. `q` uses GitHub's qualifier syntax
/// (`language:rust ai stars:>100`).
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub q: String,
    pub sort: SortBy,
    pub per_page: u32,
}

impl SearchQuery {
    /// GitHub caps `per_page` at 100.
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(q: impl Into<String>, sort: SortBy, per_page: u32) -> Self {
        Self {
            q: q.into(),
            sort,
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub(crate) fn params(&self) -> [(&'static str, String); 4] {
        [
            ("q", self.q.clone()),
            ("sort", self.sort.as_str().to_string()),
            ("order", "desc".to_string()),
            ("per_page", self.per_page.to_string()),
        ]
    }
}

// --- Search response ---

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<Repository>,
}

/// A repository as returned by the search API. Everything except `id` is
/// optional: the API omits fields on partial results and we would rather
/// drop one malformed item downstream than fail the whole page here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: u64,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub html_url: Option<String>,
    pub description: Option<String>,
    pub stargazers_count: Option<u64>,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub owner: Option<Owner>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}
