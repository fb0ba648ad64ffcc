use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use github_client::{GithubError, Repository, SearchQuery, SortBy};
use trendwatch_common::{QueryDimension, TrendType, TrendwatchError};

use crate::traits::RepoSearch;

/// Lookback for the `pushed` trend type.
const PUSHED_WINDOW_DAYS: u64 = 7;
/// Lookback for the `created` and `stars` trend types.
const CREATED_WINDOW_DAYS: u64 = 180;
/// Dimensions fetched at once.
const FETCH_CONCURRENCY: usize = 4;
const RETRY_BASE: Duration = Duration::from_secs(1);

/// One raw search result tagged with the dimension that surfaced it.
#[derive(Debug, Clone)]
pub struct Observation {
    pub dimension: QueryDimension,
    pub repository: Repository,
}

#[derive(Debug)]
pub struct DimensionFailure {
    pub dimension: QueryDimension,
    pub error: TrendwatchError,
}

/// Everything one fetch pass produced. Failed dimensions are reported
/// alongside the observations from the ones that succeeded.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub observations: Vec<Observation>,
    pub failures: Vec<DimensionFailure>,
}

/// Queries the repository search for every configured dimension.
pub struct SourceAdapter {
    search: Arc<dyn RepoSearch>,
    keyword: String,
    max_retries: u32,
    retry_base: Duration,
}

impl SourceAdapter {
    pub fn new(search: Arc<dyn RepoSearch>, keyword: impl Into<String>, max_retries: u32) -> Self {
        Self {
            search,
            keyword: keyword.into(),
            max_retries,
            retry_base: RETRY_BASE,
        }
    }

    /// Override the first backoff delay. Tests set this to zero.
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Fetch all dimensions concurrently. Results come back in dimension
    /// order so the merge pass that follows is deterministic.
    pub async fn fetch_all(
        &self,
        dimensions: &[QueryDimension],
        per_page: u32,
        today: NaiveDate,
    ) -> FetchReport {
        let results: Vec<_> = stream::iter(dimensions.iter().map(|dimension| async move {
            let query = build_query(dimension, &self.keyword, per_page, today);
            (dimension, self.fetch_dimension(dimension, &query).await)
        }))
        .buffered(FETCH_CONCURRENCY)
        .collect()
        .await;

        let mut report = FetchReport::default();
        for (dimension, result) in results {
            match result {
                Ok(repositories) => {
                    info!(dimension = %dimension, count = repositories.len(), "Dimension fetched");
                    report
                        .observations
                        .extend(repositories.into_iter().map(|repository| Observation {
                            dimension: dimension.clone(),
                            repository,
                        }));
                }
                Err(error) => {
                    warn!(dimension = %dimension, error = %error, "Dimension fetch failed, skipping");
                    report.failures.push(DimensionFailure {
                        dimension: dimension.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    async fn fetch_dimension(
        &self,
        dimension: &QueryDimension,
        query: &SearchQuery,
    ) -> Result<Vec<Repository>, TrendwatchError> {
        let mut attempt = 0;
        loop {
            match self.search.search(query).await {
                Ok(items) => return Ok(items),
                Err(e @ GithubError::RateLimited { .. }) => {
                    return Err(TrendwatchError::RateLimited(e.to_string()));
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = self.retry_base * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        dimension = %dimension,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Search failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(TrendwatchError::TransientFetch(e.to_string())),
            }
        }
    }
}

/// Build the search for one dimension:
/// `language:<lang> <keyword> <window> stars:><min>`.
pub fn build_query(
    dimension: &QueryDimension,
    keyword: &str,
    per_page: u32,
    today: NaiveDate,
) -> SearchQuery {
    let (window, sort) = match dimension.trend_type {
        TrendType::Pushed => (
            format!("pushed:>={}", days_before(today, PUSHED_WINDOW_DAYS)),
            SortBy::Updated,
        ),
        TrendType::Created | TrendType::Stars => (
            format!("created:>={}", days_before(today, CREATED_WINDOW_DAYS)),
            SortBy::Stars,
        ),
    };

    let mut parts = vec![format!("language:{}", dimension.language)];
    if !keyword.trim().is_empty() {
        parts.push(keyword.trim().to_string());
    }
    parts.push(window);
    parts.push(format!("stars:>{}", dimension.min_popularity));

    SearchQuery::new(parts.join(" "), sort, per_page)
}

fn days_before(today: NaiveDate, days: u64) -> String {
    today
        .checked_sub_days(Days::new(days))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}
