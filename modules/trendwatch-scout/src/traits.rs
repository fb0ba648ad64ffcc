// Trait seam for the repository search dependency.
//
// RepoSearch replaces a concrete GithubClient so the source adapter can be
// driven by MockSource in tests: no network, deterministic pages, scripted
// failures per query dimension.

use async_trait::async_trait;

use github_client::{GithubClient, GithubError, Repository, SearchQuery};

#[async_trait]
pub trait RepoSearch: Send + Sync {
    /// Run one search and return the page of repositories it produced.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Repository>, GithubError>;
}

#[async_trait]
impl RepoSearch for GithubClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Repository>, GithubError> {
        Ok(self.search_repositories(query).await?.items)
    }
}
