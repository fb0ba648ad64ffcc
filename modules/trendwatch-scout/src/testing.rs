// Test doubles for the refresh cycle.
//
// Two mocks matching the two trait boundaries:
// - MockSource (RepoSearch): query-fragment matching → canned pages or errors
// - MockReasoner (ChatCompletion): scripted verdicts with a call counter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use ai_client::ChatCompletion;
use github_client::{GithubError, Owner, Repository, SearchQuery};

use crate::classifier::{prompt_items, PromptItem};
use crate::traits::RepoSearch;

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

struct Rule {
    fragments: Vec<String>,
    outcome: RuleOutcome,
}

enum RuleOutcome {
    Page(Vec<Repository>),
    Fail { error: GithubError, remaining: Option<usize> },
}

impl Rule {
    fn matches(&self, q: &str) -> bool {
        self.fragments.iter().all(|f| q.contains(f.as_str()))
    }
}

/// Repository search keyed by whitespace-separated query fragments: a rule
/// applies when every fragment occurs in the query text. Failure rules are
/// checked before pages. Unmatched queries return an empty page.
/// Builder pattern: `.on_query()`, `.fail_query()`, `.fail_first()`.
pub struct MockSource {
    rules: Mutex<Vec<Rule>>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(self, fragments: &str, repositories: Vec<Repository>) -> Self {
        self.push(fragments, RuleOutcome::Page(repositories))
    }

    /// Every matching query fails with `error`.
    pub fn fail_query(self, fragments: &str, error: GithubError) -> Self {
        self.push(fragments, RuleOutcome::Fail { error, remaining: None })
    }

    /// The first `times` matching queries fail with `error`.
    pub fn fail_first(self, fragments: &str, times: usize, error: GithubError) -> Self {
        self.push(
            fragments,
            RuleOutcome::Fail {
                error,
                remaining: Some(times),
            },
        )
    }

    fn push(self, fragments: &str, outcome: RuleOutcome) -> Self {
        self.rules.lock().unwrap().push(Rule {
            fragments: fragments.split_whitespace().map(String::from).collect(),
            outcome,
        });
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// A well-formed repository named `owner/name` with `stars` stars.
    pub fn repo(full_name: &str, stars: u64) -> Repository {
        let (owner, name) = full_name.split_once('/').unwrap_or(("owner", full_name));
        Repository {
            id: stars,
            name: Some(name.to_string()),
            full_name: Some(full_name.to_string()),
            html_url: Some(format!("https://github.com/{full_name}")),
            description: Some(format!("{name} repository")),
            stargazers_count: Some(stars),
            language: Some("Rust".to_string()),
            topics: vec!["ai".to_string()],
            owner: Some(Owner {
                login: owner.to_string(),
            }),
            created_at: Some("2026-06-01T00:00:00Z".parse().unwrap()),
            updated_at: Some("2026-10-15T12:00:00Z".parse().unwrap()),
            pushed_at: None,
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

fn replay(error: &GithubError) -> GithubError {
    match error {
        GithubError::Network(m) => GithubError::Network(m.clone()),
        GithubError::Api { status, message } => GithubError::Api {
            status: *status,
            message: message.clone(),
        },
        GithubError::RateLimited { reset_at } => GithubError::RateLimited {
            reset_at: *reset_at,
        },
        GithubError::Parse(m) => GithubError::Parse(m.clone()),
    }
}

#[async_trait]
impl RepoSearch for MockSource {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Repository>, GithubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.q.clone());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if !rule.matches(&query.q) {
                continue;
            }
            if let RuleOutcome::Fail { error, remaining } = &mut rule.outcome {
                match remaining {
                    None => return Err(replay(error)),
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        return Err(replay(error));
                    }
                    Some(_) => {}
                }
            }
        }
        for rule in rules.iter() {
            if let RuleOutcome::Page(repositories) = &rule.outcome {
                if rule.matches(&query.q) {
                    return Ok(repositories.clone());
                }
            }
        }
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// MockReasoner
// ---------------------------------------------------------------------------

enum Script {
    Judge(Box<dyn Fn(&PromptItem) -> (bool, f64, String) + Send + Sync>),
    Raw(String),
    Fail,
}

/// Scripted reasoning service. Counts every call and records each item
/// title it was asked about. Builder: `.fail_after(n)`.
pub struct MockReasoner {
    script: Script,
    fail_after: Option<usize>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockReasoner {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            fail_after: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Same verdict for every item.
    pub fn always(relevant: bool, confidence: f64, reason: &str) -> Self {
        let reason = reason.to_string();
        Self::with_script(Script::Judge(Box::new(move |_| {
            (relevant, confidence, reason.clone())
        })))
    }

    /// Relevant (0.9) when `predicate` accepts the prompt title, otherwise
    /// not relevant (0.2).
    pub fn relevant_when(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::with_script(Script::Judge(Box::new(move |item| {
            if predicate(&item.title) {
                (true, 0.9, "mentions ai tooling".to_string())
            } else {
                (false, 0.2, "unrelated to ai".to_string())
            }
        })))
    }

    /// Return `text` verbatim on every call.
    pub fn raw(text: &str) -> Self {
        Self::with_script(Script::Raw(text.to_string()))
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::with_script(Script::Fail)
    }

    /// Calls after the first `n` fail.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt titles of every item sent so far, in call order.
    pub fn seen_titles(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Whether any item whose prompt title starts with `title` was sent.
    pub fn was_asked_about(&self, title: &str) -> bool {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .any(|seen| seen == title || seen.starts_with(&format!("{title}: ")))
    }
}

#[async_trait]
impl ChatCompletion for MockReasoner {
    fn provider(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-reasoner"
    }

    async fn chat_completion(&self, _system: &str, user: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let items = prompt_items(user);
        self.seen
            .lock()
            .unwrap()
            .extend(items.iter().map(|i| i.title.clone()));

        if self.fail_after.is_some_and(|n| call > n) {
            return Err(anyhow!("MockReasoner: scripted failure on call {call}"));
        }

        match &self.script {
            Script::Judge(judge) => {
                let verdicts: Vec<_> = items
                    .iter()
                    .map(|item| {
                        let (relevant, confidence, reason) = judge(item);
                        json!({
                            "id": item.id,
                            "relevant": relevant,
                            "confidence": confidence,
                            "reason": reason,
                        })
                    })
                    .collect();
                Ok(serde_json::to_string(&verdicts)?)
            }
            Script::Raw(text) => Ok(text.clone()),
            Script::Fail => Err(anyhow!("MockReasoner: service unavailable")),
        }
    }
}
