//! Raw search result → `CandidateRecord`.
//!
//! Pure and deterministic: the same repository always normalizes to the
//! same candidate, which keeps re-runs on identical source data from
//! drifting the ledger.

use std::sync::LazyLock;

use regex::Regex;

use github_client::Repository;
use trendwatch_common::{CandidateRecord, QueryDimension, TrendwatchError};

pub const MAX_SUMMARY_CHARS: usize = 300;
pub const MAX_TOPICS: usize = 5;

const GITHUB_WEB: &str = "https://github.com";

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static regex"));

/// Normalize one search result observed under `dimension`.
pub fn normalize(
    repo: &Repository,
    dimension: &QueryDimension,
) -> Result<CandidateRecord, TrendwatchError> {
    let full_name = non_empty(repo.full_name.as_deref());
    let name = non_empty(repo.name.as_deref());

    let key = non_empty(repo.html_url.as_deref())
        .and_then(canonical_key)
        .or_else(|| full_name.and_then(|n| canonical_key(&format!("{GITHUB_WEB}/{n}"))))
        .ok_or_else(|| {
            TrendwatchError::MalformedCandidate(format!(
                "repository {} has neither html_url nor full_name",
                repo.id
            ))
        })?;

    let title = full_name.or(name).ok_or_else(|| {
        TrendwatchError::MalformedCandidate(format!("{key} has no name"))
    })?;

    let summary = match non_empty(repo.description.as_deref()) {
        Some(description) => clean_summary(description),
        None => format!("GitHub project: {}", name.unwrap_or(title)),
    };

    let language = non_empty(repo.language.as_deref())
        .map(str::to_lowercase)
        .or_else(|| Some(dimension.language.clone()));

    Ok(CandidateRecord {
        key,
        title: title.to_string(),
        summary,
        popularity: repo.stargazers_count.unwrap_or(0),
        topics: normalize_topics(&repo.topics),
        language,
        trend_type: dimension.trend_type,
        owner: repo.owner.as_ref().map(|o| o.login.clone()),
        created_at: repo.created_at,
        updated_at: repo.updated_at.or(repo.pushed_at),
    })
}

/// Canonical identity for a project URL: trimmed, lower-cased, no trailing slash.
pub fn canonical_key(url: &str) -> Option<String> {
    let key = url.trim().trim_end_matches('/').to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Strip URLs, collapse whitespace, and bound the length.
pub fn clean_summary(description: &str) -> String {
    let without_urls = URL_PATTERN.replace_all(description, "");
    let collapsed = without_urls.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_summary(&collapsed, MAX_SUMMARY_CHARS)
}

/// Truncate to at most `max_chars` characters, preferring a word boundary,
/// with a trailing "..." when anything was cut.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(3);
    let head: String = text.chars().take(budget).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if idx > 0 => head[..idx].trim_end(),
        _ => head.as_str(),
    };
    format!("{cut}...")
}

fn normalize_topics(topics: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for topic in topics {
        let topic = topic.trim().to_lowercase();
        if topic.is_empty() || out.contains(&topic) {
            continue;
        }
        out.push(topic);
        if out.len() == MAX_TOPICS {
            break;
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
