//! Field-level merge rules: the only way records enter or change in the
//! ledger.
//!
//! `Absent -> Unclassified` on first observation. Repeat observations
//! refresh popularity, topics, trend type and last-updated and nothing
//! else. `Unclassified -> Classified` happens at most once per identity.

use chrono::{DateTime, Utc};

use trendwatch_common::{CandidateRecord, Classification, ProjectRecord, Verdict};

use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictOutcome {
    Applied,
    AlreadyClassified,
    UnknownIdentity,
}

/// Merge one normalized observation into the ledger.
pub fn merge_candidate(
    ledger: &mut Ledger,
    candidate: CandidateRecord,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let refreshed = ledger.update(&candidate.key, |record| refresh(record, &candidate));
    if refreshed.is_some() {
        return MergeOutcome::Refreshed;
    }

    ledger.insert(ProjectRecord {
        key: candidate.key,
        title: candidate.title,
        summary: candidate.summary,
        popularity: candidate.popularity,
        topics: candidate.topics,
        language: candidate.language,
        trend_type: candidate.trend_type,
        owner: candidate.owner,
        classification: Classification::Unclassified,
        first_seen: now,
        last_updated: candidate.updated_at.or(candidate.created_at),
    });
    MergeOutcome::Created
}

fn refresh(record: &mut ProjectRecord, candidate: &CandidateRecord) {
    record.popularity = candidate.popularity;
    // An observation without topics keeps the stored ones.
    if !candidate.topics.is_empty() {
        record.topics = candidate.topics.clone();
    }
    record.trend_type = candidate.trend_type;
    if let Some(updated_at) = candidate.updated_at {
        record.last_updated = Some(updated_at);
    }
}

/// Resolve an unclassified record. A record that is already classified
/// keeps its verdict regardless of what `verdict` says.
pub fn apply_verdict(
    ledger: &mut Ledger,
    key: &str,
    verdict: &Verdict,
    now: DateTime<Utc>,
) -> VerdictOutcome {
    let applied = ledger.update(key, |record| {
        if record.is_classified() {
            return false;
        }
        record.classification = Classification::Classified {
            relevant: verdict.relevant,
            confidence: verdict.confidence,
            rationale: verdict.rationale.clone(),
            classified_at: now,
        };
        true
    });
    match applied {
        Some(true) => VerdictOutcome::Applied,
        Some(false) => VerdictOutcome::AlreadyClassified,
        None => VerdictOutcome::UnknownIdentity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendwatch_common::TrendType;

    fn candidate(popularity: u64) -> CandidateRecord {
        CandidateRecord {
            key: "https://github.com/acme/agent".into(),
            title: "acme/agent".into(),
            summary: "Agent framework".into(),
            popularity,
            topics: vec!["llm".into()],
            language: Some("python".into()),
            trend_type: TrendType::Created,
            owner: Some("acme".into()),
            created_at: Some("2026-08-01T00:00:00Z".parse().unwrap()),
            updated_at: Some("2026-10-10T00:00:00Z".parse().unwrap()),
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-10-19T08:00:00Z".parse().unwrap()
    }

    fn ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("github_projects.json")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn first_observation_creates_unclassified_record() {
        let (_dir, mut ledger) = ledger();
        assert_eq!(merge_candidate(&mut ledger, candidate(10), now()), MergeOutcome::Created);

        let record = ledger.get("https://github.com/acme/agent").unwrap();
        assert!(!record.is_classified());
        assert_eq!(record.first_seen, now());
        assert_eq!(record.last_updated, Some("2026-10-10T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn repeat_observation_refreshes_mutable_fields_only() {
        let (_dir, mut ledger) = ledger();
        merge_candidate(&mut ledger, candidate(10), now());

        let mut later = candidate(25);
        later.title = "renamed".into();
        later.summary = "different".into();
        later.topics = vec![];
        later.trend_type = TrendType::Pushed;
        let later_now = now() + chrono::Duration::days(1);
        assert_eq!(merge_candidate(&mut ledger, later, later_now), MergeOutcome::Refreshed);

        let record = ledger.get("https://github.com/acme/agent").unwrap();
        assert_eq!(record.popularity, 25);
        assert_eq!(record.trend_type, TrendType::Pushed);
        assert_eq!(record.title, "acme/agent");
        assert_eq!(record.summary, "Agent framework");
        assert_eq!(record.topics, vec!["llm"]);
        assert_eq!(record.first_seen, now());
    }

    #[test]
    fn non_empty_topics_replace_stored_topics() {
        let (_dir, mut ledger) = ledger();
        merge_candidate(&mut ledger, candidate(10), now());

        let mut later = candidate(10);
        later.topics = vec!["agents".into(), "rag".into()];
        merge_candidate(&mut ledger, later, now() + chrono::Duration::days(1));

        let record = ledger.get("https://github.com/acme/agent").unwrap();
        assert_eq!(record.topics, vec!["agents", "rag"]);
    }

    #[test]
    fn verdict_is_write_once() {
        let (_dir, mut ledger) = ledger();
        merge_candidate(&mut ledger, candidate(10), now());
        let key = "https://github.com/acme/agent";

        let first = Verdict::new(true, 0.9, "agent framework").unwrap();
        assert_eq!(apply_verdict(&mut ledger, key, &first, now()), VerdictOutcome::Applied);

        let second = Verdict::new(false, 0.1, "not ai").unwrap();
        assert_eq!(
            apply_verdict(&mut ledger, key, &second, now()),
            VerdictOutcome::AlreadyClassified
        );
        assert_eq!(ledger.get(key).unwrap().classification.verdict(), Some(first));
    }

    #[test]
    fn verdict_for_unknown_identity_is_ignored() {
        let (_dir, mut ledger) = ledger();
        let verdict = Verdict::new(true, 0.5, "x").unwrap();
        assert_eq!(
            apply_verdict(&mut ledger, "https://github.com/nobody/none", &verdict, now()),
            VerdictOutcome::UnknownIdentity
        );
        assert!(ledger.is_empty());
    }
}
