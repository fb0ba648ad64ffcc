//! Cycle run log: persisted JSON timeline of everything a refresh cycle did.
//!
//! Each cycle produces a single `{DATA_DIR}/cycle-runs/{run_id}.json` file
//! containing an ordered list of events and the final cycle summary.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::scout::CycleStats;

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    DimensionFetched {
        dimension: String,
        results: usize,
    },
    DimensionFailed {
        dimension: String,
        error: String,
    },
    CandidateSkipped {
        reason: String,
    },
    ProjectCreated {
        key: String,
        title: String,
        popularity: u64,
    },
    BatchClassified {
        batch: usize,
        requested: usize,
        cache_hits: usize,
        resolved: usize,
        pending: usize,
    },
    ClassifierUnavailable {
        batch: usize,
        error: String,
    },
    ProjectClassified {
        key: String,
        relevant: bool,
        confidence: f64,
    },
    LedgerFlushed {
        records: usize,
    },
    CachePurged {
        removed: usize,
    },
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event kinds in the order they were logged.
    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.events.iter().map(|e| &e.kind)
    }

    /// Serialize the run log to JSON under `runs_dir`.
    /// Returns the file path on success.
    pub fn save(&self, runs_dir: &Path, stats: &CycleStats) -> Result<PathBuf> {
        std::fs::create_dir_all(runs_dir)?;
        let path = runs_dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Cycle run log saved");

        Ok(path)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a CycleStats,
    events: &'a [RunEvent],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_writes_ordered_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::new();
        log.log(EventKind::DimensionFetched {
            dimension: "pushed/rust".into(),
            results: 3,
        });
        log.log(EventKind::LedgerFlushed { records: 3 });

        let path = log.save(&dir.path().join("cycle-runs"), &CycleStats::default()).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(saved["run_id"], log.run_id.as_str());
        assert_eq!(saved["events"][0]["seq"], 0);
        assert_eq!(saved["events"][0]["type"], "dimension_fetched");
        assert_eq!(saved["events"][1]["type"], "ledger_flushed");
        assert_eq!(saved["stats"]["fetched"], 0);
    }
}
