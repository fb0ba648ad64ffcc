//! The authoritative store of every project ever observed.
//!
//! Opened once per cycle, mutated only through `merge`, flushed at
//! checkpoints. A file that exists but cannot be parsed is reported as
//! corruption and never replaced.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use trendwatch_common::{ProjectRecord, TrendwatchError};

use crate::persist::write_json_atomic;

pub struct Ledger {
    path: PathBuf,
    records: BTreeMap<String, ProjectRecord>,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file opens empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrendwatchError> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger yet, starting empty");
                return Ok(Self {
                    path,
                    records: BTreeMap::new(),
                    dirty: false,
                });
            }
            Err(source) => return Err(TrendwatchError::LedgerIo { path, source }),
        };

        let records: BTreeMap<String, ProjectRecord> =
            serde_json::from_str(&raw).map_err(|e| TrendwatchError::LedgerCorruption {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if let Some((key, record)) = records.iter().find(|(key, record)| **key != record.key) {
            return Err(TrendwatchError::LedgerCorruption {
                path,
                reason: format!("entry {key} holds record for {}", record.key),
            });
        }

        debug!(path = %path.display(), records = records.len(), "Ledger opened");
        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ProjectRecord> {
        self.records.get(key)
    }

    /// All records in identity order.
    pub fn records(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.records.values()
    }

    /// Unclassified records in identity order, including ones left over
    /// from earlier cycles.
    pub fn unclassified(&self) -> Vec<&ProjectRecord> {
        self.records.values().filter(|r| !r.is_classified()).collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn insert(&mut self, record: ProjectRecord) {
        self.records.insert(record.key.clone(), record);
        self.dirty = true;
    }

    /// Apply `update` to the record under `key`. The ledger is marked dirty
    /// only when the record actually changed.
    pub(crate) fn update<R>(
        &mut self,
        key: &str,
        update: impl FnOnce(&mut ProjectRecord) -> R,
    ) -> Option<R> {
        let record = self.records.get_mut(key)?;
        let before = record.clone();
        let result = update(record);
        if *record != before {
            self.dirty = true;
        }
        Some(result)
    }

    /// Write to disk if anything changed since the last flush.
    /// Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool, TrendwatchError> {
        if !self.dirty {
            return Ok(false);
        }
        write_json_atomic(&self.path, &self.records).map_err(|source| TrendwatchError::LedgerIo {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        debug!(path = %self.path.display(), records = self.records.len(), "Ledger flushed");
        Ok(true)
    }

    // --- Reporting ---

    pub fn statistics(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for record in self.records.values() {
            stats.total += 1;
            if record.is_classified() {
                stats.classified += 1;
                if record.is_relevant() {
                    stats.relevant += 1;
                }
            } else {
                stats.unclassified += 1;
            }
            let language = record.language.clone().unwrap_or_else(|| "unknown".into());
            *stats.by_language.entry(language).or_default() += 1;
            *stats
                .by_trend_type
                .entry(record.trend_type.to_string())
                .or_default() += 1;
        }
        stats
    }

    /// Classified-relevant records, most popular first.
    pub fn relevant(&self) -> Vec<&ProjectRecord> {
        let mut relevant: Vec<_> = self.records.values().filter(|r| r.is_relevant()).collect();
        relevant.sort_by(|a, b| b.popularity.cmp(&a.popularity).then_with(|| a.key.cmp(&b.key)));
        relevant
    }

    /// Relevant records classified strictly after `since`.
    pub fn relevant_since(&self, since: DateTime<Utc>) -> Vec<&ProjectRecord> {
        self.relevant()
            .into_iter()
            .filter(|r| r.classified_at().is_some_and(|at| at > since))
            .collect()
    }

    /// Remove records whose last activity predates `cutoff`. Operator
    /// maintenance only; a refresh cycle never prunes.
    pub fn prune_inactive(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.last_updated.unwrap_or(r.first_seen) >= cutoff);
        let removed = before - self.records.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub unclassified: usize,
    pub classified: usize,
    pub relevant: usize,
    pub by_language: BTreeMap<String, usize>,
    pub by_trend_type: BTreeMap<String, usize>,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Ledger Statistics ===")?;
        writeln!(f, "Projects:      {}", self.total)?;
        writeln!(f, "Unclassified:  {}", self.unclassified)?;
        writeln!(f, "Classified:    {}", self.classified)?;
        writeln!(f, "Relevant:      {}", self.relevant)?;
        if !self.by_language.is_empty() {
            writeln!(f, "\nBy language:")?;
            for (language, count) in &self.by_language {
                writeln!(f, "  {:<14}{}", language, count)?;
            }
        }
        if !self.by_trend_type.is_empty() {
            writeln!(f, "\nBy trend type:")?;
            for (trend, count) in &self.by_trend_type {
                writeln!(f, "  {:<14}{}", trend, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendwatch_common::{Classification, TrendType};

    fn record(key: &str, popularity: u64, classification: Classification) -> ProjectRecord {
        ProjectRecord {
            key: key.into(),
            title: key.into(),
            summary: String::new(),
            popularity,
            topics: vec![],
            language: Some("rust".into()),
            trend_type: TrendType::Stars,
            owner: None,
            classification,
            first_seen: "2026-09-01T00:00:00Z".parse().unwrap(),
            last_updated: Some("2026-09-15T00:00:00Z".parse().unwrap()),
        }
    }

    fn classified(relevant: bool) -> Classification {
        Classification::Classified {
            relevant,
            confidence: 0.9,
            rationale: "r".into(),
            classified_at: "2026-10-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("github_projects.json")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn corrupt_file_is_refused_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_projects.json");
        std::fs::write(&path, "{\"truncated\": ").unwrap();

        let err = Ledger::open(&path).err().unwrap();
        assert!(matches!(err, TrendwatchError::LedgerCorruption { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"truncated\": ");
    }

    #[test]
    fn flush_round_trips_and_skips_clean_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_projects.json");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.insert(record("b", 1, Classification::Unclassified));
        ledger.insert(record("a", 2, classified(true)));
        assert!(ledger.flush().unwrap());
        assert!(!ledger.flush().unwrap());

        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a"), ledger.get("a"));
        assert_eq!(reopened.unclassified().len(), 1);
    }

    #[test]
    fn update_without_change_keeps_ledger_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path().join("l.json")).unwrap();
        ledger.insert(record("a", 2, Classification::Unclassified));
        ledger.flush().unwrap();

        ledger.update("a", |r| r.popularity = 2);
        assert!(!ledger.is_dirty());
        ledger.update("a", |r| r.popularity = 3);
        assert!(ledger.is_dirty());
    }

    #[test]
    fn statistics_and_relevant_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path().join("l.json")).unwrap();
        ledger.insert(record("low", 5, classified(true)));
        ledger.insert(record("high", 50, classified(true)));
        ledger.insert(record("no", 500, classified(false)));
        ledger.insert(record("pending", 1, Classification::Unclassified));

        let stats = ledger.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.classified, 3);
        assert_eq!(stats.relevant, 2);
        assert_eq!(stats.unclassified, 1);
        assert_eq!(stats.by_language["rust"], 4);

        let keys: Vec<_> = ledger.relevant().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["high", "low"]);
        assert!(ledger
            .relevant_since("2026-10-02T00:00:00Z".parse().unwrap())
            .is_empty());
    }

    #[test]
    fn prune_removes_only_stale_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path().join("l.json")).unwrap();
        ledger.insert(record("stale", 1, classified(true)));
        let mut fresh = record("fresh", 1, Classification::Unclassified);
        fresh.last_updated = Some("2026-10-10T00:00:00Z".parse().unwrap());
        ledger.insert(fresh);
        ledger.flush().unwrap();

        let removed = ledger.prune_inactive("2026-10-01T00:00:00Z".parse().unwrap());
        assert_eq!(removed, 1);
        assert!(ledger.get("fresh").is_some());
        assert!(ledger.is_dirty());
    }
}
