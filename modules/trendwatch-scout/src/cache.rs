//! Time-bounded reuse of classification verdicts, keyed by project identity.
//!
//! Expiry is lazy: an entry past its `expires_at` is reported as a miss on
//! lookup and only physically removed by `purge_expired`. A missing or
//! unreadable cache file is never an error; the worst case is paying for a
//! classification again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use trendwatch_common::{TrendwatchError, Verdict};

use crate::persist::write_json_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub verdict: Verdict,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct ClassificationCache {
    path: Option<PathBuf>,
    ttl: Duration,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl ClassificationCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            path: None,
            ttl,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load a durable cache. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Classification cache unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read classification cache, starting empty");
                BTreeMap::new()
            }
        };
        debug!(entries = entries.len(), "Classification cache loaded");
        Self {
            path: Some(path),
            ttl,
            entries,
            dirty: false,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live verdict for `key` at `now`, or `None` when absent or expired.
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<Verdict> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.verdict.clone())
    }

    /// Store a verdict that stays live for `ttl` from `now`.
    pub fn store_at(&mut self, key: &str, verdict: Verdict, now: DateTime<Utc>, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                verdict,
                expires_at: now + ttl,
            },
        );
        self.dirty = true;
    }

    /// Drop every entry that is no longer live. Returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Persist pending changes. No-op for in-memory caches or when clean.
    pub fn flush(&mut self) -> Result<(), TrendwatchError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(path, &self.entries).map_err(|source| TrendwatchError::LedgerIo {
            path: path.clone(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }
}
