use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for a refresh cycle.
///
/// Only the ledger variants are fatal for a cycle; everything else is
/// isolated to one query dimension or one item and logged.
#[derive(Error, Debug)]
pub enum TrendwatchError {
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    #[error("Source rate limit exhausted: {0}")]
    RateLimited(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    #[error("Ledger at {path} is unreadable and will not be overwritten: {reason}")]
    LedgerCorruption { path: PathBuf, reason: String },

    #[error("Ledger I/O error at {path}: {source}")]
    LedgerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrendwatchError {
    /// Whether this error must abort the whole cycle.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            TrendwatchError::LedgerCorruption { .. } | TrendwatchError::LedgerIo { .. }
        )
    }
}
