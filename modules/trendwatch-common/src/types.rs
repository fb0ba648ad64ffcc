use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Query Dimensions ---

/// How a repository surfaced in the trending search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    /// Pushed to within the last week.
    Pushed,
    /// Created within the last half year.
    Created,
    /// Highly starred and created within the last half year.
    Stars,
}

impl TrendType {
    pub const ALL: [TrendType; 3] = [TrendType::Pushed, TrendType::Created, TrendType::Stars];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendType::Pushed => "pushed",
            TrendType::Created => "created",
            TrendType::Stars => "stars",
        }
    }
}

impl std::fmt::Display for TrendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pushed" => Ok(TrendType::Pushed),
            "created" => Ok(TrendType::Created),
            "stars" => Ok(TrendType::Stars),
            other => Err(format!("unknown trend type: {other}")),
        }
    }
}

/// One (language, trend-type, minimum-popularity) combination to query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDimension {
    pub language: String,
    pub trend_type: TrendType,
    pub min_popularity: u64,
}

impl std::fmt::Display for QueryDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.trend_type, self.language)
    }
}

// --- Candidates ---

/// A normalized observation of a project in the current cycle.
/// Discarded once merged into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Canonical project URL (lower-cased, no trailing slash).
    pub key: String,
    pub title: String,
    pub summary: String,
    pub popularity: u64,
    pub topics: Vec<String>,
    pub language: Option<String>,
    pub trend_type: TrendType,
    pub owner: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Verdicts ---

/// Structured result of relevance classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    /// Always within [0, 1].
    pub confidence: f64,
    pub rationale: String,
}

impl Verdict {
    pub fn new(relevant: bool, confidence: f64, rationale: impl Into<String>) -> Result<Self, String> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {confidence} outside [0, 1]"));
        }
        Ok(Self {
            relevant,
            confidence,
            rationale: rationale.into(),
        })
    }
}

// --- Ledger Records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationState {
    Unclassified,
    Classified,
}

impl std::fmt::Display for ClassificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationState::Unclassified => write!(f, "unclassified"),
            ClassificationState::Classified => write!(f, "classified"),
        }
    }
}

/// Classification payload. Once `Classified`, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Classification {
    Unclassified,
    Classified {
        relevant: bool,
        confidence: f64,
        rationale: String,
        classified_at: DateTime<Utc>,
    },
}

impl Classification {
    pub fn state(&self) -> ClassificationState {
        match self {
            Classification::Unclassified => ClassificationState::Unclassified,
            Classification::Classified { .. } => ClassificationState::Classified,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Classification::Unclassified => None,
            Classification::Classified {
                relevant,
                confidence,
                rationale,
                ..
            } => Some(Verdict {
                relevant: *relevant,
                confidence: *confidence,
                rationale: rationale.clone(),
            }),
        }
    }
}

/// A project as persisted in the ledger, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub popularity: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    pub language: Option<String>,
    pub trend_type: TrendType,
    #[serde(default)]
    pub owner: Option<String>,
    pub classification: Classification,
    pub first_seen: DateTime<Utc>,
    /// The source's own update timestamp from the latest observation.
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    pub fn state(&self) -> ClassificationState {
        self.classification.state()
    }

    pub fn is_classified(&self) -> bool {
        self.state() == ClassificationState::Classified
    }

    pub fn is_relevant(&self) -> bool {
        matches!(
            self.classification,
            Classification::Classified { relevant: true, .. }
        )
    }

    pub fn classified_at(&self) -> Option<DateTime<Utc>> {
        match self.classification {
            Classification::Classified { classified_at, .. } => Some(classified_at),
            Classification::Unclassified => None,
        }
    }
}
