use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use trendwatch_common::{CandidateRecord, Config, TrendwatchError};

use crate::classifier::{ClassificationRequest, ClassifierGateway};
use crate::ledger::Ledger;
use crate::merge::{apply_verdict, merge_candidate, MergeOutcome, VerdictOutcome};
use crate::normalizer::normalize;
use crate::run_log::{EventKind, RunLog};
use crate::source::SourceAdapter;
use crate::traits::RepoSearch;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub fetched: usize,
    pub new: usize,
    pub updated: usize,
    pub newly_classified: usize,
    pub still_pending: usize,
    pub skipped_malformed: usize,
    pub errors: usize,
    pub dimensions_failed: usize,
    pub cache_hits: usize,
    pub classifier_calls: usize,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Refresh Cycle Complete ===")?;
        writeln!(f, "Fetched:           {}", self.fetched)?;
        writeln!(f, "New:               {}", self.new)?;
        writeln!(f, "Updated:           {}", self.updated)?;
        writeln!(f, "Newly classified:  {}", self.newly_classified)?;
        writeln!(f, "Still pending:     {}", self.still_pending)?;
        writeln!(f, "Skipped malformed: {}", self.skipped_malformed)?;
        writeln!(f, "Errors:            {}", self.errors)?;
        writeln!(f, "\nClassifier:")?;
        writeln!(f, "  Cache hits: {}", self.cache_hits)?;
        writeln!(f, "  Calls:      {}", self.classifier_calls)?;
        if self.dimensions_failed > 0 {
            writeln!(f, "\nDimensions failed: {}", self.dimensions_failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct CycleOptions {
    /// Result limit N; the per-dimension page size is min(100, 3N).
    #[builder(default)]
    pub limit: Option<usize>,
    #[builder(default = Utc::now())]
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub stats: CycleStats,
    /// Identities that became Classified-relevant during this cycle.
    pub newly_relevant: Vec<String>,
}

/// Runs refresh cycles against a ledger: fetch every dimension, merge
/// the observations, then classify whatever is still unclassified one
/// batch at a time.
pub struct Scout {
    config: Config,
    source: SourceAdapter,
    classifier: Option<ClassifierGateway>,
}

impl Scout {
    /// `classifier` is `None` when classification is disabled; records
    /// then stay Unclassified until a cycle runs with one.
    pub fn new(
        config: Config,
        search: Arc<dyn RepoSearch>,
        classifier: Option<ClassifierGateway>,
    ) -> Self {
        let source = SourceAdapter::new(search, config.keyword.clone(), config.max_retries);
        Self {
            config,
            source,
            classifier,
        }
    }

    pub fn with_fetch_retry_base(mut self, base: Duration) -> Self {
        self.source = self.source.with_retry_base(base);
        self
    }

    pub fn classifier(&self) -> Option<&ClassifierGateway> {
        self.classifier.as_ref()
    }

    pub async fn run_cycle(
        &mut self,
        ledger: &mut Ledger,
        options: CycleOptions,
        log: &mut RunLog,
    ) -> Result<CycleReport, TrendwatchError> {
        let mut stats = CycleStats::default();
        let now = options.now;

        // 1. Fetch every dimension
        let dimensions = self.config.dimensions();
        let per_page = self.config.per_page(options.limit);
        info!(dimensions = dimensions.len(), per_page, "Fetching trending repositories");
        let report = self
            .source
            .fetch_all(&dimensions, per_page, now.date_naive())
            .await;

        stats.fetched = report.observations.len();
        stats.dimensions_failed = report.failures.len();
        stats.errors += report.failures.len();
        for dimension in &dimensions {
            match report.failures.iter().find(|f| &f.dimension == dimension) {
                Some(failure) => log.log(EventKind::DimensionFailed {
                    dimension: dimension.to_string(),
                    error: failure.error.to_string(),
                }),
                None => log.log(EventKind::DimensionFetched {
                    dimension: dimension.to_string(),
                    results: report
                        .observations
                        .iter()
                        .filter(|o| &o.dimension == dimension)
                        .count(),
                }),
            }
        }

        // 2. Normalize, collapsing repeat identities (last observation wins)
        let mut candidates: Vec<CandidateRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for observation in &report.observations {
            match normalize(&observation.repository, &observation.dimension) {
                Ok(candidate) => match positions.get(&candidate.key) {
                    Some(&i) => candidates[i] = candidate,
                    None => {
                        positions.insert(candidate.key.clone(), candidates.len());
                        candidates.push(candidate);
                    }
                },
                Err(e) => {
                    warn!(dimension = %observation.dimension, error = %e, "Skipping malformed candidate");
                    stats.skipped_malformed += 1;
                    log.log(EventKind::CandidateSkipped {
                        reason: e.to_string(),
                    });
                }
            }
        }

        // 3. Merge into the ledger, then persist so new records survive a
        //    failed classification pass
        for candidate in candidates {
            let (key, title, popularity) =
                (candidate.key.clone(), candidate.title.clone(), candidate.popularity);
            match merge_candidate(ledger, candidate, now) {
                MergeOutcome::Created => {
                    stats.new += 1;
                    log.log(EventKind::ProjectCreated {
                        key,
                        title,
                        popularity,
                    });
                }
                MergeOutcome::Refreshed => stats.updated += 1,
            }
        }
        if ledger.flush()? {
            log.log(EventKind::LedgerFlushed {
                records: ledger.len(),
            });
        }
        info!(new = stats.new, updated = stats.updated, "Observations merged");

        // 4. Classify everything still unclassified, one batch at a time
        let pending: Vec<ClassificationRequest> = ledger
            .unclassified()
            .into_iter()
            .map(|r| ClassificationRequest {
                key: r.key.clone(),
                title: r.title.clone(),
                summary: r.summary.clone(),
            })
            .collect();

        let mut newly_relevant = Vec::new();
        let Some(gateway) = self.classifier.as_mut() else {
            if !pending.is_empty() {
                info!(pending = pending.len(), "Classification disabled, records stay unclassified");
            }
            stats.still_pending = pending.len();
            return Ok(CycleReport {
                stats,
                newly_relevant,
            });
        };

        let batch_size = self.config.batch_size.max(1);
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            let outcome = gateway.classify(batch, now).await;
            stats.cache_hits += outcome.cache_hits;
            stats.classifier_calls += outcome.calls;
            stats.still_pending += outcome.pending.len();
            if let Some(e) = &outcome.failure {
                stats.errors += 1;
                log.log(EventKind::ClassifierUnavailable {
                    batch: index + 1,
                    error: e.to_string(),
                });
            }

            for (key, verdict) in &outcome.verdicts {
                match apply_verdict(ledger, key, verdict, now) {
                    VerdictOutcome::Applied => {
                        stats.newly_classified += 1;
                        if verdict.relevant {
                            newly_relevant.push(key.clone());
                        }
                        log.log(EventKind::ProjectClassified {
                            key: key.clone(),
                            relevant: verdict.relevant,
                            confidence: verdict.confidence,
                        });
                    }
                    VerdictOutcome::AlreadyClassified | VerdictOutcome::UnknownIdentity => {
                        warn!(key = key.as_str(), "Verdict not applied");
                    }
                }
            }
            log.log(EventKind::BatchClassified {
                batch: index + 1,
                requested: batch.len(),
                cache_hits: outcome.cache_hits,
                resolved: outcome.verdicts.len(),
                pending: outcome.pending.len(),
            });

            // Cache before ledger: a crash in between still finds the
            // verdicts on the next run without another call.
            if let Err(e) = gateway.cache_mut().flush() {
                warn!(error = %e, "Failed to persist classification cache");
                stats.errors += 1;
            }
            if ledger.flush()? {
                log.log(EventKind::LedgerFlushed {
                    records: ledger.len(),
                });
            }
        }

        let removed = gateway.cache_mut().purge_expired(now);
        if removed > 0 {
            log.log(EventKind::CachePurged { removed });
        }
        if let Err(e) = gateway.cache_mut().flush() {
            warn!(error = %e, "Failed to persist classification cache");
            stats.errors += 1;
        }

        Ok(CycleReport {
            stats,
            newly_relevant,
        })
    }
}
