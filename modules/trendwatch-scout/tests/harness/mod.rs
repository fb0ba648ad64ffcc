//! Shared fixtures for refresh-cycle scenario tests.
//!
//! Each `TestContext` owns a temp data dir, so ledger, cache and run logs
//! from different tests never collide. Scouts built from the same context
//! share those files, which is how restarts are simulated.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use github_client::Repository;
use trendwatch_common::{Config, ProjectRecord, TrendType};
use trendwatch_scout::testing::{MockReasoner, MockSource};
use trendwatch_scout::{
    ClassificationCache, ClassifierGateway, CycleOptions, CycleReport, Ledger, RunLog, Scout,
};

pub struct TestContext {
    pub dir: TempDir,
    pub config: Config,
}

impl TestContext {
    /// One language (rust), one trend type (stars), no retries.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            languages: vec!["rust".to_string()],
            trend_types: vec![TrendType::Stars],
            max_retries: 0,
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        Self { dir, config }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn with_trend_types(mut self, trend_types: Vec<TrendType>) -> Self {
        self.config.trend_types = trend_types;
        self
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::open(self.config.ledger_path()).unwrap()
    }

    pub fn ledger_text(&self) -> String {
        std::fs::read_to_string(self.config.ledger_path()).unwrap()
    }

    pub fn record(&self, full_name: &str) -> ProjectRecord {
        self.ledger()
            .get(&key(full_name))
            .cloned()
            .unwrap_or_else(|| panic!("{full_name} not in ledger"))
    }

    pub fn cache(&self) -> ClassificationCache {
        ClassificationCache::open(self.config.cache_path(), self.config.cache_ttl())
    }

    /// A scout reading from `source`. `reasoner: None` disables classification.
    pub fn scout(&self, source: Arc<MockSource>, reasoner: Option<Arc<MockReasoner>>) -> Scout {
        let gateway = reasoner.map(|r| {
            ClassifierGateway::new(r, self.cache(), self.config.max_retries)
                .with_retry_base(Duration::ZERO)
        });
        Scout::new(self.config.clone(), source, gateway).with_fetch_retry_base(Duration::ZERO)
    }

    /// Open the ledger from disk, run one cycle at `now`, drop the ledger.
    pub async fn run_at(&self, scout: &mut Scout, now: &str) -> CycleReport {
        let mut ledger = self.ledger();
        let mut log = RunLog::new();
        let options = CycleOptions::builder().now(at(now)).build();
        scout.run_cycle(&mut ledger, options, &mut log).await.unwrap()
    }
}

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn key(full_name: &str) -> String {
    format!("https://github.com/{full_name}")
}

/// Source returning `repos` for the rust queries.
pub fn source(repos: Vec<Repository>) -> Arc<MockSource> {
    Arc::new(MockSource::new().on_query("language:rust", repos))
}

pub fn repo(full_name: &str, stars: u64) -> Repository {
    MockSource::repo(full_name, stars)
}
