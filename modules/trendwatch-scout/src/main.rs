use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::{ChatCompletion, Claude, OpenAi};
use github_client::GithubClient;
use trendwatch_common::{ClassifierProvider, Config};
use trendwatch_scout::{
    ClassificationCache, ClassifierGateway, CycleOptions, Ledger, RunLog, Scout,
};

#[derive(Parser)]
#[command(name = "trendwatch", about = "Trending repository ledger with AI relevance screening")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one refresh cycle
    Run {
        /// Result limit per dimension (page size is min(100, 3 x limit))
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print ledger statistics
    Stats,
    /// Print relevant projects as JSON
    Relevant {
        /// Only projects classified after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Remove projects with no activity in the last N days
    Prune {
        #[arg(long)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trendwatch=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Run { limit } => run(config, limit).await,
        Command::Stats => {
            let ledger = Ledger::open(config.ledger_path())?;
            print!("{}", ledger.statistics());
            Ok(())
        }
        Command::Relevant { since } => {
            let ledger = Ledger::open(config.ledger_path())?;
            let records = match since {
                Some(since) => ledger.relevant_since(since),
                None => ledger.relevant(),
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Prune { days } => {
            anyhow::ensure!(days > 0, "--days must be positive");
            let mut ledger = Ledger::open(config.ledger_path())?;
            let removed = ledger.prune_inactive(Utc::now() - Duration::days(days));
            ledger.flush()?;
            info!(removed, remaining = ledger.len(), "Ledger pruned");
            Ok(())
        }
    }
}

async fn run(config: Config, limit: Option<usize>) -> Result<()> {
    info!("Trendwatch refresh cycle starting...");
    config.log_redacted();
    config.require_classifier()?;

    let github = GithubClient::new(config.github_token.clone());
    if !github.is_authenticated() {
        warn!("GITHUB_TOKEN not set, search is limited to the unauthenticated rate");
    }

    let classifier = if config.classification_enabled {
        let cache = ClassificationCache::open(config.cache_path(), config.cache_ttl());
        Some(ClassifierGateway::new(reasoner(&config), cache, config.max_retries))
    } else {
        None
    };

    let mut ledger = Ledger::open(config.ledger_path())
        .with_context(|| format!("Refusing to run against {}", config.ledger_path().display()))?;

    let runs_dir = config.runs_dir();
    let mut scout = Scout::new(config, Arc::new(github), classifier);
    let mut log = RunLog::new();
    let options = CycleOptions::builder()
        .limit(limit)
        .build();

    let report = scout.run_cycle(&mut ledger, options, &mut log).await?;
    info!("{}", report.stats);
    for key in &report.newly_relevant {
        info!(key = key.as_str(), "Newly relevant");
    }

    if let Err(e) = log.save(&runs_dir, &report.stats) {
        warn!(error = %e, "Failed to save run log");
    }
    Ok(())
}

fn reasoner(config: &Config) -> Arc<dyn ChatCompletion> {
    match config.llm_provider {
        ClassifierProvider::OpenAi => {
            let mut ai = OpenAi::new(&config.llm_api_key, &config.llm_model);
            if let Some(url) = &config.llm_base_url {
                ai = ai.with_base_url(url);
            }
            Arc::new(ai)
        }
        ClassifierProvider::Anthropic => {
            let mut ai = Claude::new(&config.llm_api_key, &config.llm_model);
            if let Some(url) = &config.llm_base_url {
                ai = ai.with_base_url(url);
            }
            Arc::new(ai)
        }
    }
}
