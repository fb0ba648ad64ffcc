use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::error::TrendwatchError;
use crate::types::{QueryDimension, TrendType};

const DEFAULT_LANGUAGES: &str = "python,javascript,typescript,rust";
const DEFAULT_TREND_TYPES: &str = "pushed,created,stars";

/// Which hosted model answers classification prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierProvider {
    /// OpenAI or any OpenAI-compatible endpoint.
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for ClassifierProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(ClassifierProvider::OpenAi),
            "anthropic" | "claude" => Ok(ClassifierProvider::Anthropic),
            other => Err(format!("unknown LLM provider: {other}")),
        }
    }
}

/// Minimum star count per trend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarLimits {
    pub pushed: u64,
    pub created: u64,
    pub stars: u64,
}

impl StarLimits {
    pub fn for_trend(&self, trend_type: TrendType) -> u64 {
        match trend_type {
            TrendType::Pushed => self.pushed,
            TrendType::Created => self.created,
            TrendType::Stars => self.stars,
        }
    }
}

impl Default for StarLimits {
    fn default() -> Self {
        Self {
            pushed: 500,
            created: 100,
            stars: 500,
        }
    }
}

/// Application configuration loaded from environment variables and
/// validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Query dimensions
    pub languages: Vec<String>,
    pub trend_types: Vec<TrendType>,
    pub star_limits: StarLimits,
    pub keyword: String,
    /// Default result limit N; each dimension fetches min(100, 3N).
    pub fetch_limit: usize,

    // Classification
    pub classification_enabled: bool,
    pub cache_ttl_days: i64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub llm_provider: ClassifierProvider,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_base_url: Option<String>,

    // Storage
    pub data_dir: PathBuf,

    // Source
    pub github_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: split_list(DEFAULT_LANGUAGES),
            trend_types: TrendType::ALL.to_vec(),
            star_limits: StarLimits::default(),
            keyword: "ai".to_string(),
            fetch_limit: 20,
            classification_enabled: true,
            cache_ttl_days: 30,
            batch_size: 25,
            max_retries: 2,
            llm_provider: ClassifierProvider::OpenAi,
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_base_url: None,
            data_dir: PathBuf::from("data"),
            github_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, TrendwatchError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a validated config from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, TrendwatchError> {
        let defaults = Self::default();
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let trend_types = get("TRENDWATCH_TREND_TYPES")
            .unwrap_or_else(|| DEFAULT_TREND_TYPES.to_string());
        let trend_types = split_list(&trend_types)
            .iter()
            .map(|t| t.parse::<TrendType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(TrendwatchError::Config)?;

        let config = Self {
            languages: get("TRENDWATCH_LANGUAGES")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.languages),
            trend_types,
            star_limits: StarLimits {
                pushed: parse_or("TRENDWATCH_STARS_PUSHED", get("TRENDWATCH_STARS_PUSHED"), defaults.star_limits.pushed)?,
                created: parse_or("TRENDWATCH_STARS_CREATED", get("TRENDWATCH_STARS_CREATED"), defaults.star_limits.created)?,
                stars: parse_or("TRENDWATCH_STARS_STARS", get("TRENDWATCH_STARS_STARS"), defaults.star_limits.stars)?,
            },
            keyword: get("TRENDWATCH_KEYWORD").unwrap_or(defaults.keyword),
            fetch_limit: parse_or("TRENDWATCH_FETCH_LIMIT", get("TRENDWATCH_FETCH_LIMIT"), defaults.fetch_limit)?,
            classification_enabled: parse_or(
                "TRENDWATCH_CLASSIFY",
                get("TRENDWATCH_CLASSIFY"),
                defaults.classification_enabled,
            )?,
            cache_ttl_days: parse_or("TRENDWATCH_CACHE_TTL_DAYS", get("TRENDWATCH_CACHE_TTL_DAYS"), defaults.cache_ttl_days)?,
            batch_size: parse_or("TRENDWATCH_BATCH_SIZE", get("TRENDWATCH_BATCH_SIZE"), defaults.batch_size)?,
            max_retries: parse_or("TRENDWATCH_MAX_RETRIES", get("TRENDWATCH_MAX_RETRIES"), defaults.max_retries)?,
            llm_provider: match get("LLM_PROVIDER") {
                Some(v) => v.parse().map_err(TrendwatchError::Config)?,
                None => defaults.llm_provider,
            },
            llm_api_key: get("LLM_API_KEY").unwrap_or_default(),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_base_url: get("LLM_BASE_URL"),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            github_token: get("GITHUB_TOKEN"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrendwatchError> {
        if self.languages.is_empty() {
            return Err(TrendwatchError::Config("at least one language is required".into()));
        }
        if self.trend_types.is_empty() {
            return Err(TrendwatchError::Config("at least one trend type is required".into()));
        }
        if self.keyword.contains(char::is_whitespace) {
            return Err(TrendwatchError::Config(format!(
                "search keyword must be a single term, got {:?}",
                self.keyword
            )));
        }
        if self.fetch_limit == 0 {
            return Err(TrendwatchError::Config("TRENDWATCH_FETCH_LIMIT must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(TrendwatchError::Config("TRENDWATCH_BATCH_SIZE must be > 0".into()));
        }
        if self.cache_ttl_days <= 0 {
            return Err(TrendwatchError::Config("TRENDWATCH_CACHE_TTL_DAYS must be > 0".into()));
        }
        Ok(())
    }

    /// Fails unless a reasoning-service key is configured. Only the `run`
    /// command needs one; `stats` and `prune` work without it.
    pub fn require_classifier(&self) -> Result<(), TrendwatchError> {
        if self.classification_enabled && self.llm_api_key.is_empty() {
            return Err(TrendwatchError::Config(
                "LLM_API_KEY is required when classification is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Every (trend type, language) combination, trend types outermost.
    pub fn dimensions(&self) -> Vec<QueryDimension> {
        self.trend_types
            .iter()
            .flat_map(|&trend_type| {
                self.languages.iter().map(move |language| QueryDimension {
                    language: language.clone(),
                    trend_type,
                    min_popularity: self.star_limits.for_trend(trend_type),
                })
            })
            .collect()
    }

    /// Page size for one dimension given a result limit.
    pub fn per_page(&self, limit: Option<usize>) -> u32 {
        let limit = limit.unwrap_or(self.fetch_limit).max(1);
        (limit.saturating_mul(3)).min(100) as u32
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_ttl_days)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("github_projects.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("classification_cache.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("cycle-runs")
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            languages = ?self.languages,
            trend_types = ?self.trend_types,
            stars_pushed = self.star_limits.pushed,
            stars_created = self.star_limits.created,
            stars_stars = self.star_limits.stars,
            keyword = %self.keyword,
            fetch_limit = self.fetch_limit,
            classification_enabled = self.classification_enabled,
            cache_ttl_days = self.cache_ttl_days,
            batch_size = self.batch_size,
            max_retries = self.max_retries,
            llm_provider = ?self.llm_provider,
            llm_model = %self.llm_model,
            llm_base_url = self.llm_base_url.as_deref().unwrap_or("default"),
            llm_api_key_set = !self.llm_api_key.is_empty(),
            github_token_set = self.github_token.is_some(),
            data_dir = %self.data_dir.display(),
            "Loaded config"
        );
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, TrendwatchError> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| TrendwatchError::Config(format!("{key} has invalid value {v:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, TrendwatchError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_cover_four_languages_and_three_trend_types() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.languages, vec!["python", "javascript", "typescript", "rust"]);
        assert_eq!(config.trend_types, TrendType::ALL.to_vec());
        assert_eq!(config.cache_ttl_days, 30);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.dimensions().len(), 12);
    }

    #[test]
    fn dimensions_carry_per_trend_star_limits() {
        let config = config_from(&[
            ("TRENDWATCH_LANGUAGES", "Rust"),
            ("TRENDWATCH_TREND_TYPES", "created,stars"),
            ("TRENDWATCH_STARS_CREATED", "50"),
        ])
        .unwrap();
        let dims = config.dimensions();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].language, "rust");
        assert_eq!(dims[0].trend_type, TrendType::Created);
        assert_eq!(dims[0].min_popularity, 50);
        assert_eq!(dims[1].min_popularity, 500);
    }

    #[test]
    fn invalid_values_are_rejected_at_startup() {
        assert!(matches!(
            config_from(&[("TRENDWATCH_BATCH_SIZE", "0")]),
            Err(TrendwatchError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("TRENDWATCH_TREND_TYPES", "pushed,monthly")]),
            Err(TrendwatchError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("TRENDWATCH_CACHE_TTL_DAYS", "soon")]),
            Err(TrendwatchError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("LLM_PROVIDER", "mystery")]),
            Err(TrendwatchError::Config(_))
        ));
    }

    #[test]
    fn per_page_is_three_times_limit_capped_at_100() {
        let config = Config::default();
        assert_eq!(config.per_page(None), 60);
        assert_eq!(config.per_page(Some(5)), 15);
        assert_eq!(config.per_page(Some(50)), 100);
    }

    #[test]
    fn classifier_key_required_only_when_enabled() {
        let config = config_from(&[]).unwrap();
        assert!(config.require_classifier().is_err());

        let disabled = config_from(&[("TRENDWATCH_CLASSIFY", "false")]).unwrap();
        assert!(disabled.require_classifier().is_ok());

        let keyed = config_from(&[("LLM_API_KEY", "sk-test")]).unwrap();
        assert!(keyed.require_classifier().is_ok());
    }
}
