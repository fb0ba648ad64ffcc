//! Classifier gateway: cache first, then one reasoning call per batch of
//! misses, parsed strictly into per-item verdicts.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{strip_code_blocks, AiError, ChatCompletion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use trendwatch_common::{TrendwatchError, Verdict};

use crate::cache::ClassificationCache;

const MAX_RATIONALE_CHARS: usize = 200;
const PROMPT_DESCRIPTION_CHARS: usize = 50;
const RETRY_BASE: Duration = Duration::from_secs(2);

const SYSTEM_PROMPT: &str = r#"You screen software projects for an AI news digest. Decide whether each project is related to AI, machine learning or large language models.

Criteria:
- Clearly about AI / ML / LLMs / GPT / Claude / Gemini / transformers / NLP / computer vision / agents / generative AI -> relevant
- AI infrastructure (training frameworks, inference engines, model serving, vector search, compute) -> relevant
- Pure web development, databases or hardware with no AI connection -> not relevant
- Borderline projects with a plausible AI connection -> relevant

Return ONLY a JSON array, no commentary. One element per input item, echoing its id:
[
  {"id": "1", "relevant": true, "confidence": 0.95, "reason": "LLM agent framework"},
  {"id": "2", "relevant": false, "confidence": 0.15, "reason": "Database driver unrelated to AI"}
]

confidence is a number from 0.0 to 1.0. reason is one short sentence."#;

// =============================================================================
// Requests
// =============================================================================

/// One project awaiting classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub key: String,
    pub title: String,
    pub summary: String,
}

impl ClassificationRequest {
    fn prompt_title(&self) -> String {
        let head: String = self.summary.chars().take(PROMPT_DESCRIPTION_CHARS).collect();
        if head.is_empty() {
            self.title.clone()
        } else {
            format!("{}: {}", self.title, head)
        }
    }
}

/// Item shape embedded in the user prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    pub id: String,
    pub title: String,
}

/// Build the user prompt for a batch. Ids are 1-based positions.
pub fn build_user_prompt(source_label: &str, items: &[&ClassificationRequest]) -> String {
    let prompt_items: Vec<PromptItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| PromptItem {
            id: (i + 1).to_string(),
            title: item.prompt_title(),
        })
        .collect();
    let listing = serde_json::to_string_pretty(&prompt_items).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Source: {source_label}\nClassify the following {} items:\n\n{listing}\n\nAnswer with a JSON array holding one verdict per item.",
        items.len()
    )
}

/// Recover the items from a prompt produced by `build_user_prompt`.
#[cfg(any(test, feature = "test-support"))]
pub fn prompt_items(user_prompt: &str) -> Vec<PromptItem> {
    let Some(start) = user_prompt.find('[') else {
        return Vec::new();
    };
    serde_json::Deserializer::from_str(&user_prompt[start..])
        .into_iter::<Vec<PromptItem>>()
        .next()
        .and_then(Result::ok)
        .unwrap_or_default()
}

// =============================================================================
// Response parsing
// =============================================================================

/// Strict per-item parse result. A failure is never turned into a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedVerdict {
    Verdict(Verdict),
    ParseFailure(String),
}

/// Parse a model response into exactly `expected` slots, one per 1-based id.
///
/// Markdown fences are stripped. If the array is cut off, or the first
/// bracketed text holds no objects, every complete object in the body is
/// kept. Elements with an unknown id, a
/// non-boolean `relevant` or an out-of-range `confidence` are failures;
/// for repeated ids the first well-formed element wins.
pub fn parse_verdicts(response: &str, expected: usize) -> Vec<ParsedVerdict> {
    let body = strip_code_blocks(response);
    let elements = match parse_array(body) {
        Some(elements) if elements.iter().any(Value::is_object) => elements,
        _ => salvage_objects(body),
    };

    let mut slots: Vec<Option<ParsedVerdict>> = vec![None; expected];
    for element in &elements {
        let Some(index) = element_index(element, expected) else {
            debug!(element = %element, "Verdict with unknown id ignored");
            continue;
        };
        let parsed = match element_verdict(element) {
            Ok(verdict) => ParsedVerdict::Verdict(verdict),
            Err(reason) => ParsedVerdict::ParseFailure(reason),
        };
        let replace = match &slots[index] {
            None => true,
            Some(ParsedVerdict::ParseFailure(_)) => matches!(parsed, ParsedVerdict::Verdict(_)),
            Some(ParsedVerdict::Verdict(_)) => false,
        };
        if replace {
            slots[index] = Some(parsed);
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| ParsedVerdict::ParseFailure("missing from response".into())))
        .collect()
}

fn parse_array(body: &str) -> Option<Vec<Value>> {
    let start = body.find('[')?;
    serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<Vec<Value>>()
        .next()
        .and_then(Result::ok)
}

/// Collect every complete top-level `{...}` in the body, such as the
/// elements of a truncated array.
fn salvage_objects(text: &str) -> Vec<Value> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = None;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value) = serde_json::from_str::<Value>(&text[s..=i]) {
                            out.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn element_index(element: &Value, expected: usize) -> Option<usize> {
    let id = match element.get("id")? {
        Value::String(s) => s.trim().parse::<usize>().ok()?,
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    (1..=expected).contains(&id).then(|| id - 1)
}

fn element_verdict(element: &Value) -> Result<Verdict, String> {
    let relevant = element
        .get("relevant")
        .and_then(Value::as_bool)
        .ok_or_else(|| "relevant is not a boolean".to_string())?;
    let confidence = element
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| "confidence is not a number".to_string())?;
    let rationale: String = element
        .get("reason")
        .or_else(|| element.get("rationale"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .chars()
        .take(MAX_RATIONALE_CHARS)
        .collect();
    Verdict::new(relevant, confidence, rationale)
}

// =============================================================================
// Gateway
// =============================================================================

/// What one `classify` call produced.
#[derive(Debug, Default)]
pub struct GatewayOutcome {
    /// Verdicts from cache hits and fresh calls, in request order.
    pub verdicts: Vec<(String, Verdict)>,
    /// Keys with no verdict this time. They stay unclassified.
    pub pending: Vec<String>,
    pub cache_hits: usize,
    pub calls: usize,
    /// Set when the reasoning call failed after its retries.
    pub failure: Option<TrendwatchError>,
}

pub struct ClassifierGateway {
    model: Arc<dyn ChatCompletion>,
    cache: ClassificationCache,
    source_label: String,
    max_retries: u32,
    retry_base: Duration,
}

impl ClassifierGateway {
    pub fn new(model: Arc<dyn ChatCompletion>, cache: ClassificationCache, max_retries: u32) -> Self {
        Self {
            model,
            cache,
            source_label: "github".to_string(),
            max_retries,
            retry_base: RETRY_BASE,
        }
    }

    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    /// Override the first backoff delay. Tests set this to zero.
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ClassificationCache {
        &mut self.cache
    }

    /// Classify a batch as of `now`. Entries live at `now` never reach the
    /// model; all misses go out in a single call and fresh verdicts are
    /// cached from `now` before return.
    pub async fn classify(
        &mut self,
        items: &[ClassificationRequest],
        now: DateTime<Utc>,
    ) -> GatewayOutcome {
        let mut outcome = GatewayOutcome::default();
        let mut misses: Vec<&ClassificationRequest> = Vec::new();

        for item in items {
            match self.cache.lookup_at(&item.key, now) {
                Some(verdict) => {
                    outcome.cache_hits += 1;
                    outcome.verdicts.push((item.key.clone(), verdict));
                }
                None => misses.push(item),
            }
        }

        if misses.is_empty() {
            return outcome;
        }

        let user_prompt = build_user_prompt(&self.source_label, &misses);
        let (response, calls) = self.call_with_retry(&user_prompt).await;
        outcome.calls = calls;

        let response = match response {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    provider = self.model.provider(),
                    items = misses.len(),
                    error = %e,
                    "Classifier unavailable, batch left pending"
                );
                outcome.failure = Some(TrendwatchError::ClassifierUnavailable(format!("{e:#}")));
                outcome.pending = misses.iter().map(|m| m.key.clone()).collect();
                return outcome;
            }
        };

        let ttl = self.cache.ttl();
        for (item, parsed) in misses.iter().zip(parse_verdicts(&response, misses.len())) {
            match parsed {
                ParsedVerdict::Verdict(verdict) => {
                    self.cache.store_at(&item.key, verdict.clone(), now, ttl);
                    outcome.verdicts.push((item.key.clone(), verdict));
                }
                ParsedVerdict::ParseFailure(reason) => {
                    warn!(key = item.key.as_str(), reason = reason.as_str(), "Unparseable verdict, left pending");
                    outcome.pending.push(item.key.clone());
                }
            }
        }

        info!(
            requested = items.len(),
            cache_hits = outcome.cache_hits,
            resolved = outcome.verdicts.len(),
            pending = outcome.pending.len(),
            "Batch classified"
        );
        outcome
    }

    async fn call_with_retry(&self, user_prompt: &str) -> (anyhow::Result<String>, usize) {
        let mut attempt: u32 = 0;
        loop {
            let result = self.model.chat_completion(SYSTEM_PROMPT, user_prompt).await;
            let calls = attempt as usize + 1;
            match result {
                Ok(text) => return (Ok(text), calls),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    let backoff = self.retry_base * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        model = self.model.model(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Classifier call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return (Err(e), calls),
            }
        }
    }
}

/// Provider errors say whether they are transient; anything else is
/// assumed to be.
fn is_retryable(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<AiError>()
        .map(AiError::is_transient)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReasoner;
    use chrono::Duration as TtlDuration;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn request(name: &str) -> ClassificationRequest {
        ClassificationRequest {
            key: format!("https://github.com/{name}"),
            title: name.to_string(),
            summary: format!("{name} does things"),
        }
    }

    fn verdict(parsed: &ParsedVerdict) -> &Verdict {
        match parsed {
            ParsedVerdict::Verdict(v) => v,
            ParsedVerdict::ParseFailure(reason) => panic!("expected verdict, got failure: {reason}"),
        }
    }

    #[test]
    fn parses_fenced_array() {
        let response = "```json\n[\n  {\"id\": \"1\", \"relevant\": true, \"confidence\": 0.9, \"reason\": \" agent framework \"},\n  {\"id\": 2, \"relevant\": false, \"confidence\": 0.1, \"reason\": \"web server\"}\n]\n```";
        let parsed = parse_verdicts(response, 2);
        assert_eq!(verdict(&parsed[0]).rationale, "agent framework");
        assert!(verdict(&parsed[0]).relevant);
        assert!(!verdict(&parsed[1]).relevant);
    }

    #[test]
    fn salvages_complete_objects_from_truncated_array() {
        let response = r#"[{"id": "1", "relevant": true, "confidence": 0.8, "reason": "uses {braces}"}, {"id": "2", "relevant": fa"#;
        let parsed = parse_verdicts(response, 3);
        assert_eq!(verdict(&parsed[0]).rationale, "uses {braces}");
        assert!(matches!(parsed[1], ParsedVerdict::ParseFailure(_)));
        assert!(matches!(parsed[2], ParsedVerdict::ParseFailure(_)));
    }

    #[test]
    fn invalid_elements_are_failures_not_defaults() {
        let response = r#"[
            {"id": "1", "relevant": "yes", "confidence": 0.8},
            {"id": "2", "relevant": true, "confidence": 1.4},
            {"id": "9", "relevant": true, "confidence": 0.5}
        ]"#;
        let parsed = parse_verdicts(response, 2);
        assert!(parsed.iter().all(|p| matches!(p, ParsedVerdict::ParseFailure(_))));
    }

    #[test]
    fn first_well_formed_duplicate_wins() {
        let response = r#"[
            {"id": "1", "relevant": "maybe", "confidence": 0.8},
            {"id": "1", "relevant": true, "confidence": 0.7, "reason": "first"},
            {"id": "1", "relevant": false, "confidence": 0.2, "reason": "second"}
        ]"#;
        let parsed = parse_verdicts(response, 1);
        assert_eq!(verdict(&parsed[0]).rationale, "first");
    }

    #[test]
    fn bracketed_note_before_the_answer_is_skipped() {
        let response = "Note [1]:\n[{\"id\":\"1\",\"relevant\":true,\"confidence\":0.9,\"reason\":\"llm\"}]";
        let parsed = parse_verdicts(response, 1);
        assert_eq!(verdict(&parsed[0]).rationale, "llm");
        assert!(verdict(&parsed[0]).relevant);
    }

    #[test]
    fn garbage_yields_all_failures() {
        let parsed = parse_verdicts("I cannot help with that.", 2);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|p| matches!(p, ParsedVerdict::ParseFailure(_))));
    }

    #[test]
    fn rationale_is_capped() {
        let long = "x".repeat(500);
        let response = format!(r#"[{{"id": "1", "relevant": true, "confidence": 0.5, "reason": "{long}"}}]"#);
        let parsed = parse_verdicts(&response, 1);
        assert_eq!(verdict(&parsed[0]).rationale.chars().count(), MAX_RATIONALE_CHARS);
    }

    #[test]
    fn prompt_items_round_trip_through_user_prompt() {
        let a = request("acme/agent");
        let b = request("acme/db");
        let prompt = build_user_prompt("github", &[&a, &b]);
        let items = prompt_items(&prompt);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "1");
        assert_eq!(items[1].title, "acme/db: acme/db does things");
    }

    #[tokio::test]
    async fn cache_hits_skip_the_model() {
        let reasoner = Arc::new(MockReasoner::always(true, 0.9, "agents"));
        let mut cache = ClassificationCache::in_memory(TtlDuration::days(30));
        cache.store_at(
            "https://github.com/acme/agent",
            Verdict::new(false, 0.3, "cached").unwrap(),
            at("2026-10-01T00:00:00Z"),
            TtlDuration::days(30),
        );
        let mut gateway = ClassifierGateway::new(reasoner.clone(), cache, 0);

        let outcome = gateway.classify(&[request("acme/agent")], at("2026-10-19T00:00:00Z")).await;

        assert_eq!(reasoner.call_count(), 0);
        assert_eq!(outcome.cache_hits, 1);
        assert_eq!(outcome.verdicts[0].1.rationale, "cached");
    }

    #[tokio::test]
    async fn misses_are_sent_once_and_cached() {
        let reasoner = Arc::new(MockReasoner::always(true, 0.9, "agents"));
        let cache = ClassificationCache::in_memory(TtlDuration::days(30));
        let mut gateway = ClassifierGateway::new(reasoner.clone(), cache, 0);

        let items = [request("acme/a"), request("acme/b")];
        let first = gateway.classify(&items, at("2026-10-01T00:00:00Z")).await;
        let second = gateway.classify(&items, at("2026-10-02T00:00:00Z")).await;

        assert_eq!(first.verdicts.len(), 2);
        assert_eq!(first.calls, 1);
        assert_eq!(second.cache_hits, 2);
        assert_eq!(reasoner.call_count(), 1);
    }

    #[tokio::test]
    async fn fresh_verdicts_expire_relative_to_the_cycle_clock() {
        let reasoner = Arc::new(MockReasoner::always(true, 0.9, "agents"));
        let cache = ClassificationCache::in_memory(TtlDuration::days(30));
        let mut gateway = ClassifierGateway::new(reasoner.clone(), cache, 0);

        gateway.classify(&[request("acme/a")], at("2020-01-01T00:00:00Z")).await;

        let key = "https://github.com/acme/a";
        assert!(gateway.cache().lookup_at(key, at("2020-01-30T23:59:59Z")).is_some());
        assert!(gateway.cache().lookup_at(key, at("2020-01-31T00:00:00Z")).is_none());

        let later = gateway.classify(&[request("acme/a")], at("2020-02-15T00:00:00Z")).await;
        assert_eq!(later.cache_hits, 0);
        assert_eq!(reasoner.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_calls_are_retried_then_left_pending() {
        let reasoner = Arc::new(MockReasoner::failing());
        let cache = ClassificationCache::in_memory(TtlDuration::days(30));
        let mut gateway =
            ClassifierGateway::new(reasoner.clone(), cache, 2).with_retry_base(Duration::ZERO);

        let outcome = gateway.classify(&[request("acme/a")], at("2026-10-19T00:00:00Z")).await;

        assert_eq!(reasoner.call_count(), 3);
        assert!(matches!(outcome.failure, Some(TrendwatchError::ClassifierUnavailable(_))));
        assert!(outcome.verdicts.is_empty());
        assert_eq!(outcome.pending, vec!["https://github.com/acme/a".to_string()]);
        assert!(gateway.cache().is_empty());
    }

    #[tokio::test]
    async fn unparseable_items_stay_pending_while_others_resolve() {
        let reasoner = Arc::new(MockReasoner::raw(
            r#"[{"id": "1", "relevant": true, "confidence": 0.9, "reason": "llm"}]"#,
        ));
        let cache = ClassificationCache::in_memory(TtlDuration::days(30));
        let mut gateway = ClassifierGateway::new(reasoner, cache, 0);

        let outcome = gateway
            .classify(&[request("acme/a"), request("acme/b")], at("2026-10-19T00:00:00Z"))
            .await;

        assert!(outcome.failure.is_none());
        assert_eq!(outcome.verdicts.len(), 1);
        assert_eq!(outcome.pending, vec!["https://github.com/acme/b".to_string()]);
        assert_eq!(gateway.cache().len(), 1);
    }
}
